//! udp streamer module
//! Turns a UDP user port into a pair of byte FIFOs. Bytes written to the TX
//! FIFO leave as one datagram once `send_level` of them are buffered, the
//! payload of the accepted datagrams is queued on the RX FIFO.
use super::*;

// ip and udp
use crate::ip::format_ip;
use crate::udp::{UdpUserPacket, UdpUserPort};

// stream
use crate::stream::{pipe, try_take, Pending};

// crossbeam
use crossbeam::channel::{Receiver, Sender};

// std
use std::collections::VecDeque;

/// Streamer Parameters Structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamerParameters {
    pub ip_address: Option<[u8; 4]>, // remote host, None accepts any sender and disables TX
    pub port: u16,
    pub rx_fifo_depth: usize,
    pub tx_fifo_depth: usize,
    pub send_level: usize,
    pub loopback: bool, // received bytes are streamed back to the remote host
}

impl Default for StreamerParameters {
    fn default() -> Self {
        StreamerParameters {
            ip_address: None,
            port: STREAMER_DFLT_PORT,
            rx_fifo_depth: STREAMER_DFLT_FIFO_DEPTH,
            tx_fifo_depth: STREAMER_DFLT_FIFO_DEPTH,
            send_level: STREAMER_DFLT_SEND_LEVEL,
            loopback: false,
        }
    }
}

/// Byte Stream Structure
/// The application end of a streamer, `sink` is None without a remote host.
#[derive(Debug, Clone)]
pub struct ByteStream {
    pub sink: Option<Sender<u8>>,
    pub source: Receiver<u8>,
}

/// Streamer Statistics Structure
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StreamerStats {
    pub rx_datagrams: u64,
    pub rx_bytes: u64,
    pub rx_filtered: u64,
    pub tx_datagrams: u64,
    pub tx_bytes: u64,
}

/// UDP Streamer Structure
#[derive(Debug)]
pub struct UdpStreamer {
    port: UdpUserPort,
    ip_address: Option<[u8; 4]>,
    send_level: usize,
    loopback: bool,
    tx_sink: Sender<u8>,
    tx_source: Receiver<u8>,
    rx_sink: Sender<u8>,
    rx_source: Receiver<u8>,
    rx_backlog: VecDeque<u8>, // payload of the last datagram not yet in the RX FIFO
    loop_pending: Pending<u8>,
    tx_pending: Pending<UdpUserPacket>,
    stats: StreamerStats,
    debug: Verbose,
}

// UdpStreamer Implementation
impl UdpStreamer {
    // new() method
    pub fn new(port: UdpUserPort, params: &StreamerParameters, debug: &Verbose) -> Result<UdpStreamer, StackError> {
        if params.rx_fifo_depth == 0 || params.tx_fifo_depth == 0 {
            return Err(StackError::Config("streamer FIFOs cannot be empty".to_string()));
        }
        if params.tx_fifo_depth > UDP_MAX_PAYLOAD_LEN {
            return Err(StackError::Config(format!(
                "streamer TX FIFO of {} bytes exceeds the largest datagram",
                params.tx_fifo_depth
            )));
        }
        if params.send_level == 0 || params.send_level > params.tx_fifo_depth {
            return Err(StackError::Config(format!(
                "streamer send level must be within 1..={}",
                params.tx_fifo_depth
            )));
        }
        if params.loopback && params.ip_address.is_none() {
            return Err(StackError::Config("streamer loopback needs a remote host".to_string()));
        }
        let (tx_sink, tx_source) = pipe(params.tx_fifo_depth);
        let (rx_sink, rx_source) = pipe(params.rx_fifo_depth);
        print_debug(
            debug,
            DEBUG_LEVEL_MEDIUM,
            DEBUG_SRC_STREAMER,
            format!(
                "streaming on port {}, remote {}",
                port.port,
                match params.ip_address {
                    Some(ip) => format_ip(&ip),
                    None => "any (receive only)".to_string(),
                }
            ),
        );
        Ok(UdpStreamer {
            port,
            ip_address: params.ip_address,
            send_level: params.send_level,
            loopback: params.loopback,
            tx_sink,
            tx_source,
            rx_sink,
            rx_source,
            rx_backlog: VecDeque::new(),
            loop_pending: Pending::new(),
            tx_pending: Pending::new(),
            stats: StreamerStats::default(),
            debug: *debug,
        })
    }
    // stream() method
    /// the application end, None when the streamer loops its bytes back
    pub fn stream(&self) -> Option<ByteStream> {
        if self.loopback {
            return None;
        }
        Some(ByteStream {
            sink: self.ip_address.map(|_| self.tx_sink.clone()),
            source: self.rx_source.clone(),
        })
    }
    // port() getter
    pub fn port(&self) -> u16 {
        self.port.port
    }
    // stats() getter
    pub fn stats(&self) -> StreamerStats {
        self.stats
    }
    // step() method
    pub fn step(&mut self) -> bool {
        let mut progress = self.rx_step();
        if self.loopback {
            progress |= self.loop_step();
        }
        progress | self.tx_step()
    }
    // rx_step() method
    fn rx_step(&mut self) -> bool {
        let mut progress = false;
        // a new datagram is only taken once the previous one is fully queued
        while let Some(&byte) = self.rx_backlog.front() {
            if self.rx_sink.try_send(byte).is_err() {
                return progress;
            }
            self.rx_backlog.pop_front();
            progress = true;
        }
        if let Some(packet) = try_take(&self.port.source) {
            let from_remote = self.ip_address.map_or(true, |ip| ip == packet.ip_address);
            if packet.dst_port != self.port.port || !from_remote {
                self.stats.rx_filtered += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_HIGH,
                    DEBUG_SRC_STREAMER,
                    format!(
                        "ignoring datagram from {}:{} to port {}",
                        format_ip(&packet.ip_address),
                        packet.src_port,
                        packet.dst_port
                    ),
                );
                return true;
            }
            let bytes = packet.bytes(self.port.dw);
            self.stats.rx_datagrams += 1;
            self.stats.rx_bytes += bytes.len() as u64;
            self.rx_backlog.extend(bytes);
            progress = true;
        }
        progress
    }
    // loop_step() method
    fn loop_step(&mut self) -> bool {
        let mut progress = false;
        loop {
            if self.loop_pending.is_busy() {
                if !self.loop_pending.flush(&self.tx_sink) {
                    return progress;
                }
                progress = true;
            }
            match try_take(&self.rx_source) {
                Some(byte) => self.loop_pending.put(byte),
                None => return progress,
            }
        }
    }
    // tx_step() method
    fn tx_step(&mut self) -> bool {
        if self.tx_pending.is_busy() {
            return self.tx_pending.flush(&self.port.sink);
        }
        let ip_address = match self.ip_address {
            Some(ip) => ip,
            None => return false,
        };
        let level = self.tx_source.len();
        if level < self.send_level {
            return false;
        }
        let payload: Vec<u8> = (0..level).filter_map(|_| try_take(&self.tx_source)).collect();
        self.stats.tx_datagrams += 1;
        self.stats.tx_bytes += payload.len() as u64;
        print_debug(
            &self.debug,
            DEBUG_LEVEL_EXTENSIVE,
            DEBUG_SRC_STREAMER,
            format!("sending {} bytes to {}", payload.len(), format_ip(&ip_address)),
        );
        let packet = UdpUserPacket::from_bytes(ip_address, self.port.port, self.port.port, &payload, self.port.dw);
        self.tx_pending.send(&self.port.sink, packet);
        true
    }
}
