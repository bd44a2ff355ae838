//! user datagram protocol (UDP) module
//! This module frames/deframes the UDP datagrams (checksum left disabled) and
//! dispatches them to the user ports by destination port. Each user port has
//! its own data width and converts between the stack and its word stream.
use super::*;

// crossbar and IP
use crate::crossbar::{Crossbar, CrossbarKind, CrossbarMaster, CrossbarPort, CrossbarStats, Keyed};
use crate::ip::IpPacket;

// packets
use crate::packets::{Depacketizer, Fields, Header, HeaderField, Packetizer};

// stream
use crate::stream::{beats_to_bytes, bytes_to_beats, check_dw, pipe, try_take, Beat, Pending, StrideConverter};

// crossbeam
use crossbeam::channel::{Receiver, Sender};

static UDP_FIELDS: [HeaderField; 4] = [
    HeaderField::new("src_port", 0, 0, 16),
    HeaderField::new("dst_port", 2, 0, 16),
    HeaderField::new("length", 4, 0, 16),
    HeaderField::new("checksum", 6, 0, 16),
];
pub static UDP_HEADER: Header = Header {
    fields: &UDP_FIELDS,
    length: UDP_HEADER_LEN,
};

/// UDP Packet Structure
/// The record carried by the port crossbar, `ip_address` is the remote host.
#[derive(Debug, Clone, PartialEq)]
pub struct UdpPacket {
    pub ip_address: [u8; 4],
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

impl Keyed for UdpPacket {
    fn key(&self) -> u16 {
        self.dst_port
    }
}

/// UDP User Packet Structure
///
/// The record exchanged on a user port, `data` is a stream of words of the
/// port width and `length` the payload length in bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct UdpUserPacket {
    pub ip_address: [u8; 4],
    pub src_port: u16,
    pub dst_port: u16,
    pub length: usize,
    pub data: Vec<Beat>,
}

// UdpUserPacket Implementation
impl UdpUserPacket {
    // from_bytes() function
    pub fn from_bytes(ip_address: [u8; 4], src_port: u16, dst_port: u16, payload: &[u8], dw: usize) -> UdpUserPacket {
        UdpUserPacket {
            ip_address,
            src_port,
            dst_port,
            length: payload.len(),
            data: bytes_to_beats(payload, dw),
        }
    }
    // bytes() method
    pub fn bytes(&self, dw: usize) -> Vec<u8> {
        let mut bytes = beats_to_bytes(&self.data, dw);
        bytes.truncate(self.length);
        bytes
    }
}

/// UDP User Port Structure
#[derive(Debug)]
pub struct UdpUserPort {
    pub port: u16,
    pub dw: usize,
    pub sink: Sender<UdpUserPacket>,
    pub source: Receiver<UdpUserPacket>,
}

/// UDP Port Bridge Structure
/// Converts between a crossbar port and a user port.
#[derive(Debug)]
struct UdpPortBridge {
    internal: CrossbarPort<UdpPacket>,
    to_user: Sender<UdpUserPacket>,
    from_user: Receiver<UdpUserPacket>,
    rx_converter: StrideConverter,
    tx_converter: StrideConverter,
    internal_dw: usize,
    user_dw: usize,
    rx_pending: Pending<UdpUserPacket>,
    tx_pending: Pending<UdpPacket>,
}

// UdpPortBridge Implementation
impl UdpPortBridge {
    // step() method
    fn step(&mut self) -> bool {
        let mut progress = false;
        // stack to user
        let mut rx_ready = true;
        if self.rx_pending.is_busy() {
            rx_ready = self.rx_pending.flush(&self.to_user);
            progress |= rx_ready;
        }
        if rx_ready {
            if let Some(packet) = try_take(&self.internal.source) {
                let beats = bytes_to_beats(&packet.payload, self.internal_dw);
                let user = UdpUserPacket {
                    ip_address: packet.ip_address,
                    src_port: packet.src_port,
                    dst_port: packet.dst_port,
                    length: packet.payload.len(),
                    data: self.rx_converter.convert(&beats),
                };
                self.rx_pending.send(&self.to_user, user);
                progress = true;
            }
        }
        // user to stack
        let mut tx_ready = true;
        if self.tx_pending.is_busy() {
            tx_ready = self.tx_pending.flush(&self.internal.sink);
            progress |= tx_ready;
        }
        if tx_ready {
            if let Some(user) = try_take(&self.from_user) {
                let beats = self.tx_converter.convert(&user.data);
                let mut payload = beats_to_bytes(&beats, self.internal_dw);
                payload.truncate(user.length);
                let packet = UdpPacket {
                    ip_address: user.ip_address,
                    src_port: user.src_port,
                    dst_port: user.dst_port,
                    payload,
                };
                self.tx_pending.send(&self.internal.sink, packet);
                progress = true;
            }
        }
        progress
    }
}

/// UDP Statistics Structure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UdpStats {
    pub rx_datagrams: u64,
    pub tx_datagrams: u64,
    pub invalid: u64,
    pub tx_oversize: u64, // datagrams too large for an IPv4 packet
}

/// UDP Core Structure
#[derive(Debug)]
pub struct UdpCore {
    dw: usize,
    depth: usize,
    port: CrossbarPort<IpPacket>,
    crossbar: Crossbar<UdpPacket>,
    master: CrossbarMaster<UdpPacket>,
    bridges: Vec<UdpPortBridge>,
    packetizer: Packetizer,
    depacketizer: Depacketizer,
    tx_pending: Pending<IpPacket>,
    rx_pending: Pending<UdpPacket>,
    stats: UdpStats,
    debug: Verbose,
}

// UdpCore Implementation
impl UdpCore {
    // new() method
    pub fn new(port: CrossbarPort<IpPacket>, dw: usize, depth: usize, debug: &Verbose) -> UdpCore {
        let crossbar = Crossbar::new(CrossbarKind::UdpPort, depth, debug);
        let master = crossbar.master();
        UdpCore {
            dw,
            depth,
            port,
            crossbar,
            master,
            bridges: Vec::new(),
            packetizer: Packetizer::new(&UDP_HEADER, dw),
            depacketizer: Depacketizer::new(&UDP_HEADER, dw),
            tx_pending: Pending::new(),
            rx_pending: Pending::new(),
            stats: UdpStats::default(),
            debug: *debug,
        }
    }
    // get_port() method
    /// open a user port of `dw` bytes words, ports are unique
    pub fn get_port(&mut self, port: u16, dw: usize) -> Result<UdpUserPort, StackError> {
        let dw = check_dw(dw)?;
        let internal = self.crossbar.get_port(port)?;
        let (to_user, source) = pipe(self.depth);
        let (sink, from_user) = pipe(self.depth);
        let rx_converter = StrideConverter::new(self.dw, dw)?;
        self.bridges.push(UdpPortBridge {
            internal,
            to_user,
            from_user,
            rx_converter,
            tx_converter: rx_converter.reverse(),
            internal_dw: self.dw,
            user_dw: dw,
            rx_pending: Pending::new(),
            tx_pending: Pending::new(),
        });
        print_debug(
            &self.debug,
            DEBUG_LEVEL_HIGH,
            DEBUG_SRC_UDP,
            format!("port {} opened, {} bits wide", port, dw * 8),
        );
        Ok(UdpUserPort {
            port,
            dw,
            sink,
            source,
        })
    }
    // stats() getter
    pub fn stats(&self) -> UdpStats {
        self.stats
    }
    // crossbar_stats() getter
    pub fn crossbar_stats(&self) -> CrossbarStats {
        self.crossbar.stats()
    }
    // port_widths() method
    /// (port, width in bytes) of the opened user ports
    pub fn port_widths(&self) -> Vec<(u16, usize)> {
        self.bridges.iter().map(|b| (b.internal.key, b.user_dw)).collect()
    }
    // step() method
    pub fn step(&mut self) -> bool {
        let mut progress = false;
        for bridge in self.bridges.iter_mut() {
            progress |= bridge.step();
        }
        progress |= self.crossbar.step();
        progress |= self.tx_step();
        progress |= self.rx_step();
        progress
    }
    // tx_step() method
    fn tx_step(&mut self) -> bool {
        let mut progress = false;
        if self.tx_pending.is_busy() {
            if !self.tx_pending.flush(&self.port.sink) {
                return false;
            }
            progress = true;
        }
        let packet = match try_take(&self.master.source) {
            Some(packet) => packet,
            None => return progress,
        };
        if packet.payload.len() > UDP_MAX_PAYLOAD_LEN {
            self.stats.tx_oversize += 1;
            print_debug(
                &self.debug,
                DEBUG_LEVEL_MEDIUM,
                DEBUG_SRC_UDP,
                format!(
                    "datagram of {} bytes from port {} is too large, dropped",
                    packet.payload.len(),
                    packet.src_port
                ),
            );
            return true;
        }
        let mut fields = Fields::new();
        fields
            .set("src_port", packet.src_port as u64)
            .set("dst_port", packet.dst_port as u64)
            .set("length", (packet.payload.len() + UDP_HEADER_LEN) as u64)
            .set("checksum", 0);
        let payload = self.packetizer.packetize(&fields, &packet.payload);
        self.stats.tx_datagrams += 1;
        self.tx_pending.send(
            &self.port.sink,
            IpPacket {
                ip_address: packet.ip_address,
                protocol: UDP_PROTOCOL,
                payload,
            },
        );
        true
    }
    // rx_step() method
    fn rx_step(&mut self) -> bool {
        let mut progress = false;
        if self.rx_pending.is_busy() {
            if !self.rx_pending.flush(&self.master.sink) {
                return false;
            }
            progress = true;
        }
        let packet = match try_take(&self.port.source) {
            Some(packet) => packet,
            None => return progress,
        };
        let (fields, mut payload) = match self.depacketizer.depacketize(&packet.payload) {
            Some(datagram) => datagram,
            None => {
                self.stats.invalid += 1;
                return true;
            }
        };
        let length = fields.get("length") as usize;
        if length < UDP_HEADER_LEN || length - UDP_HEADER_LEN > payload.len() {
            self.stats.invalid += 1;
            print_debug(
                &self.debug,
                DEBUG_LEVEL_MEDIUM,
                DEBUG_SRC_UDP,
                format!("rx datagram dropped, bad length {}", length),
            );
            return true;
        }
        payload.truncate(length - UDP_HEADER_LEN);
        self.stats.rx_datagrams += 1;
        self.rx_pending.send(
            &self.master.sink,
            UdpPacket {
                ip_address: packet.ip_address,
                src_port: fields.get("src_port") as u16,
                dst_port: fields.get("dst_port") as u16,
                payload,
            },
        );
        true
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    const REMOTE_IP: [u8; 4] = [192, 168, 1, 100];

    fn bench(dw: usize) -> (UdpCore, Receiver<IpPacket>, Sender<IpPacket>) {
        let (sink, ip_tx) = pipe(8);
        let (ip_rx, source) = pipe(8);
        let udp = UdpCore::new(
            CrossbarPort {
                key: UDP_PROTOCOL as u16,
                sink,
                source,
            },
            dw,
            4,
            &Verbose::default(),
        );
        (udp, ip_tx, ip_rx)
    }

    fn datagram(src_port: u16, dst_port: u16, payload: &[u8], padding: usize) -> IpPacket {
        let mut fields = Fields::new();
        fields
            .set("src_port", src_port as u64)
            .set("dst_port", dst_port as u64)
            .set("length", (payload.len() + 8) as u64);
        let mut bytes = UDP_HEADER.encode(&fields);
        bytes.extend_from_slice(payload);
        bytes.extend(std::iter::repeat(0).take(padding));
        IpPacket {
            ip_address: REMOTE_IP,
            protocol: UDP_PROTOCOL,
            payload: bytes,
        }
    }

    #[test]
    fn duplicate_port_is_refused() {
        let (mut udp, _, _) = bench(1);
        assert!(udp.get_port(1234, 4).is_ok());
        let err = udp.get_port(1234, 1).unwrap_err();
        assert_eq!(format!("{}", err), "port 0x4d2 already assigned");
        assert!(udp.get_port(5000, 3).is_err());
    }

    #[test]
    fn rx_dispatches_by_port_with_width_conversion() {
        let (mut udp, _, ip_rx) = bench(1);
        let wide = udp.get_port(1234, 4).unwrap();
        let narrow = udp.get_port(5000, 1).unwrap();
        let payload: Vec<u8> = (1..=10).collect();
        ip_rx.send(datagram(40000, 1234, &payload, 6)).unwrap();
        ip_rx.send(datagram(40001, 5000, &payload[..3], 0)).unwrap();
        ip_rx.send(datagram(40002, 7, &payload, 0)).unwrap();
        while udp.step() {}
        let packet = wide.source.try_recv().unwrap();
        assert_eq!(packet.src_port, 40000);
        assert_eq!(packet.length, 10);
        assert_eq!(packet.data.len(), 3);
        assert_eq!(packet.data[0].data, 0x04030201);
        assert_eq!(packet.data[2].last_be, 0b0010);
        assert_eq!(packet.bytes(4), payload);
        let packet = narrow.source.try_recv().unwrap();
        assert_eq!(packet.bytes(1), vec![1, 2, 3]);
        assert_eq!(udp.crossbar_stats().unknown, 1);
    }

    #[test]
    fn tx_drops_datagrams_larger_than_ipv4_allows() {
        let (mut udp, ip_tx, _) = bench(1);
        let port = udp.get_port(1234, 1).unwrap();
        let too_large = vec![0x5a; UDP_MAX_PAYLOAD_LEN + 1];
        port.sink
            .send(UdpUserPacket::from_bytes(REMOTE_IP, 1234, 4321, &too_large, 1))
            .unwrap();
        while udp.step() {}
        assert!(ip_tx.try_recv().is_err());
        assert_eq!(udp.stats().tx_oversize, 1);

        let largest = vec![0xa5; UDP_MAX_PAYLOAD_LEN];
        port.sink
            .send(UdpUserPacket::from_bytes(REMOTE_IP, 1234, 4321, &largest, 1))
            .unwrap();
        while udp.step() {}
        let packet = ip_tx.try_recv().unwrap();
        assert_eq!(packet.payload.len(), IP_MAX_PAYLOAD_LEN);
        assert_eq!(UDP_HEADER.decode(&packet.payload).get("length"), 65515);
        assert_eq!(udp.stats().tx_datagrams, 1);
    }

    #[test]
    fn tx_prepends_header_with_length_and_no_checksum() {
        let (mut udp, ip_tx, _) = bench(2);
        let port = udp.get_port(1234, 4).unwrap();
        let payload = [0xde, 0xad, 0xbe, 0xef, 0x01];
        port.sink
            .send(UdpUserPacket::from_bytes(REMOTE_IP, 1234, 4321, &payload, 4))
            .unwrap();
        while udp.step() {}
        let packet = ip_tx.try_recv().unwrap();
        assert_eq!(packet.ip_address, REMOTE_IP);
        assert_eq!(packet.protocol, UDP_PROTOCOL);
        let fields = UDP_HEADER.decode(&packet.payload);
        assert_eq!(fields.get("src_port"), 1234);
        assert_eq!(fields.get("dst_port"), 4321);
        assert_eq!(fields.get("length"), 13);
        assert_eq!(fields.get("checksum"), 0);
        assert_eq!(&packet.payload[8..], &payload);
        assert_eq!(udp.port_widths(), vec![(1234, 4)]);
    }
}
