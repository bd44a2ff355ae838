//! internet control message protocol (ICMP) module
//! Only the echo service is implemented: requests are buffered then sent back
//! as replies with an incrementally updated checksum.
use super::*;

// checksums
use crate::checksums::icmp_echo_reply_checksum;

// crossbar and IP
use crate::crossbar::CrossbarPort;
use crate::ip::{format_ip, IpPacket};

// packets
use crate::packets::{Depacketizer, Fields, Header, HeaderField, Packetizer};

// stream
use crate::stream::{try_take, Pending};

// std
use std::collections::VecDeque;

static ICMP_FIELDS: [HeaderField; 4] = [
    HeaderField::new("msgtype", 0, 0, 8),
    HeaderField::new("code", 1, 0, 8),
    HeaderField::new("checksum", 2, 0, 16),
    HeaderField::new("quench", 4, 0, 32),
];
pub static ICMP_HEADER: Header = Header {
    fields: &ICMP_FIELDS,
    length: ICMP_HEADER_LEN,
};

/// ICMP Echo Request Structure
#[derive(Debug, Clone)]
struct EchoRequest {
    ip_address: [u8; 4],
    fields: Fields,
    payload: Vec<u8>,
}

/// ICMP Statistics Structure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IcmpStats {
    pub echo_requests: u64,
    pub echo_replies: u64,
    pub ignored: u64,
}

/// ICMP Core Structure
#[derive(Debug)]
pub struct IcmpCore {
    port: CrossbarPort<IpPacket>,
    packetizer: Packetizer,
    depacketizer: Depacketizer,
    echo: VecDeque<EchoRequest>,
    echo_depth: usize,
    tx_pending: Pending<IpPacket>,
    stats: IcmpStats,
    debug: Verbose,
}

// IcmpCore Implementation
impl IcmpCore {
    // new() method
    pub fn new(port: CrossbarPort<IpPacket>, dw: usize, echo_depth: usize, debug: &Verbose) -> IcmpCore {
        IcmpCore {
            port,
            packetizer: Packetizer::new(&ICMP_HEADER, dw),
            depacketizer: Depacketizer::new(&ICMP_HEADER, dw),
            echo: VecDeque::with_capacity(echo_depth.max(1)),
            echo_depth: echo_depth.max(1),
            tx_pending: Pending::new(),
            stats: IcmpStats::default(),
            debug: *debug,
        }
    }
    // stats() getter
    pub fn stats(&self) -> IcmpStats {
        self.stats
    }
    // step() method
    pub fn step(&mut self) -> bool {
        self.tx_step() | self.rx_step()
    }
    // rx_step() method
    fn rx_step(&mut self) -> bool {
        // the echo buffer backpressures the IPv4 layer when full
        if self.echo.len() >= self.echo_depth {
            return false;
        }
        let packet = match try_take(&self.port.source) {
            Some(packet) => packet,
            None => return false,
        };
        match self.depacketizer.depacketize(&packet.payload) {
            Some((fields, payload)) if fields.get("msgtype") == ICMP_TYPE_ECHO_REQUEST as u64 => {
                self.stats.echo_requests += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_HIGH,
                    DEBUG_SRC_ICMP,
                    format!("echo request from {}", format_ip(&packet.ip_address)),
                );
                self.echo.push_back(EchoRequest {
                    ip_address: packet.ip_address,
                    fields,
                    payload,
                });
            }
            _ => {
                self.stats.ignored += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_MEDIUM,
                    DEBUG_SRC_ICMP,
                    format!("non echo request message from {} ignored", format_ip(&packet.ip_address)),
                );
            }
        }
        true
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
        let request = match self.echo.pop_front() {
            Some(request) => request,
            None => return progress,
        };
        let mut fields = request.fields;
        let checksum = icmp_echo_reply_checksum(fields.get("checksum") as u16);
        fields
            .set("msgtype", ICMP_TYPE_ECHO_REPLY as u64)
            .set("checksum", checksum as u64);
        let payload = self.packetizer.packetize(&fields, &request.payload);
        self.stats.echo_replies += 1;
        self.tx_pending.send(
            &self.port.sink,
            IpPacket {
                ip_address: request.ip_address,
                protocol: ICMP_PROTOCOL,
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
    use crate::checksums::one_complement_sum;
    use crate::stream::pipe;
    use rand::Rng;

    const REMOTE_IP: [u8; 4] = [192, 168, 1, 100];

    fn echo_request(rng: &mut impl Rng, len: usize) -> Vec<u8> {
        let mut bytes = vec![ICMP_TYPE_ECHO_REQUEST, 0, 0, 0];
        // nonzero identifier
        bytes.push(rng.gen_range(1, 255));
        for _ in 0..3 + len {
            bytes.push(rng.gen::<u8>());
        }
        let checksum = one_complement_sum(&bytes, Some(2));
        bytes[2..4].copy_from_slice(&checksum.to_be_bytes());
        bytes
    }

    #[test]
    fn echo_reply_mirrors_the_request() {
        let mut rng = rand::thread_rng();
        for &dw in &[1usize, 4, 8] {
            let (sink, ip_tx) = pipe(4);
            let (ip_rx, source) = pipe(4);
            let mut icmp = IcmpCore::new(
                CrossbarPort {
                    key: ICMP_PROTOCOL as u16,
                    sink,
                    source,
                },
                dw,
                ICMP_DFLT_ECHO_DEPTH,
                &Verbose::default(),
            );
            for _ in 0..40 {
                let len = rng.gen_range(0, 64);
                let request = echo_request(&mut rng, len);
                ip_rx
                    .send(IpPacket {
                        ip_address: REMOTE_IP,
                        protocol: ICMP_PROTOCOL,
                        payload: request.clone(),
                    })
                    .unwrap();
                while icmp.step() {}
                let reply = ip_tx.try_recv().unwrap();
                assert_eq!(reply.ip_address, REMOTE_IP);
                assert_eq!(reply.protocol, ICMP_PROTOCOL);
                assert_eq!(reply.payload.len(), request.len());
                assert_eq!(reply.payload[0], ICMP_TYPE_ECHO_REPLY);
                assert_eq!(&reply.payload[4..], &request[4..]);
                // full recomputation agrees with the incremental update
                assert_eq!(one_complement_sum(&reply.payload, None), 0);
            }
        }
    }

    #[test]
    fn other_messages_are_ignored() {
        let (sink, ip_tx) = pipe(4);
        let (ip_rx, source) = pipe(4);
        let mut icmp = IcmpCore::new(
            CrossbarPort {
                key: ICMP_PROTOCOL as u16,
                sink,
                source,
            },
            1,
            1,
            &Verbose::default(),
        );
        ip_rx
            .send(IpPacket {
                ip_address: REMOTE_IP,
                protocol: ICMP_PROTOCOL,
                payload: vec![ICMP_TYPE_ECHO_REPLY, 0, 0xff, 0xff, 0, 1, 0, 1],
            })
            .unwrap();
        ip_rx
            .send(IpPacket {
                ip_address: REMOTE_IP,
                protocol: ICMP_PROTOCOL,
                payload: vec![ICMP_TYPE_ECHO_REQUEST, 0],
            })
            .unwrap();
        while icmp.step() {}
        assert!(ip_tx.try_recv().is_err());
        assert_eq!(icmp.stats().ignored, 2);
    }

    #[test]
    fn full_echo_buffer_backpressures() {
        let mut rng = rand::thread_rng();
        let (sink, ip_tx) = pipe(1);
        let (ip_rx, source) = pipe(8);
        let mut icmp = IcmpCore::new(
            CrossbarPort {
                key: ICMP_PROTOCOL as u16,
                sink,
                source,
            },
            1,
            2,
            &Verbose::default(),
        );
        for _ in 0..6 {
            ip_rx
                .send(IpPacket {
                    ip_address: REMOTE_IP,
                    protocol: ICMP_PROTOCOL,
                    payload: echo_request(&mut rng, 8),
                })
                .unwrap();
        }
        while icmp.step() {}
        // one reply in the pipe, one held, two buffered
        assert_eq!(ip_rx.len(), 2);
        assert_eq!(ip_tx.try_iter().count(), 1);
        while icmp.step() {}
        assert_eq!(ip_tx.try_iter().count(), 1);
        assert_eq!(ip_rx.len(), 1);
        assert_eq!(icmp.stats().echo_requests, 5);
    }
}
