//! internet protocol version 4 (IPv4) module
//! This module frames/deframes the IPv4 datagrams (20 bytes header, no options),
//! fragments the outbound datagrams larger than the MTU, gates the transmission
//! on the next-hop resolution and dispatches the inbound datagrams by protocol.
use super::*;

// arp
use crate::arp::{ArpRequest, ArpResponse, ArpTablePort};

// checksums
use crate::checksums::one_complement_sum;

// crossbar and MAC
use crate::crossbar::{Crossbar, CrossbarKind, CrossbarMaster, CrossbarPort, CrossbarStats, Keyed};
use crate::mac::EthFrame;

// packets
use crate::packets::{Depacketizer, Fields, Header, HeaderField, Packetizer};

// stream
use crate::stream::{try_take, Pending};

// std
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static IP_FIELDS: [HeaderField; 12] = [
    HeaderField::new("version", 0, 4, 4),
    HeaderField::new("ihl", 0, 0, 4),
    HeaderField::new("diff_services", 1, 0, 8),
    HeaderField::new("total_length", 2, 0, 16),
    HeaderField::new("identification", 4, 0, 16),
    HeaderField::new("flags", 6, 13, 3),
    HeaderField::new("fragment_offset", 6, 0, 13),
    HeaderField::new("ttl", 8, 0, 8),
    HeaderField::new("protocol", 9, 0, 8),
    HeaderField::new("checksum", 10, 0, 16),
    HeaderField::new("sender_ip", 12, 0, 32),
    HeaderField::new("target_ip", 16, 0, 32),
];
pub static IP_HEADER: Header = Header {
    fields: &IP_FIELDS,
    length: IP_HEADER_LEN,
};

/// Shared IP Address Structure
///
/// The local address of a stack, read by ARP and IPv4, written by the DHCP
/// client once a lease is bound.
#[derive(Debug, Clone)]
pub struct SharedIp(Arc<AtomicU32>);

// SharedIp Implementation
impl SharedIp {
    // new() method
    pub fn new(ip: [u8; 4]) -> SharedIp {
        SharedIp(Arc::new(AtomicU32::new(u32::from_be_bytes(ip))))
    }
    // get() method
    pub fn get(&self) -> [u8; 4] {
        self.0.load(Ordering::Relaxed).to_be_bytes()
    }
    // set() method
    pub fn set(&self, ip: [u8; 4]) {
        self.0.store(u32::from_be_bytes(ip), Ordering::Relaxed);
    }
}

// format_ip() function
pub fn format_ip(ip: &[u8; 4]) -> String {
    format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])
}

// is_broadcast() function
pub fn is_broadcast(ip: &[u8; 4]) -> bool {
    ip[3] == IP_BCAST_LAST_OCTET
}

// is_multicast() function
pub fn is_multicast(ip: &[u8; 4]) -> bool {
    ip[0] >> 4 == IP_MCAST_NIBBLE
}

// multicast_mac() function
/// 01:00:5e followed by the low 23 bits of the group address
pub fn multicast_mac(ip: &[u8; 4]) -> [u8; 6] {
    [
        ETH_MCAST_OUI[0],
        ETH_MCAST_OUI[1],
        ETH_MCAST_OUI[2],
        ip[1] & 0x7f,
        ip[2],
        ip[3],
    ]
}

/// IPv4 Packet Structure
///
/// The record exchanged with the protocols subscribed to the IPv4 crossbar,
/// `ip_address` is the destination on transmission, the source on reception.
#[derive(Debug, Clone, PartialEq)]
pub struct IpPacket {
    pub ip_address: [u8; 4],
    pub protocol: u8,
    pub payload: Vec<u8>,
}

impl Keyed for IpPacket {
    fn key(&self) -> u16 {
        self.protocol as u16
    }
}

/// IPv4 Statistics Structure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IpStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub tx_fragments: u64,
    pub checksum_errors: u64,
    pub invalid: u64,
    pub not_for_us: u64,
    pub fragments_dropped: u64,
    pub target_unreachable: u64,
    pub tx_oversize: u64, // datagrams too large for the total_length field
}

/// IPv4 Transmit States Enumerator
#[derive(Debug)]
enum IpTxState {
    Idle,
    Resolve(IpPacket),
    Wait(IpPacket),
    Send,
}

/// IPv4 Core Structure
#[derive(Debug)]
pub struct IpCore {
    mac_address: [u8; 6],
    ip_address: SharedIp,
    with_broadcast: bool,
    fragment_size: usize,
    port: CrossbarPort<EthFrame>,
    arp: ArpTablePort,
    crossbar: Crossbar<IpPacket>,
    master: CrossbarMaster<IpPacket>,
    packetizer: Packetizer,
    depacketizer: Depacketizer,
    // tx
    tx_state: IpTxState,
    identification: u16,
    fragments: VecDeque<EthFrame>,
    arp_pending: Pending<ArpRequest>,
    tx_pending: Pending<EthFrame>,
    unreachable: bool,
    // rx
    rx_pending: Pending<IpPacket>,
    stats: IpStats,
    debug: Verbose,
}

// IpCore Implementation
impl IpCore {
    // new() method
    pub fn new(
        mac_address: [u8; 6],
        ip_address: SharedIp,
        mtu: usize,
        with_broadcast: bool,
        port: CrossbarPort<EthFrame>,
        arp: ArpTablePort,
        dw: usize,
        depth: usize,
        debug: &Verbose,
    ) -> IpCore {
        let crossbar = Crossbar::new(CrossbarKind::IpProtocol, depth, debug);
        let master = crossbar.master();
        IpCore {
            mac_address,
            ip_address,
            with_broadcast,
            fragment_size: fragment_size(mtu),
            port,
            arp,
            crossbar,
            master,
            packetizer: Packetizer::new(&IP_HEADER, dw),
            depacketizer: Depacketizer::new(&IP_HEADER, dw),
            tx_state: IpTxState::Idle,
            identification: 0,
            fragments: VecDeque::new(),
            arp_pending: Pending::new(),
            tx_pending: Pending::new(),
            unreachable: false,
            rx_pending: Pending::new(),
            stats: IpStats::default(),
            debug: *debug,
        }
    }
    // get_port() method
    /// subscribe to an IP protocol number
    pub fn get_port(&mut self, protocol: u8) -> Result<CrossbarPort<IpPacket>, StackError> {
        self.crossbar.get_port(protocol as u16)
    }
    // stats() getter
    pub fn stats(&self) -> IpStats {
        self.stats
    }
    // crossbar_stats() getter
    pub fn crossbar_stats(&self) -> CrossbarStats {
        self.crossbar.stats()
    }
    // target_unreachable() getter
    /// true during the step a datagram was dropped for lack of ARP resolution
    pub fn target_unreachable(&self) -> bool {
        self.unreachable
    }
    // step() method
    pub fn step(&mut self) -> bool {
        self.unreachable = false;
        let mut progress = self.crossbar.step();
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
        if self.arp_pending.is_busy() {
            progress |= self.arp_pending.flush(&self.arp.request);
        }
        let state = std::mem::replace(&mut self.tx_state, IpTxState::Idle);
        self.tx_state = match state {
            IpTxState::Idle => match try_take(&self.master.source) {
                Some(packet) if packet.payload.len() > IP_MAX_PAYLOAD_LEN => {
                    progress = true;
                    self.stats.tx_oversize += 1;
                    print_debug(
                        &self.debug,
                        DEBUG_LEVEL_MEDIUM,
                        DEBUG_SRC_IP,
                        format!(
                            "datagram of {} bytes to {} exceeds the IPv4 maximum, dropped",
                            packet.payload.len(),
                            format_ip(&packet.ip_address)
                        ),
                    );
                    IpTxState::Idle
                }
                Some(packet) => {
                    progress = true;
                    let target = packet.ip_address;
                    if is_broadcast(&target) {
                        self.fragment(packet, ETH_BCAST_MAC);
                        IpTxState::Send
                    } else if is_multicast(&target) {
                        self.fragment(packet, multicast_mac(&target));
                        IpTxState::Send
                    } else {
                        IpTxState::Resolve(packet)
                    }
                }
                None => IpTxState::Idle,
            },
            IpTxState::Resolve(packet) => {
                if self.arp_pending.is_busy() {
                    IpTxState::Resolve(packet)
                } else {
                    progress = true;
                    let request = ArpRequest {
                        ip_address: packet.ip_address,
                    };
                    self.arp_pending.send(&self.arp.request, request);
                    IpTxState::Wait(packet)
                }
            }
            IpTxState::Wait(packet) => match try_take(&self.arp.response) {
                Some(ArpResponse { failed: true, .. }) => {
                    progress = true;
                    self.unreachable = true;
                    self.stats.target_unreachable += 1;
                    print_debug(
                        &self.debug,
                        DEBUG_LEVEL_MEDIUM,
                        DEBUG_SRC_IP,
                        format!(
                            "target {} unreachable, datagram dropped",
                            format_ip(&packet.ip_address)
                        ),
                    );
                    IpTxState::Idle
                }
                Some(response) => {
                    progress = true;
                    self.fragment(packet, response.mac_address);
                    IpTxState::Send
                }
                None => IpTxState::Wait(packet),
            },
            IpTxState::Send => match self.fragments.pop_front() {
                Some(frame) => {
                    progress = true;
                    self.stats.tx_fragments += 1;
                    self.tx_pending.send(&self.port.sink, frame);
                    if self.fragments.is_empty() {
                        IpTxState::Idle
                    } else {
                        IpTxState::Send
                    }
                }
                None => IpTxState::Idle,
            },
        };
        progress
    }
    // fragment() method
    /// split a datagram in MTU sized fragments sharing one identification
    fn fragment(&mut self, packet: IpPacket, target_mac: [u8; 6]) {
        let identification = self.identification;
        self.identification = self.identification.wrapping_add(1);
        self.stats.tx_packets += 1;
        let chunks: Vec<&[u8]> = if packet.payload.is_empty() {
            vec![&packet.payload[..]]
        } else {
            packet.payload.chunks(self.fragment_size).collect()
        };
        let count = chunks.len();
        if count > 1 {
            print_debug(
                &self.debug,
                DEBUG_LEVEL_HIGH,
                DEBUG_SRC_IP,
                format!(
                    "datagram {:#06x} of {} bytes split in {} fragments",
                    identification,
                    packet.payload.len(),
                    count
                ),
            );
        }
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut fields = Fields::new();
            fields
                .set("version", IP_VERSION as u64)
                .set("ihl", IP_IHL as u64)
                .set("total_length", (chunk.len() + IP_HEADER_LEN) as u64)
                .set("identification", identification as u64)
                .set("flags", if i + 1 < count { IP_FLAG_MF as u64 } else { 0 })
                .set("fragment_offset", ((i * self.fragment_size) / 8) as u64)
                .set("ttl", IP_TTL as u64)
                .set("protocol", packet.protocol as u64)
                .set_ip("sender_ip", &self.ip_address.get())
                .set_ip("target_ip", &packet.ip_address);
            let checksum = one_complement_sum(&IP_HEADER.encode(&fields), Some(IP_CHECKSUM_POS));
            fields.set("checksum", checksum as u64);
            let payload = self.packetizer.packetize(&fields, chunk);
            self.fragments.push_back(EthFrame {
                target_mac,
                sender_mac: self.mac_address,
                ethernet_type: ETHERNET_TYPE_IP,
                payload,
            });
        }
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
        let frame = match try_take(&self.port.source) {
            Some(frame) => frame,
            None => return progress,
        };
        if let Some(packet) = self.receive(&frame.payload) {
            self.stats.rx_packets += 1;
            self.rx_pending.send(&self.master.sink, packet);
        }
        true
    }
    // receive() method
    fn receive(&mut self, bytes: &[u8]) -> Option<IpPacket> {
        let (fields, mut payload) = match self.depacketizer.depacketize(bytes) {
            Some(packet) => packet,
            None => {
                self.stats.invalid += 1;
                self.drop_packet("truncated header");
                return None;
            }
        };
        if fields.get("version") != IP_VERSION as u64 || fields.get("ihl") != IP_IHL as u64 {
            self.stats.invalid += 1;
            self.drop_packet("unsupported version or options");
            return None;
        }
        if one_complement_sum(&bytes[..IP_HEADER_LEN], None) != 0 {
            self.stats.checksum_errors += 1;
            self.drop_packet("bad header checksum");
            return None;
        }
        if !self.with_broadcast && fields.get_ip("target_ip") != self.ip_address.get() {
            self.stats.not_for_us += 1;
            return None;
        }
        if fields.get("flags") & IP_FLAG_MF as u64 != 0 || fields.get("fragment_offset") != 0 {
            self.stats.fragments_dropped += 1;
            self.drop_packet("fragment received, no reassembly");
            return None;
        }
        let total_length = fields.get("total_length") as usize;
        if total_length < IP_HEADER_LEN || total_length - IP_HEADER_LEN > payload.len() {
            self.stats.invalid += 1;
            self.drop_packet("bad total length");
            return None;
        }
        // strip the Ethernet padding
        payload.truncate(total_length - IP_HEADER_LEN);
        Some(IpPacket {
            ip_address: fields.get_ip("sender_ip"),
            protocol: fields.get("protocol") as u8,
            payload,
        })
    }
    // drop_packet() method
    fn drop_packet(&self, reason: &str) {
        print_debug(
            &self.debug,
            DEBUG_LEVEL_MEDIUM,
            DEBUG_SRC_IP,
            format!("rx datagram dropped, {}", reason),
        );
    }
}

// fragment_size() function
/// largest fragment payload, a multiple of 8 bytes
pub fn fragment_size(mtu: usize) -> usize {
    (mtu.saturating_sub(IP_MTU_OVERHEAD + IP_HEADER_LEN) / 8 * 8).max(8)
}
