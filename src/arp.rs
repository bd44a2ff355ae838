//! address resolution protocol (ARP) module
//! This module answers the ARP requests targeting the local IP address and
//! resolves the next-hop MAC addresses needed by the IPv4 transmit path.
use super::*;

// crossbar and MAC
use crate::crossbar::CrossbarPort;
use crate::mac::{format_mac, EthFrame};

// ip
use crate::ip::{format_ip, SharedIp};

// packets
use crate::packets::{Depacketizer, Fields, Header, HeaderField, Packetizer};

// stream
use crate::stream::{pipe, try_take, Pending};

// crossbeam
use crossbeam::channel::{Receiver, Sender};

// std
use std::time::{Duration, Instant};

static ARP_FIELDS: [HeaderField; 9] = [
    HeaderField::new("hwtype", 0, 0, 16),
    HeaderField::new("proto", 2, 0, 16),
    HeaderField::new("hwsize", 4, 0, 8),
    HeaderField::new("protosize", 5, 0, 8),
    HeaderField::new("opcode", 6, 0, 16),
    HeaderField::new("sender_mac", 8, 0, 48),
    HeaderField::new("sender_ip", 14, 0, 32),
    HeaderField::new("target_mac", 18, 0, 48),
    HeaderField::new("target_ip", 24, 0, 32),
];
pub static ARP_HEADER: Header = Header {
    fields: &ARP_FIELDS,
    length: ARP_HEADER_LEN,
};

/// ARP Lookup Request Structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArpRequest {
    pub ip_address: [u8; 4],
}

/// ARP Lookup Response Structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArpResponse {
    pub ip_address: [u8; 4],
    pub mac_address: [u8; 6],
    pub failed: bool,
}

/// ARP Table Port Structure
/// The lookup interface used by the IPv4 transmit path.
#[derive(Debug)]
pub struct ArpTablePort {
    pub request: Sender<ArpRequest>,
    pub response: Receiver<ArpResponse>,
}

/// ARP Parameters Structure
#[derive(Debug, Clone, Copy)]
pub struct ArpParameters {
    pub entries: usize,                   // cache slots
    pub max_requests: usize,              // requests sent before failing a lookup
    pub timeout: Duration,                // delay between two requests
    pub cache_timeout: Option<Duration>,  // cached entries lifetime
}

impl Default for ArpParameters {
    fn default() -> Self {
        ArpParameters {
            entries: ARP_DFLT_ENTRIES,
            max_requests: ARP_DFLT_MAX_REQUESTS,
            timeout: Duration::from_millis(ARP_DFLT_TIMEOUT_MS),
            cache_timeout: Some(Duration::from_millis(ARP_DFLT_CACHE_TIMEOUT_MS)),
        }
    }
}

/// ARP Statistics Structure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArpStats {
    pub rx_requests: u64,
    pub rx_replies: u64,
    pub tx_requests: u64,
    pub tx_replies: u64,
    pub invalid: u64,
    pub dropped_busy: u64,
    pub resolved: u64,
    pub failed: u64,
}

/// ARP Cache Entry Structure
#[derive(Debug, Clone, Copy)]
struct ArpEntry {
    ip_address: [u8; 4],
    mac_address: [u8; 6],
    valid: bool,
    updated: Option<Instant>,
}

/// ARP Cache Structure
///
/// A fixed array of entries scanned linearly on every lookup. With a single
/// entry it degenerates to an overwrite cache.
#[derive(Debug)]
pub struct ArpCache {
    entries: Vec<ArpEntry>,
    next: usize,
    timeout: Option<Duration>,
}

// ArpCache Implementation
impl ArpCache {
    // new() method
    pub fn new(entries: usize, timeout: Option<Duration>) -> ArpCache {
        ArpCache {
            entries: vec![
                ArpEntry {
                    ip_address: [0; 4],
                    mac_address: [0; 6],
                    valid: false,
                    updated: None,
                };
                entries.max(1)
            ],
            next: 0,
            timeout,
        }
    }
    // expire() method
    /// invalidate the entries older than the cache timeout
    pub fn expire(&mut self, now: Instant) {
        let timeout = match self.timeout {
            Some(t) => t,
            None => return,
        };
        for e in self.entries.iter_mut().filter(|e| e.valid) {
            if let Some(updated) = e.updated {
                if now.duration_since(updated) >= timeout {
                    e.valid = false;
                }
            }
        }
    }
    // lookup() method
    pub fn lookup(&mut self, ip_address: [u8; 4], now: Instant) -> Option<[u8; 6]> {
        self.expire(now);
        self.entries
            .iter()
            .find(|e| e.valid && e.ip_address == ip_address)
            .map(|e| e.mac_address)
    }
    // insert() method
    /// refresh the entry of the same IP, else fill a free slot, else overwrite
    /// the slots in turn
    pub fn insert(&mut self, ip_address: [u8; 4], mac_address: [u8; 6], now: Instant) {
        let idx = match self
            .entries
            .iter()
            .position(|e| e.valid && e.ip_address == ip_address)
        {
            Some(idx) => idx,
            None => match self.entries.iter().position(|e| !e.valid) {
                Some(idx) => idx,
                None => {
                    let idx = self.next;
                    self.next = (self.next + 1) % self.entries.len();
                    idx
                }
            },
        };
        self.entries[idx] = ArpEntry {
            ip_address,
            mac_address,
            valid: true,
            updated: Some(now),
        };
    }
    // len() method
    /// number of valid entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }
}

/// ARP Packet Structure
#[derive(Debug, Clone, Copy, PartialEq)]
struct ArpPacket {
    opcode: u16,
    sender_mac: [u8; 6],
    sender_ip: [u8; 4],
    target_mac: [u8; 6],
    target_ip: [u8; 4],
}

/// ARP Table States Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArpState {
    Idle,
    SendReply([u8; 4], [u8; 6]),
    CheckRequest([u8; 4], [u8; 6]),
    UpdateTable([u8; 4], [u8; 6]),
    CheckTable,
    SendRequest,
    PresentResponse(ArpResponse),
}

/// ARP Core Structure
#[derive(Debug)]
pub struct ArpCore {
    mac_address: [u8; 6],
    ip_address: SharedIp,
    params: ArpParameters,
    port: CrossbarPort<EthFrame>,
    packetizer: Packetizer,
    depacketizer: Depacketizer,
    // table
    state: ArpState,
    cache: ArpCache,
    pending: bool,              // a request is outstanding
    request_ip: [u8; 4],        // address being resolved
    counter: usize,             // requests sent for request_ip
    deadline: Option<Instant>,  // next retry
    lookups: Receiver<ArpRequest>,
    responses: Sender<ArpResponse>,
    table_port: Option<ArpTablePort>,
    tx_pending: Pending<EthFrame>,
    response_pending: Pending<ArpResponse>,
    stats: ArpStats,
    debug: Verbose,
}

// ArpCore Implementation
impl ArpCore {
    // new() method
    pub fn new(
        mac_address: [u8; 6],
        ip_address: SharedIp,
        params: ArpParameters,
        port: CrossbarPort<EthFrame>,
        dw: usize,
        debug: &Verbose,
    ) -> ArpCore {
        let (request, lookups) = pipe(1);
        let (responses, response) = pipe(1);
        ArpCore {
            mac_address,
            ip_address,
            params,
            port,
            packetizer: Packetizer::new(&ARP_HEADER, dw),
            depacketizer: Depacketizer::new(&ARP_HEADER, dw),
            state: ArpState::Idle,
            cache: ArpCache::new(params.entries, params.cache_timeout),
            pending: false,
            request_ip: [0; 4],
            counter: 0,
            deadline: None,
            lookups,
            responses,
            table_port: Some(ArpTablePort { request, response }),
            tx_pending: Pending::new(),
            response_pending: Pending::new(),
            stats: ArpStats::default(),
            debug: *debug,
        }
    }
    // table_port() method
    /// hand over the lookup interface, available once
    pub fn table_port(&mut self) -> Option<ArpTablePort> {
        self.table_port.take()
    }
    // state() getter
    pub fn state(&self) -> ArpState {
        self.state
    }
    // stats() getter
    pub fn stats(&self) -> ArpStats {
        self.stats
    }
    // cache() getter
    pub fn cache(&self) -> &ArpCache {
        &self.cache
    }
    // step() method
    pub fn step(&mut self, now: Instant) -> bool {
        let mut progress = false;
        if self.tx_pending.is_busy() {
            progress |= self.tx_pending.flush(&self.port.sink);
        }
        if self.response_pending.is_busy() {
            progress |= self.response_pending.flush(&self.responses);
        }
        // inbound packets presented while the table is busy are lost
        let mut event = None;
        if let Some(frame) = try_take(&self.port.source) {
            progress = true;
            if let Some(packet) = self.receive(frame) {
                if self.state == ArpState::Idle {
                    event = Some(packet);
                } else {
                    self.stats.dropped_busy += 1;
                    print_debug(
                        &self.debug,
                        DEBUG_LEVEL_MEDIUM,
                        DEBUG_SRC_ARP,
                        format!("table busy, packet from {} dropped", format_ip(&packet.sender_ip)),
                    );
                }
            }
        }
        progress | self.table_step(event, now)
    }
    // receive() method
    /// decode and validate an inbound ARP packet
    fn receive(&mut self, frame: EthFrame) -> Option<ArpPacket> {
        let (fields, _) = match self.depacketizer.depacketize(&frame.payload) {
            Some(packet) => packet,
            None => {
                self.stats.invalid += 1;
                return None;
            }
        };
        let packet = ArpPacket {
            opcode: fields.get("opcode") as u16,
            sender_mac: fields.get_mac("sender_mac"),
            sender_ip: fields.get_ip("sender_ip"),
            target_mac: fields.get_mac("target_mac"),
            target_ip: fields.get_ip("target_ip"),
        };
        let valid = fields.get("hwtype") == ARP_HWTYPE_ETHERNET as u64
            && fields.get("proto") == ARP_PROTO_IP as u64
            && fields.get("hwsize") == 6
            && fields.get("protosize") == 4
            && packet.target_ip == self.ip_address.get()
            && (packet.opcode == ARP_OPCODE_REQUEST || packet.opcode == ARP_OPCODE_REPLY);
        if !valid {
            self.stats.invalid += 1;
            print_debug(
                &self.debug,
                DEBUG_LEVEL_EXTENSIVE,
                DEBUG_SRC_ARP,
                format!("ignoring packet for {}", format_ip(&packet.target_ip)),
            );
            return None;
        }
        if packet.opcode == ARP_OPCODE_REQUEST {
            self.stats.rx_requests += 1;
        } else {
            self.stats.rx_replies += 1;
        }
        Some(packet)
    }
    // table_step() method
    /// one transition of the table state machine
    fn table_step(&mut self, event: Option<ArpPacket>, now: Instant) -> bool {
        let next = match self.state {
            ArpState::Idle => {
                if let Some(packet) = event {
                    if packet.opcode == ARP_OPCODE_REQUEST {
                        ArpState::SendReply(packet.sender_ip, packet.sender_mac)
                    } else if self.pending {
                        ArpState::CheckRequest(packet.sender_ip, packet.sender_mac)
                    } else {
                        return true;
                    }
                } else if self.pending && self.deadline.map_or(true, |d| now >= d) {
                    if self.counter >= self.params.max_requests {
                        self.pending = false;
                        self.counter = 0;
                        self.deadline = None;
                        self.stats.failed += 1;
                        print_debug(
                            &self.debug,
                            DEBUG_LEVEL_MEDIUM,
                            DEBUG_SRC_ARP,
                            format!("no reply from {}, giving up", format_ip(&self.request_ip)),
                        );
                        ArpState::PresentResponse(ArpResponse {
                            ip_address: self.request_ip,
                            mac_address: [0; 6],
                            failed: true,
                        })
                    } else {
                        ArpState::SendRequest
                    }
                } else if !self.pending {
                    match try_take(&self.lookups) {
                        Some(request) => {
                            self.request_ip = request.ip_address;
                            self.counter = 0;
                            ArpState::CheckTable
                        }
                        None => return false,
                    }
                } else {
                    return false;
                }
            }
            ArpState::SendReply(ip, mac) => {
                if self.tx_pending.is_busy() {
                    return false;
                }
                let frame = self.build(ARP_OPCODE_REPLY, mac, ip);
                self.tx_pending.send(&self.port.sink, frame);
                self.stats.tx_replies += 1;
                ArpState::Idle
            }
            ArpState::CheckRequest(ip, mac) => {
                if ip == self.request_ip {
                    ArpState::UpdateTable(ip, mac)
                } else {
                    ArpState::Idle
                }
            }
            ArpState::UpdateTable(ip, mac) => {
                self.cache.insert(ip, mac, now);
                self.pending = false;
                self.counter = 0;
                self.deadline = None;
                self.stats.resolved += 1;
                ArpState::PresentResponse(ArpResponse {
                    ip_address: ip,
                    mac_address: mac,
                    failed: false,
                })
            }
            ArpState::CheckTable => match self.cache.lookup(self.request_ip, now) {
                Some(mac) => ArpState::PresentResponse(ArpResponse {
                    ip_address: self.request_ip,
                    mac_address: mac,
                    failed: false,
                }),
                None => ArpState::SendRequest,
            },
            ArpState::SendRequest => {
                if self.tx_pending.is_busy() {
                    return false;
                }
                let frame = self.build(ARP_OPCODE_REQUEST, ETH_BCAST_MAC, self.request_ip);
                self.tx_pending.send(&self.port.sink, frame);
                self.counter += 1;
                self.pending = true;
                self.deadline = Some(now + self.params.timeout);
                self.stats.tx_requests += 1;
                ArpState::Idle
            }
            ArpState::PresentResponse(response) => {
                if self.response_pending.is_busy() {
                    return false;
                }
                self.response_pending.send(&self.responses, response);
                ArpState::Idle
            }
        };
        if next != self.state {
            print_debug(
                &self.debug,
                DEBUG_LEVEL_EXTENSIVE,
                DEBUG_SRC_ARP,
                format!("table {:?} -> {:?}", self.state, next),
            );
        }
        self.state = next;
        true
    }
    // build() method
    /// build an ARP frame, padded to the minimum Ethernet payload
    fn build(&mut self, opcode: u16, target_mac: [u8; 6], target_ip: [u8; 4]) -> EthFrame {
        let mut fields = Fields::new();
        fields
            .set("hwtype", ARP_HWTYPE_ETHERNET as u64)
            .set("proto", ARP_PROTO_IP as u64)
            .set("hwsize", 6)
            .set("protosize", 4)
            .set("opcode", opcode as u64)
            .set_mac("sender_mac", &self.mac_address)
            .set_ip("sender_ip", &self.ip_address.get())
            .set_mac("target_mac", &target_mac)
            .set_ip("target_ip", &target_ip);
        let mut payload = self.packetizer.packetize(&fields, &[]);
        payload.resize(ETH_MIN_LEN.max(ARP_HEADER_LEN), 0);
        print_debug(
            &self.debug,
            DEBUG_LEVEL_HIGH,
            DEBUG_SRC_ARP,
            format!(
                "sending {} for {} to {}",
                if opcode == ARP_OPCODE_REQUEST { "request" } else { "reply" },
                format_ip(&target_ip),
                format_mac(&target_mac)
            ),
        );
        EthFrame {
            target_mac,
            sender_mac: self.mac_address,
            ethernet_type: ETHERNET_TYPE_ARP,
            payload,
        }
    }
}
