//! dynamic host configuration protocol (DHCP) client module
//! This module obtains the local IP address from a DHCP server through a
//! DISCOVER/OFFER/REQUEST/ACK exchange on a 32 bits UDP user port.
//! The lease time is reported but not tracked, renew() restarts an exchange.
use super::*;

// ip and udp
use crate::ip::{format_ip, SharedIp};
use crate::udp::{UdpUserPacket, UdpUserPort};

// stream
use crate::stream::{try_take, Pending};

// std
use std::time::{Duration, Instant};

// BOOTP header offsets
const BOOTP_XID: usize = 4;
const BOOTP_FLAGS: usize = 10;
const BOOTP_YIADDR: usize = 16;
const BOOTP_SIADDR: usize = 20;
const BOOTP_CHADDR: usize = 28;
const DHCP_OPTIONS: usize = DHCP_BOOTP_LEN + 4;

// the client works on 32 bits words
const DHCP_DW: usize = 4;

/// DHCP Client States Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DhcpState {
    Idle,
    SendDiscover,
    ReceiveOffer,
    SendRequest,
    ReceiveAck,
}

/// DHCP Lease Structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhcpLease {
    pub ip_address: [u8; 4],
    pub server_ip: [u8; 4],
    pub subnet_mask: [u8; 4],
    pub gateway: [u8; 4],
    pub lease_time: u32, // seconds, informative only
}

/// DHCP Message Structure (offer or ack)
#[derive(Debug, Clone, Copy, PartialEq)]
struct DhcpMessage {
    msg_type: u8,
    yiaddr: [u8; 4],
    server_ip: [u8; 4],
    subnet_mask: [u8; 4],
    gateway: [u8; 4],
    lease_time: u32,
}

/// DHCP Statistics Structure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DhcpStats {
    pub discovers: u64,
    pub requests: u64,
    pub offers: u64,
    pub acks: u64,
    pub dropped: u64,
    pub runts: u64, // replies too short for a message type option
    pub timeouts: u64,
}

/// DHCP Client Structure
#[derive(Debug)]
pub struct DhcpClient {
    mac_address: [u8; 6],
    ip_address: SharedIp,
    port: UdpUserPort,
    state: DhcpState,
    xid: u32,                    // transaction id, incremented per DISCOVER
    timeout: Duration,           // exchange timeout
    retry: Duration,             // delay between two exchanges while unbound
    started: Option<Instant>,    // exchange start
    idle_since: Option<Instant>, // None until the first exchange
    renew: bool,
    offer: Option<DhcpMessage>,
    lease: Option<DhcpLease>,
    tx_pending: Pending<UdpUserPacket>,
    stats: DhcpStats,
    debug: Verbose,
}

// DhcpClient Implementation
impl DhcpClient {
    // new() method
    pub fn new(
        mac_address: [u8; 6],
        ip_address: SharedIp,
        port: UdpUserPort,
        timeout: Duration,
        retry: Duration,
        debug: &Verbose,
    ) -> Result<DhcpClient, StackError> {
        if port.dw != DHCP_DW {
            return Err(StackError::Config(format!(
                "dhcp client needs a 32 bits udp port, got {} bits",
                port.dw * 8
            )));
        }
        Ok(DhcpClient {
            mac_address,
            ip_address,
            port,
            state: DhcpState::Idle,
            xid: 0,
            timeout,
            retry,
            started: None,
            idle_since: None,
            renew: false,
            offer: None,
            lease: None,
            tx_pending: Pending::new(),
            stats: DhcpStats::default(),
            debug: *debug,
        })
    }
    // state() getter
    pub fn state(&self) -> DhcpState {
        self.state
    }
    // lease() getter
    /// the current lease, None while unbound
    pub fn lease(&self) -> Option<DhcpLease> {
        self.lease
    }
    // xid() getter
    pub fn xid(&self) -> u32 {
        self.xid
    }
    // stats() getter
    pub fn stats(&self) -> DhcpStats {
        self.stats
    }
    // renew() method
    /// start a new exchange at the next step, bound or not
    pub fn renew(&mut self) {
        self.renew = true;
    }
    // step() method
    pub fn step(&mut self, now: Instant) -> bool {
        let mut progress = false;
        if self.tx_pending.is_busy() {
            if !self.tx_pending.flush(&self.port.sink) {
                return false;
            }
            progress = true;
        }
        // exchange timeout
        if self.state != DhcpState::Idle {
            if let Some(started) = self.started {
                if now.duration_since(started) >= self.timeout {
                    self.stats.timeouts += 1;
                    self.lease = None;
                    print_debug(
                        &self.debug,
                        DEBUG_LEVEL_MEDIUM,
                        DEBUG_SRC_DHCP,
                        format!("transaction {:#010x} timed out", self.xid),
                    );
                    self.set_state(DhcpState::Idle);
                    self.idle_since = Some(now);
                    return true;
                }
            }
        }
        let next = match self.state {
            DhcpState::Idle => {
                progress |= self.drain();
                let retry = match self.idle_since {
                    None => true,
                    Some(since) => self.lease.is_none() && now.duration_since(since) >= self.retry,
                };
                if self.renew || retry {
                    self.renew = false;
                    self.xid = self.xid.wrapping_add(1);
                    self.started = Some(now);
                    DhcpState::SendDiscover
                } else {
                    DhcpState::Idle
                }
            }
            DhcpState::SendDiscover => {
                let packet = self.build(DHCP_MSG_DISCOVER);
                self.tx_pending.send(&self.port.sink, packet);
                self.stats.discovers += 1;
                DhcpState::ReceiveOffer
            }
            DhcpState::ReceiveOffer => match self.receive(DHCP_MSG_OFFER, &mut progress) {
                Some(offer) => {
                    self.stats.offers += 1;
                    print_debug(
                        &self.debug,
                        DEBUG_LEVEL_HIGH,
                        DEBUG_SRC_DHCP,
                        format!(
                            "offer of {} from {}",
                            format_ip(&offer.yiaddr),
                            format_ip(&offer.server_ip)
                        ),
                    );
                    self.offer = Some(offer);
                    DhcpState::SendRequest
                }
                None => DhcpState::ReceiveOffer,
            },
            DhcpState::SendRequest => {
                let packet = self.build(DHCP_MSG_REQUEST);
                self.tx_pending.send(&self.port.sink, packet);
                self.stats.requests += 1;
                DhcpState::ReceiveAck
            }
            DhcpState::ReceiveAck => match (self.receive(DHCP_MSG_ACK, &mut progress), self.offer) {
                (Some(ack), Some(offer)) => {
                    self.stats.acks += 1;
                    let lease = DhcpLease {
                        ip_address: offer.yiaddr,
                        server_ip: offer.server_ip,
                        subnet_mask: ack.subnet_mask,
                        gateway: ack.gateway,
                        lease_time: ack.lease_time,
                    };
                    self.ip_address.set(lease.ip_address);
                    self.lease = Some(lease);
                    self.idle_since = Some(now);
                    print_debug(
                        &self.debug,
                        DEBUG_LEVEL_INFO,
                        DEBUG_SRC_DHCP,
                        format!(
                            "bound to {}, lease of {} seconds",
                            format_ip(&lease.ip_address),
                            lease.lease_time
                        ),
                    );
                    DhcpState::Idle
                }
                _ => DhcpState::ReceiveAck,
            },
        };
        if next != self.state {
            self.set_state(next);
            progress = true;
        }
        progress
    }
    // set_state() method
    fn set_state(&mut self, next: DhcpState) {
        print_debug(
            &self.debug,
            DEBUG_LEVEL_EXTENSIVE,
            DEBUG_SRC_DHCP,
            format!("{:?} -> {:?}", self.state, next),
        );
        self.state = next;
    }
    // drain() method
    /// drop the messages received outside of an exchange
    fn drain(&mut self) -> bool {
        let mut progress = false;
        while try_take(&self.port.source).is_some() {
            self.stats.dropped += 1;
            progress = true;
        }
        progress
    }
    // receive() method
    /// take the next message, Some when it is the expected reply
    fn receive(&mut self, msg_type: u8, progress: &mut bool) -> Option<DhcpMessage> {
        let packet = try_take(&self.port.source)?;
        *progress = true;
        if packet.length < DHCP_OPTIONS + 4 {
            self.stats.runts += 1;
        }
        match self.parse(&packet) {
            Some(message) if message.msg_type == msg_type => Some(message),
            _ => {
                self.stats.dropped += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_MEDIUM,
                    DEBUG_SRC_DHCP,
                    format!("unexpected message from {} dropped", format_ip(&packet.ip_address)),
                );
                None
            }
        }
    }
    // parse() method
    fn parse(&self, packet: &UdpUserPacket) -> Option<DhcpMessage> {
        if packet.src_port != DHCP_SERVER_PORT || packet.length < DHCP_OPTIONS + 4 {
            return None;
        }
        let bytes = packet.bytes(self.port.dw);
        if bytes.len() < DHCP_OPTIONS + 4
            || bytes[0] != DHCP_OP_BOOTREPLY
            || read_u32(&bytes, BOOTP_XID) != self.xid
            || bytes[BOOTP_CHADDR..BOOTP_CHADDR + 6] != self.mac_address
            || read_u32(&bytes, DHCP_BOOTP_LEN) != DHCP_MAGIC_COOKIE
        {
            return None;
        }
        let mut msg_type = None;
        let mut subnet_mask = None;
        let mut gateway = None;
        let mut lease_time = None;
        let mut server_ip = read_ip(&bytes, BOOTP_SIADDR);
        let mut end = false;
        let mut i = DHCP_OPTIONS;
        while i < bytes.len() {
            let code = bytes[i];
            if code == DHCP_OPT_PAD {
                i += 1;
                continue;
            }
            if code == DHCP_OPT_END {
                end = true;
                break;
            }
            let len = *bytes.get(i + 1)? as usize;
            let value = bytes.get(i + 2..i + 2 + len)?;
            match code {
                DHCP_OPT_MESSAGE_TYPE if len >= 1 => msg_type = Some(value[0]),
                DHCP_OPT_SUBNET_MASK if len >= 4 => subnet_mask = Some(read_ip(value, 0)),
                DHCP_OPT_ROUTER if len >= 4 => gateway = Some(read_ip(value, 0)),
                DHCP_OPT_LEASE_TIME if len >= 4 => lease_time = Some(read_u32(value, 0)),
                DHCP_OPT_SRV_IP_ADDRESS if len >= 4 => server_ip = read_ip(value, 0),
                _ => {}
            }
            i += 2 + len;
        }
        if !end {
            return None;
        }
        let msg_type = msg_type.filter(|t| *t == DHCP_MSG_OFFER || *t == DHCP_MSG_ACK)?;
        Some(DhcpMessage {
            msg_type,
            yiaddr: read_ip(&bytes, BOOTP_YIADDR),
            server_ip,
            subnet_mask: subnet_mask?,
            gateway: gateway?,
            lease_time: lease_time?,
        })
    }
    // build() method
    /// build a DISCOVER or a REQUEST (for the current offer)
    fn build(&self, msg_type: u8) -> UdpUserPacket {
        let mut bytes = vec![0u8; DHCP_BOOTP_LEN];
        bytes[0] = DHCP_OP_BOOTREQUEST;
        bytes[1] = DHCP_HTYPE_ETHERNET;
        bytes[2] = 6;
        bytes[BOOTP_XID..BOOTP_XID + 4].copy_from_slice(&self.xid.to_be_bytes());
        bytes[BOOTP_FLAGS..BOOTP_FLAGS + 2].copy_from_slice(&DHCP_FLAGS_BROADCAST.to_be_bytes());
        bytes[BOOTP_CHADDR..BOOTP_CHADDR + 6].copy_from_slice(&self.mac_address);
        bytes.extend_from_slice(&DHCP_MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(&[DHCP_OPT_MESSAGE_TYPE, 1, msg_type]);
        bytes.extend_from_slice(&[DHCP_OPT_CLIENT_IDENTIFIER, 6]);
        bytes.extend_from_slice(&self.mac_address);
        bytes.extend_from_slice(&[DHCP_OPT_PARAM_REQUEST_LIST, 2, DHCP_OPT_SUBNET_MASK, DHCP_OPT_ROUTER]);
        if msg_type == DHCP_MSG_REQUEST {
            if let Some(offer) = self.offer {
                bytes.extend_from_slice(&[DHCP_OPT_REQ_IP_ADDRESS, 4]);
                bytes.extend_from_slice(&offer.yiaddr);
                bytes.extend_from_slice(&[DHCP_OPT_SRV_IP_ADDRESS, 4]);
                bytes.extend_from_slice(&offer.server_ip);
            }
        }
        bytes.push(DHCP_OPT_END);
        UdpUserPacket::from_bytes(
            [255, 255, 255, 255],
            DHCP_CLIENT_PORT,
            DHCP_SERVER_PORT,
            &bytes,
            self.port.dw,
        )
    }
}

// read_u32() function
fn read_u32(bytes: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}

// read_ip() function
fn read_ip(bytes: &[u8], pos: usize) -> [u8; 4] {
    [bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::pipe;
    use crossbeam::channel::{Receiver, Sender};

    const LOCAL_MAC: [u8; 6] = [0x10, 0xe2, 0xd5, 0x00, 0x00, 0x01];
    const SERVER_IP: [u8; 4] = [192, 168, 1, 1];
    const OFFERED_IP: [u8; 4] = [192, 168, 1, 77];

    struct Bench {
        client: DhcpClient,
        ip: SharedIp,
        to_server: Receiver<UdpUserPacket>,
        from_server: Sender<UdpUserPacket>,
    }

    fn bench() -> Bench {
        let (sink, to_server) = pipe(4);
        let (from_server, source) = pipe(4);
        let ip = SharedIp::new([0; 4]);
        let client = DhcpClient::new(
            LOCAL_MAC,
            ip.clone(),
            UdpUserPort {
                port: DHCP_CLIENT_PORT,
                dw: 4,
                sink,
                source,
            },
            Duration::from_millis(DHCP_DFLT_TIMEOUT_MS),
            Duration::from_millis(DHCP_DFLT_RETRY_MS),
            &Verbose::default(),
        )
        .unwrap();
        Bench {
            client,
            ip,
            to_server,
            from_server,
        }
    }

    fn run(b: &mut Bench, now: Instant) {
        while b.client.step(now) {}
    }

    fn reply(xid: u32, msg_type: u8) -> UdpUserPacket {
        let mut bytes = vec![0u8; DHCP_BOOTP_LEN];
        bytes[0] = DHCP_OP_BOOTREPLY;
        bytes[1] = 1;
        bytes[2] = 6;
        bytes[4..8].copy_from_slice(&xid.to_be_bytes());
        bytes[16..20].copy_from_slice(&OFFERED_IP);
        bytes[28..34].copy_from_slice(&LOCAL_MAC);
        bytes.extend_from_slice(&DHCP_MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(&[53, 1, msg_type, 0, 0]);
        bytes.extend_from_slice(&[1, 4, 255, 255, 255, 0]);
        bytes.extend_from_slice(&[3, 4, 192, 168, 1, 254]);
        bytes.extend_from_slice(&[51, 4, 0, 0, 0x0e, 0x10]);
        bytes.extend_from_slice(&[54, 4]);
        bytes.extend_from_slice(&SERVER_IP);
        bytes.push(255);
        UdpUserPacket::from_bytes(SERVER_IP, 67, 68, &bytes, 4)
    }

    fn options(packet: &UdpUserPacket) -> Vec<u8> {
        packet.bytes(4)[DHCP_OPTIONS..].to_vec()
    }

    #[test]
    fn full_exchange_binds_the_offered_address() {
        let mut b = bench();
        let now = Instant::now();
        run(&mut b, now);
        let discover = b.to_server.try_recv().unwrap();
        assert_eq!(discover.ip_address, [255, 255, 255, 255]);
        assert_eq!((discover.src_port, discover.dst_port), (68, 67));
        assert_eq!(discover.length, 256);
        let bytes = discover.bytes(4);
        assert_eq!(&bytes[..4], &[1, 1, 6, 0]);
        assert_eq!(read_u32(&bytes, BOOTP_XID), b.client.xid());
        assert_eq!(&bytes[10..12], &[0x80, 0x00]);
        assert_eq!(&bytes[28..34], &LOCAL_MAC);
        assert_eq!(&bytes[236..240], &[0x63, 0x82, 0x53, 0x63]);
        assert_eq!(
            options(&discover),
            vec![53, 1, 1, 61, 6, 0x10, 0xe2, 0xd5, 0, 0, 1, 55, 2, 1, 3, 255]
        );
        assert_eq!(b.client.state(), DhcpState::ReceiveOffer);

        b.from_server.send(reply(b.client.xid(), DHCP_MSG_OFFER)).unwrap();
        run(&mut b, now);
        let request = b.to_server.try_recv().unwrap();
        assert_eq!(request.length, 268);
        let opts = options(&request);
        assert_eq!(&opts[..3], &[53, 1, 3]);
        assert_eq!(&opts[15..27], &[50, 4, 192, 168, 1, 77, 54, 4, 192, 168, 1, 1]);
        assert_eq!(opts[27], 255);

        b.from_server.send(reply(b.client.xid(), DHCP_MSG_ACK)).unwrap();
        run(&mut b, now);
        assert_eq!(b.client.state(), DhcpState::Idle);
        assert_eq!(b.ip.get(), OFFERED_IP);
        let lease = b.client.lease().unwrap();
        assert_eq!(lease.gateway, [192, 168, 1, 254]);
        assert_eq!(lease.subnet_mask, [255, 255, 255, 0]);
        assert_eq!(lease.lease_time, 3600);
        // bound, no new exchange
        run(&mut b, now + Duration::from_secs(60));
        assert!(b.to_server.try_recv().is_err());
    }

    #[test]
    fn mismatching_transaction_is_ignored() {
        let mut b = bench();
        let now = Instant::now();
        run(&mut b, now);
        b.to_server.try_recv().unwrap();
        b.from_server.send(reply(b.client.xid() + 1, DHCP_MSG_OFFER)).unwrap();
        b.from_server.send(reply(b.client.xid(), DHCP_MSG_ACK)).unwrap();
        run(&mut b, now);
        assert_eq!(b.client.state(), DhcpState::ReceiveOffer);
        assert_eq!(b.client.stats().dropped, 2);
    }

    #[test]
    fn shortest_reply_reaches_the_option_parser() {
        let mut b = bench();
        let now = Instant::now();
        run(&mut b, now);
        b.to_server.try_recv().unwrap();
        let xid = b.client.xid();
        let shortest = |options: &[u8]| {
            let mut bytes = reply(xid, DHCP_MSG_OFFER).bytes(4);
            bytes.truncate(DHCP_OPTIONS);
            bytes.extend_from_slice(options);
            UdpUserPacket::from_bytes(SERVER_IP, 67, 68, &bytes, 4)
        };
        let runt = shortest(&[53, 1, DHCP_MSG_OFFER]);
        let minimal = shortest(&[53, 1, DHCP_MSG_OFFER, 255]);
        assert_eq!(minimal.length, DHCP_OPTIONS + 4);
        b.from_server.send(runt).unwrap();
        b.from_server.send(minimal).unwrap();
        run(&mut b, now);
        // the minimal offer is parsed but lacks the lease options
        let stats = b.client.stats();
        assert_eq!(stats.runts, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(b.client.state(), DhcpState::ReceiveOffer);
    }

    #[test]
    fn timeout_then_retry_with_a_new_transaction() {
        let mut b = bench();
        let start = Instant::now();
        run(&mut b, start);
        b.to_server.try_recv().unwrap();
        let xid = b.client.xid();
        run(&mut b, start + Duration::from_millis(999));
        assert_eq!(b.client.state(), DhcpState::ReceiveOffer);
        let timed_out = start + Duration::from_millis(1000);
        run(&mut b, timed_out);
        assert_eq!(b.client.state(), DhcpState::Idle);
        assert_eq!(b.client.stats().timeouts, 1);
        run(&mut b, timed_out + Duration::from_millis(3999));
        assert!(b.to_server.try_recv().is_err());
        run(&mut b, timed_out + Duration::from_millis(4000));
        b.to_server.try_recv().unwrap();
        assert_eq!(b.client.xid(), xid + 1);
    }

    #[test]
    fn renew_restarts_a_bound_client() {
        let mut b = bench();
        let now = Instant::now();
        run(&mut b, now);
        b.to_server.try_recv().unwrap();
        b.from_server.send(reply(b.client.xid(), DHCP_MSG_OFFER)).unwrap();
        run(&mut b, now);
        b.to_server.try_recv().unwrap();
        b.from_server.send(reply(b.client.xid(), DHCP_MSG_ACK)).unwrap();
        run(&mut b, now);
        assert!(b.client.lease().is_some());
        b.client.renew();
        run(&mut b, now);
        let discover = b.to_server.try_recv().unwrap();
        assert_eq!(options(&discover)[2], DHCP_MSG_DISCOVER);
    }
}
