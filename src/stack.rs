//! stack module
//! This module assembles the layers into a full UDP/IP stack: MAC, ARP, IPv4,
//! optional ICMP, UDP, optional DHCP client, an optional Etherbone bridge
//! to an emulated SRAM and an optional UDP byte streamer.
use super::*;

// layers
use crate::arp::{ArpCore, ArpParameters, ArpStats};
use crate::dhcp::{DhcpClient, DhcpStats};
use crate::etherbone::{EtherboneCore, EtherboneStats, Sram};
use crate::icmp::{IcmpCore, IcmpStats};
use crate::ip::{format_ip, IpCore, IpStats, SharedIp};
use crate::mac::{format_mac, MacCore, MacStats, PhyPort};
use crate::streamer::{ByteStream, StreamerParameters, StreamerStats, UdpStreamer};
use crate::udp::{UdpCore, UdpStats, UdpUserPort};

// std
use std::time::{Duration, Instant};

/// Etherbone Parameters Structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtherboneParameters {
    pub port: u16,
    pub buffer_depth: usize,
    pub sram_base: u32,
    pub sram_size: usize, // bytes
}

impl Default for EtherboneParameters {
    fn default() -> Self {
        EtherboneParameters {
            port: ETHERBONE_DFLT_PORT,
            buffer_depth: ETHERBONE_DFLT_BUFFER_DEPTH,
            sram_base: SRAM_DFLT_BASE,
            sram_size: SRAM_DFLT_SIZE,
        }
    }
}

/// Stack Configuration Structure
///
/// Everything needed to build a `UdpIpCore`. A `None` IP address enables the
/// DHCP client, the address is then learned from the lease.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub mac_address: [u8; 6],
    pub ip_address: Option<[u8; 4]>,
    pub dw: usize, // datapath width in bytes
    pub arp: ArpParameters,
    pub mtu: usize,
    pub with_icmp: bool,
    pub with_ip_broadcast: bool,
    pub with_preamble_crc: bool,
    pub interpacket_gap: usize,
    pub depth: usize,
    pub icmp_echo_depth: usize,
    pub dhcp_timeout: Duration,
    pub dhcp_retry: Duration,
    pub etherbone: Option<EtherboneParameters>,
    pub streamer: Option<StreamerParameters>,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            mac_address: BOARD_DFLT_MAC,
            ip_address: Some([192, 168, 1, 50]),
            dw: BOARD_DFLT_DW_BITS / 8,
            arp: ArpParameters::default(),
            mtu: ETH_MTU,
            with_icmp: true,
            with_ip_broadcast: true,
            with_preamble_crc: false,
            interpacket_gap: ETH_INTERPACKET_GAP,
            depth: STREAM_DFLT_DEPTH,
            icmp_echo_depth: ICMP_DFLT_ECHO_DEPTH,
            dhcp_timeout: Duration::from_millis(DHCP_DFLT_TIMEOUT_MS),
            dhcp_retry: Duration::from_millis(DHCP_DFLT_RETRY_MS),
            etherbone: Some(EtherboneParameters::default()),
            streamer: None,
        }
    }
}

/// Stack Statistics Structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackStats {
    pub mac: MacStats,
    pub arp: ArpStats,
    pub ip: IpStats,
    pub icmp: Option<IcmpStats>,
    pub udp: UdpStats,
    pub dhcp: Option<DhcpStats>,
    pub etherbone: Option<EtherboneStats>,
    pub streamer: Option<StreamerStats>,
}

/// UDP/IP Core Structure
#[derive(Debug)]
pub struct UdpIpCore {
    ip_address: SharedIp,
    mac: MacCore,
    arp: ArpCore,
    ip: IpCore,
    icmp: Option<IcmpCore>,
    udp: UdpCore,
    dhcp: Option<DhcpClient>,
    etherbone: Option<EtherboneCore<Sram>>,
    streamer: Option<UdpStreamer>,
    debug: Verbose,
}

// UdpIpCore Implementation
impl UdpIpCore {
    // new() method
    pub fn new(config: &StackConfig, debug: &Verbose) -> Result<UdpIpCore, StackError> {
        if config.arp.entries == 0 {
            return Err(StackError::Config("at least one ARP entry is needed".to_string()));
        }
        let ip_address = SharedIp::new(config.ip_address.unwrap_or([0; 4]));
        let mut mac = MacCore::new(
            config.mac_address,
            config.dw,
            config.with_preamble_crc,
            config.interpacket_gap,
            config.depth,
            debug,
        )?;
        let mut arp = ArpCore::new(
            config.mac_address,
            ip_address.clone(),
            config.arp,
            mac.get_port(ETHERNET_TYPE_ARP)?,
            config.dw,
            debug,
        );
        let table = arp
            .table_port()
            .ok_or_else(|| StackError::Config("ARP table already attached".to_string()))?;
        let mut ip = IpCore::new(
            config.mac_address,
            ip_address.clone(),
            config.mtu,
            config.with_ip_broadcast,
            mac.get_port(ETHERNET_TYPE_IP)?,
            table,
            config.dw,
            config.depth,
            debug,
        );
        let icmp = if config.with_icmp {
            Some(IcmpCore::new(
                ip.get_port(ICMP_PROTOCOL)?,
                config.dw,
                config.icmp_echo_depth,
                debug,
            ))
        } else {
            None
        };
        let mut udp = UdpCore::new(ip.get_port(UDP_PROTOCOL)?, config.dw, config.depth, debug);
        let dhcp = match config.ip_address {
            Some(_) => None,
            None => Some(DhcpClient::new(
                config.mac_address,
                ip_address.clone(),
                udp.get_port(DHCP_CLIENT_PORT, 4)?,
                config.dhcp_timeout,
                config.dhcp_retry,
                debug,
            )?),
        };
        let etherbone = match config.etherbone {
            Some(params) => Some(EtherboneCore::new(
                udp.get_port(params.port, ETHERBONE_DW)?,
                Sram::new(params.sram_base, params.sram_size),
                params.buffer_depth,
                debug,
            )?),
            None => None,
        };
        let streamer = match config.streamer {
            Some(params) => Some(UdpStreamer::new(udp.get_port(params.port, 1)?, &params, debug)?),
            None => None,
        };
        print_debug(
            debug,
            DEBUG_LEVEL_LOW,
            DEBUG_SRC_CORE,
            format!(
                "stack {} up, ip {}, {} bits datapath",
                format_mac(&config.mac_address),
                match config.ip_address {
                    Some(ip) => format_ip(&ip),
                    None => "from dhcp".to_string(),
                },
                config.dw * 8
            ),
        );
        Ok(UdpIpCore {
            ip_address,
            mac,
            arp,
            ip,
            icmp,
            udp,
            dhcp,
            etherbone,
            streamer,
            debug: *debug,
        })
    }
    // phy() method
    pub fn phy(&self) -> PhyPort {
        self.mac.phy()
    }
    // mac_address() getter
    pub fn mac_address(&self) -> [u8; 6] {
        self.mac.mac_address()
    }
    // ip_address() getter
    pub fn ip_address(&self) -> [u8; 4] {
        self.ip_address.get()
    }
    // udp_port() method
    /// open an application port of `dw` bytes words
    pub fn udp_port(&mut self, port: u16, dw: usize) -> Result<UdpUserPort, StackError> {
        self.udp.get_port(port, dw)
    }
    // dhcp() getter
    pub fn dhcp(&self) -> Option<&DhcpClient> {
        self.dhcp.as_ref()
    }
    // etherbone() getter
    pub fn etherbone(&self) -> Option<&EtherboneCore<Sram>> {
        self.etherbone.as_ref()
    }
    // streamer() getter
    pub fn streamer(&self) -> Option<&UdpStreamer> {
        self.streamer.as_ref()
    }
    // byte_stream() method
    /// the application end of the streamer, if any
    pub fn byte_stream(&self) -> Option<ByteStream> {
        self.streamer.as_ref().and_then(|s| s.stream())
    }
    // target_unreachable() getter
    pub fn target_unreachable(&self) -> bool {
        self.ip.target_unreachable()
    }
    // stats() getter
    pub fn stats(&self) -> StackStats {
        StackStats {
            mac: self.mac.stats(),
            arp: self.arp.stats(),
            ip: self.ip.stats(),
            icmp: self.icmp.as_ref().map(|icmp| icmp.stats()),
            udp: self.udp.stats(),
            dhcp: self.dhcp.as_ref().map(|dhcp| dhcp.stats()),
            etherbone: self.etherbone.as_ref().map(|eb| eb.stats()),
            streamer: self.streamer.as_ref().map(|s| s.stats()),
        }
    }
    // step() method
    /// advance every layer once, returns true when any of them made progress
    pub fn step(&mut self, now: Instant) -> bool {
        let mut progress = self.mac.step();
        progress |= self.arp.step(now);
        progress |= self.ip.step();
        if let Some(icmp) = self.icmp.as_mut() {
            progress |= icmp.step();
        }
        progress |= self.udp.step();
        if let Some(dhcp) = self.dhcp.as_mut() {
            progress |= dhcp.step(now);
        }
        if let Some(etherbone) = self.etherbone.as_mut() {
            progress |= etherbone.step();
        }
        if let Some(streamer) = self.streamer.as_mut() {
            progress |= streamer.step();
        }
        progress
    }
    // poll() method
    /// step until the stack settles, returns the number of productive rounds
    pub fn poll(&mut self, now: Instant) -> usize {
        let mut rounds = 0;
        while rounds < STREAM_POLL_MAX_ROUNDS && self.step(now) {
            rounds += 1;
        }
        if rounds == STREAM_POLL_MAX_ROUNDS {
            print_debug(
                &self.debug,
                DEBUG_LEVEL_MEDIUM,
                DEBUG_SRC_CORE,
                format!("stack still busy after {} rounds", rounds),
            );
        }
        rounds
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crate::arp::ARP_HEADER;
    use crate::checksums::one_complement_sum;
    use crate::ip::IP_HEADER;
    use crate::mac::MAC_HEADER;
    use crate::packets::Fields;

    const HOST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    const HOST_IP: [u8; 4] = [192, 168, 1, 100];
    const LOCAL_MAC: [u8; 6] = [0x10, 0xe2, 0xd5, 0x00, 0x00, 0x00];
    const LOCAL_IP: [u8; 4] = [192, 168, 1, 50];

    fn frame(target_mac: [u8; 6], ethernet_type: u16, payload: &[u8]) -> Vec<u8> {
        let mut fields = Fields::new();
        fields
            .set_mac("target_mac", &target_mac)
            .set_mac("sender_mac", &HOST_MAC)
            .set("ethernet_type", ethernet_type as u64);
        let mut bytes = MAC_HEADER.encode(&fields);
        bytes.extend_from_slice(payload);
        bytes
    }

    fn datagram(protocol: u8, payload: &[u8]) -> Vec<u8> {
        let mut fields = Fields::new();
        fields
            .set("version", 4)
            .set("ihl", 5)
            .set("total_length", (payload.len() + IP_HEADER_LEN) as u64)
            .set("ttl", 64)
            .set("protocol", protocol as u64)
            .set_ip("sender_ip", &HOST_IP)
            .set_ip("target_ip", &LOCAL_IP);
        let checksum = one_complement_sum(&IP_HEADER.encode(&fields), Some(IP_CHECKSUM_POS));
        fields.set("checksum", checksum as u64);
        let mut bytes = IP_HEADER.encode(&fields);
        bytes.extend_from_slice(payload);
        frame(LOCAL_MAC, ETHERNET_TYPE_IP, &bytes)
    }

    fn arp_reply() -> Vec<u8> {
        let mut fields = Fields::new();
        fields
            .set("hwtype", ARP_HWTYPE_ETHERNET as u64)
            .set("proto", ARP_PROTO_IP as u64)
            .set("hwsize", 6)
            .set("protosize", 4)
            .set("opcode", ARP_OPCODE_REPLY as u64)
            .set_mac("sender_mac", &HOST_MAC)
            .set_ip("sender_ip", &HOST_IP)
            .set_mac("target_mac", &LOCAL_MAC)
            .set_ip("target_ip", &LOCAL_IP);
        let mut bytes = ARP_HEADER.encode(&fields);
        bytes.resize(ETH_MIN_LEN, 0);
        frame(LOCAL_MAC, ETHERNET_TYPE_ARP, &bytes)
    }

    fn etherbone(writes: &[u32], reads: &[u32]) -> Vec<u8> {
        let mut bytes = vec![0x4e, 0x6f, 0x10, 0x44, 0, 0, 0, 0];
        bytes.extend_from_slice(&[0, 0x0f, writes.len() as u8, reads.len() as u8]);
        if !writes.is_empty() {
            bytes.extend_from_slice(&0x1000u32.to_be_bytes());
            writes.iter().for_each(|w| bytes.extend_from_slice(&w.to_be_bytes()));
        }
        if !reads.is_empty() {
            bytes.extend_from_slice(&0x1000u32.to_be_bytes());
            reads.iter().for_each(|r| bytes.extend_from_slice(&r.to_be_bytes()));
        }
        let mut udp = vec![0x9c, 0x40];
        udp.extend_from_slice(&ETHERBONE_DFLT_PORT.to_be_bytes());
        udp.extend_from_slice(&((bytes.len() + UDP_HEADER_LEN) as u16).to_be_bytes());
        udp.extend_from_slice(&[0, 0]);
        udp.extend_from_slice(&bytes);
        datagram(UDP_PROTOCOL, &udp)
    }

    fn resolve(core: &mut UdpIpCore, phy: &PhyPort, now: Instant) {
        let request = phy.source.try_recv().unwrap();
        assert_eq!(&request[..6], &ETH_BCAST_MAC);
        assert_eq!(&request[12..14], &ETHERNET_TYPE_ARP.to_be_bytes());
        let fields = ARP_HEADER.decode(&request[ETH_HEADER_LEN..]);
        assert_eq!(fields.get("opcode"), ARP_OPCODE_REQUEST as u64);
        assert_eq!(fields.get_ip("target_ip"), HOST_IP);
        phy.sink.send(arp_reply()).unwrap();
        core.poll(now);
    }

    #[test]
    fn ping_is_answered_once_the_host_is_resolved() {
        let now = Instant::now();
        let mut core = UdpIpCore::new(&StackConfig::default(), &Verbose::default()).unwrap();
        let phy = core.phy();
        let echo = vec![ICMP_TYPE_ECHO_REQUEST, 0, 0xf7, 0xfe, 0, 1, 0, 0];
        phy.sink.send(datagram(ICMP_PROTOCOL, &echo)).unwrap();
        core.poll(now);
        resolve(&mut core, &phy, now);
        let reply = phy.source.try_recv().unwrap();
        assert_eq!(reply.len(), ETH_MIN_FRAME_LEN);
        assert_eq!(&reply[..6], &HOST_MAC);
        assert_eq!(&reply[6..12], &LOCAL_MAC);
        let ip = IP_HEADER.decode(&reply[ETH_HEADER_LEN..]);
        assert_eq!(ip.get("protocol"), ICMP_PROTOCOL as u64);
        assert_eq!(ip.get_ip("target_ip"), HOST_IP);
        let icmp = &reply[ETH_HEADER_LEN + IP_HEADER_LEN..ETH_HEADER_LEN + IP_HEADER_LEN + 8];
        assert_eq!(icmp[0], ICMP_TYPE_ECHO_REPLY);
        assert_eq!(one_complement_sum(icmp, None), 0);
        let stats = core.stats();
        assert_eq!(stats.icmp.map(|s| s.echo_replies), Some(1));
        assert_eq!(stats.arp.resolved, 1);
    }

    #[test]
    fn etherbone_reads_back_its_writes() {
        let now = Instant::now();
        let seed = [0x01234567, 0x89abcdef, 0x5aa55aa5, 0xa55aa55a];
        let mut core = UdpIpCore::new(&StackConfig::default(), &Verbose::default()).unwrap();
        let phy = core.phy();
        phy.sink.send(etherbone(&seed, &[])).unwrap();
        core.poll(now);
        assert!(phy.source.try_recv().is_err());
        phy.sink.send(etherbone(&[], &[0x1000, 0x1004, 0x1008, 0x100c])).unwrap();
        core.poll(now);
        resolve(&mut core, &phy, now);
        let reply = phy.source.try_recv().unwrap();
        let udp = &reply[ETH_HEADER_LEN + IP_HEADER_LEN..];
        assert_eq!(&udp[0..2], &ETHERBONE_DFLT_PORT.to_be_bytes());
        assert_eq!(&udp[2..4], &ETHERBONE_DFLT_PORT.to_be_bytes());
        assert_eq!(&udp[4..6], &40u16.to_be_bytes());
        let record = &udp[UDP_HEADER_LEN + ETHERBONE_PACKET_HEADER_LEN..];
        assert_eq!(record[2], 4);
        let words: Vec<u32> = record[4..24]
            .chunks(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        assert_eq!(words, vec![0x1000, seed[0], seed[1], seed[2], seed[3]]);
        assert_eq!(core.stats().etherbone.map(|s| s.replies), Some(1));
    }

    #[test]
    fn streamer_echoes_datagrams_in_loopback() {
        let now = Instant::now();
        let config = StackConfig {
            etherbone: None,
            streamer: Some(StreamerParameters {
                ip_address: Some(HOST_IP),
                loopback: true,
                ..StreamerParameters::default()
            }),
            ..StackConfig::default()
        };
        let mut core = UdpIpCore::new(&config, &Verbose::default()).unwrap();
        assert!(core.byte_stream().is_none());
        let phy = core.phy();
        let mut udp = vec![0x17, 0x70];
        udp.extend_from_slice(&STREAMER_DFLT_PORT.to_be_bytes());
        udp.extend_from_slice(&((UDP_HEADER_LEN + 5) as u16).to_be_bytes());
        udp.extend_from_slice(&[0, 0]);
        udp.extend_from_slice(b"hello");
        phy.sink.send(datagram(UDP_PROTOCOL, &udp)).unwrap();
        core.poll(now);
        resolve(&mut core, &phy, now);
        let reply = phy.source.try_recv().unwrap();
        let udp = &reply[ETH_HEADER_LEN + IP_HEADER_LEN..];
        assert_eq!(&udp[0..2], &STREAMER_DFLT_PORT.to_be_bytes());
        assert_eq!(&udp[2..4], &STREAMER_DFLT_PORT.to_be_bytes());
        assert_eq!(&udp[4..6], &((UDP_HEADER_LEN + 5) as u16).to_be_bytes());
        assert_eq!(&udp[UDP_HEADER_LEN..UDP_HEADER_LEN + 5], b"hello");
        let stats = core.stats().streamer.unwrap();
        assert_eq!((stats.rx_bytes, stats.tx_bytes), (5, 5));
    }

    #[test]
    fn dhcp_discover_is_broadcast_without_resolution() {
        let now = Instant::now();
        let config = StackConfig {
            ip_address: None,
            ..StackConfig::default()
        };
        let mut core = UdpIpCore::new(&config, &Verbose::default()).unwrap();
        let phy = core.phy();
        core.poll(now);
        let discover = phy.source.try_recv().unwrap();
        assert_eq!(&discover[..6], &ETH_BCAST_MAC);
        let ip = IP_HEADER.decode(&discover[ETH_HEADER_LEN..]);
        assert_eq!(ip.get("protocol"), UDP_PROTOCOL as u64);
        assert_eq!(ip.get_ip("target_ip"), [255, 255, 255, 255]);
        let udp = &discover[ETH_HEADER_LEN + IP_HEADER_LEN..];
        assert_eq!(&udp[0..4], &[0, 68, 0, 67]);
        assert_eq!(core.ip_address(), [0; 4]);
        assert_eq!(core.stats().arp.tx_requests, 0);
    }

    #[test]
    fn ports_are_unique_across_the_stack() {
        let mut core = UdpIpCore::new(&StackConfig::default(), &Verbose::default()).unwrap();
        assert!(core.udp_port(ETHERBONE_DFLT_PORT, 4).is_err());
        assert!(core.udp_port(6000, 1).is_ok());
        let config = StackConfig {
            dw: 3,
            ..StackConfig::default()
        };
        assert!(UdpIpCore::new(&config, &Verbose::default()).is_err());
    }
}
