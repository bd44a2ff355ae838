//! configuration file handling module
//! This module provides structure and methods related to configuration file handling.
use super::*;

// stack
use crate::arp::ArpParameters;
use crate::stack::{EtherboneParameters, StackConfig};
use crate::streamer::StreamerParameters;

// std
use std::net::Ipv4Addr;
use std::time::Duration;

/// Main Configuration Structure
#[derive(Debug, Deserialize)]
pub struct CConfig {
    pub debug: Option<u8>,
    pub time_zone: Option<String>,
    pub time_format: Option<String>,
    pub pid: Option<String>,
    pub working_dir: Option<String>,
    pub main_log: Option<String>,
    pub error_log: Option<String>,
    pub board: Option<Vec<BoardConfig>>,
}

impl CConfig {
    // debug() getter
    pub fn debug(&self) -> u8 {
        match self.debug {
            Some(v) => v,
            None => DEBUG_LEVEL_INFO,
        }
    }
    // time_zone() getter
    pub fn time_zone(&self) -> u8 {
        match &self.time_zone {
            Some(s) => match &s[..] {
                "local" => 0,
                "utc" => 1,
                _ => 0,
            },
            None => 0,
        }
    }
    // time_format() getter
    pub fn time_format(&self) -> u8 {
        match &self.time_format {
            Some(s) => match &s[..] {
                "disabled" => 0,
                "short" => 1,
                "rfc2822" => 2,
                _ => 0,
            },
            None => 0,
        }
    }
    // pid() getter
    pub fn pid(&self) -> String {
        match &self.pid {
            Some(v) => v.clone(),
            None => RETHERD_DFLT_PIDFILE.to_string(),
        }
    }
    // working_dir() getter
    pub fn working_dir(&self) -> String {
        match &self.working_dir {
            Some(v) => v.clone(),
            None => RETHERD_DFLT_WORKDIR.to_string(),
        }
    }
    // main_log() getter
    pub fn main_log(&self) -> String {
        match &self.main_log {
            Some(v) => v.clone(),
            None => RETHERD_DFLT_LOGFILE.to_string(),
        }
    }
    // error_log() getter
    pub fn error_log(&self) -> String {
        match &self.error_log {
            Some(v) => v.clone(),
            None => RETHERD_DFLT_ELOGFILE.to_string(),
        }
    }
    // boards() getter
    pub fn boards(&self) -> &[BoardConfig] {
        match &self.board {
            Some(b) => &b[..],
            None => &[],
        }
    }
}

/// Board Configuration Structure
#[derive(Debug, Deserialize)]
pub struct BoardConfig {
    interface: String,
    mac: Option<String>,
    ip: Option<String>,
    dw: Option<usize>,
    arp_entries: Option<usize>,
    arp_max_requests: Option<usize>,
    arp_timeout_ms: Option<u64>,
    arp_cache_timeout_ms: Option<u64>, // 0 disables the expiry
    mtu: Option<usize>,
    with_icmp: Option<bool>,
    with_ip_broadcast: Option<bool>,
    with_preamble_crc: Option<bool>,
    interpacket_gap: Option<usize>,
    dhcp_timeout_ms: Option<u64>,
    dhcp_retry_ms: Option<u64>,
    etherbone: Option<EtherboneConfig>,
    sram: Option<SramConfig>,
    streamer: Option<StreamerConfig>,
}

impl BoardConfig {
    // interface() getter
    pub fn interface(&self) -> &str {
        &self.interface
    }
    // mac() getter
    pub fn mac(&self) -> Result<[u8; 6], StackError> {
        match &self.mac {
            Some(s) => parse_mac(s),
            None => Ok(BOARD_DFLT_MAC),
        }
    }
    // ip() getter
    /// None when the address is to be obtained through DHCP
    pub fn ip(&self) -> Result<Option<[u8; 4]>, StackError> {
        parse_ip(&self.ip)
    }
    // dw() getter
    /// datapath width in bytes
    pub fn dw(&self) -> Result<usize, StackError> {
        match self.dw.unwrap_or(BOARD_DFLT_DW_BITS) {
            bits @ 8 | bits @ 16 | bits @ 32 | bits @ 64 => Ok(bits / 8),
            bits => Err(StackError::Config(format!(
                "invalid datapath width of {} bits, expected 8, 16, 32 or 64",
                bits
            ))),
        }
    }
    // arp() getter
    pub fn arp(&self) -> Result<ArpParameters, StackError> {
        let entries = self.arp_entries.unwrap_or(ARP_DFLT_ENTRIES);
        if entries == 0 {
            return Err(StackError::Config("at least one ARP entry is needed".to_string()));
        }
        Ok(ArpParameters {
            entries,
            max_requests: self.arp_max_requests.unwrap_or(ARP_DFLT_MAX_REQUESTS),
            timeout: Duration::from_millis(self.arp_timeout_ms.unwrap_or(ARP_DFLT_TIMEOUT_MS)),
            cache_timeout: match self.arp_cache_timeout_ms.unwrap_or(ARP_DFLT_CACHE_TIMEOUT_MS) {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        })
    }
    // etherbone() getter
    /// Etherbone is enabled by its section
    pub fn etherbone(&self) -> Option<EtherboneParameters> {
        let eb = self.etherbone.as_ref()?;
        let sram = self.sram.as_ref();
        Some(EtherboneParameters {
            port: eb.port.unwrap_or(ETHERBONE_DFLT_PORT),
            buffer_depth: eb.buffer_depth.unwrap_or(ETHERBONE_DFLT_BUFFER_DEPTH),
            sram_base: sram.and_then(|s| s.base).unwrap_or(SRAM_DFLT_BASE),
            sram_size: sram.and_then(|s| s.size).unwrap_or(SRAM_DFLT_SIZE),
        })
    }
    // streamer() getter
    /// the UDP streamer is enabled by its section
    pub fn streamer(&self) -> Result<Option<StreamerParameters>, StackError> {
        let st = match self.streamer.as_ref() {
            Some(st) => st,
            None => return Ok(None),
        };
        Ok(Some(StreamerParameters {
            ip_address: parse_ip(&st.remote)?,
            port: st.port.unwrap_or(STREAMER_DFLT_PORT),
            rx_fifo_depth: st.rx_fifo_depth.unwrap_or(STREAMER_DFLT_FIFO_DEPTH),
            tx_fifo_depth: st.tx_fifo_depth.unwrap_or(STREAMER_DFLT_FIFO_DEPTH),
            send_level: st.send_level.unwrap_or(STREAMER_DFLT_SEND_LEVEL),
            loopback: st.loopback.unwrap_or(false),
        }))
    }
    // stack_config() method
    pub fn stack_config(&self) -> Result<StackConfig, StackError> {
        Ok(StackConfig {
            mac_address: self.mac()?,
            ip_address: self.ip()?,
            dw: self.dw()?,
            arp: self.arp()?,
            mtu: self.mtu.unwrap_or(ETH_MTU),
            with_icmp: self.with_icmp.unwrap_or(true),
            with_ip_broadcast: self.with_ip_broadcast.unwrap_or(true),
            with_preamble_crc: self.with_preamble_crc.unwrap_or(false),
            interpacket_gap: self.interpacket_gap.unwrap_or(ETH_INTERPACKET_GAP),
            depth: STREAM_DFLT_DEPTH,
            icmp_echo_depth: ICMP_DFLT_ECHO_DEPTH,
            dhcp_timeout: Duration::from_millis(self.dhcp_timeout_ms.unwrap_or(DHCP_DFLT_TIMEOUT_MS)),
            dhcp_retry: Duration::from_millis(self.dhcp_retry_ms.unwrap_or(DHCP_DFLT_RETRY_MS)),
            etherbone: self.etherbone(),
            streamer: self.streamer()?,
        })
    }
}

/// Etherbone Option Type
#[derive(Debug, Deserialize)]
struct EtherboneConfig {
    port: Option<u16>,
    buffer_depth: Option<usize>,
}

/// SRAM Option Type
#[derive(Debug, Deserialize)]
struct SramConfig {
    base: Option<u32>,
    size: Option<usize>,
}

/// UDP Streamer Option Type
#[derive(Debug, Deserialize)]
struct StreamerConfig {
    remote: Option<String>,
    port: Option<u16>,
    rx_fifo_depth: Option<usize>,
    tx_fifo_depth: Option<usize>,
    send_level: Option<usize>,
    loopback: Option<bool>,
}

// parse_ip() function
fn parse_ip(ip: &Option<String>) -> Result<Option<[u8; 4]>, StackError> {
    match ip {
        Some(s) => match s.parse::<Ipv4Addr>() {
            Ok(ip) => Ok(Some(ip.octets())),
            Err(_) => Err(StackError::Config(format!("invalid IPv4 address {:?}", s))),
        },
        None => Ok(None),
    }
}

// parse_mac() function
/// parse a colon separated MAC address
pub fn parse_mac(s: &str) -> Result<[u8; 6], StackError> {
    let invalid = || StackError::Config(format!("invalid MAC address {:?}", s));
    let mut mac = [0u8; 6];
    let mut octets = s.split(':');
    for b in mac.iter_mut() {
        let octet = octets.next().ok_or_else(invalid)?;
        if octet.len() != 2 {
            return Err(invalid());
        }
        *b = u8::from_str_radix(octet, 16).map_err(|_| invalid())?;
    }
    if octets.next().is_some() {
        return Err(invalid());
    }
    Ok(mac)
}

// parse_config() function
pub fn parse_config(content: &str) -> Result<CConfig, StackError> {
    toml::from_str(content).map_err(|e| StackError::Config(format!("cannot parse configuration file: {}", e)))
}

// decode_config() function
pub fn decode_config(filename: &str) -> Result<CConfig, StackError> {
    let file = std::fs::read_to_string(filename)?;
    parse_config(&file)
}
