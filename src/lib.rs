//! # rEtherd library
//!
//! A software rendition of a small FPGA network stack: Ethernet MAC, ARP,
//! IPv4, ICMP echo, UDP, a DHCP client, an Etherbone bridge to an emulated
//! Wishbone SRAM and a UDP byte streamer. Every board is attached to a host interface through a raw
//! socket and run by its own worker thread.
#![allow(non_snake_case)]

// libc
extern crate libc;

// itertools
extern crate itertools;
use itertools::Itertools;

// serde
extern crate serde;
#[macro_use]
extern crate serde_derive;

// deamonize
extern crate daemonize;
use daemonize::Daemonize;

// chrono
extern crate chrono;

// generic constants
pub mod constants;
use constants::*;

// debug
pub mod debug;
use debug::{print_debug, Verbose};

// errors
pub mod error;
use error::StackError;

// checksums
pub mod checksums;

// streams and packets
pub mod packets;
pub mod stream;

// crossbar
pub mod crossbar;

// layers
pub mod arp;
pub mod dhcp;
pub mod etherbone;
pub mod icmp;
pub mod ip;
pub mod mac;
pub mod udp;

// byte streams over UDP
pub mod streamer;

// full stack
pub mod stack;
use stack::{StackConfig, UdpIpCore};

// config
pub mod config;
use config::decode_config;

// finite state machine
pub mod fsm;

// timers
mod timers;

// threads pool
mod threads;
use threads::ThreadPool;

// operating systems support
pub mod os;
use os::drivers::PflagOp;
use os::RawSocket;

// std
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Library Config Structure
///
/// Includes library configuration parameters
pub struct Config {
    iface: Option<String>,
    mode: u8,
    conf: Option<String>,
    debug: Option<u8>,
}

// Config Implementation
impl Config {
    // new() method
    pub fn new(iface: Option<String>, mode: u8, conf: Option<String>, debug: Option<u8>) -> Config {
        Config {
            iface,
            mode,
            conf,
            debug,
        }
    }
    // iface() getter
    pub fn iface(&self) -> String {
        match &self.iface {
            Some(s) => s.clone(),
            None => String::new(),
        }
    }
    // mode() getter
    pub fn mode(&self) -> &u8 {
        &self.mode
    }
    // conf() getter
    pub fn conf(&self) -> String {
        match &self.conf {
            Some(s) => s.clone(),
            // default configuration file path
            None => RETHERD_DFLT_CFG_FILE.to_string(),
        }
    }
    // debug() getter
    pub fn debug(&self) -> Option<u8> {
        self.debug
    }
}

/// Board Structure
///
/// A stack attached to a host interface.
#[derive(Debug)]
pub struct Board {
    states: fsm::States,
    interface: String,
    ifindex: i32,
    stack: UdpIpCore,
    phy: mac::PhyPort,
    dropped: u64, // frames dropped while the stack was busy
}

// Board Implementation
impl Board {
    // new() method
    pub fn new(interface: &str, ifindex: i32, config: &StackConfig, debug: &Verbose) -> Result<Board, StackError> {
        let stack = UdpIpCore::new(config, debug)?;
        let phy = stack.phy();
        print_debug(
            debug,
            DEBUG_LEVEL_EXTENSIVE,
            DEBUG_SRC_MAIN,
            format!(
                "creating new board {} on interface {} (ifindex {})",
                mac::format_mac(&config.mac_address),
                interface,
                ifindex
            ),
        );
        Ok(Board {
            states: fsm::States::Init,
            interface: interface.to_string(),
            ifindex,
            stack,
            phy,
            dropped: 0,
        })
    }
    // interface() getter
    pub fn interface(&self) -> &str {
        &self.interface
    }
    // ifindex() getter
    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }
    // states() getter
    pub fn states(&self) -> fsm::States {
        self.states
    }
    // stack() getter
    pub fn stack(&self) -> &UdpIpCore {
        &self.stack
    }
    // accepts() method
    /// true for the frames addressed to the board, broadcasts and multicasts
    pub fn accepts(&self, frame: &[u8]) -> bool {
        if frame.len() < ETH_HEADER_LEN {
            return false;
        }
        frame[..6] == self.stack.mac_address() || frame[0] & 0x01 == 0x01
    }
}

// describe_frame() function
/// one line summary of a frame, as printed by the sniffer
pub fn describe_frame(bytes: &[u8]) -> Option<String> {
    let frame = mac::decode_frame(bytes)?;
    let eth = format!(
        "{} > {}",
        mac::format_mac(&frame.sender_mac),
        mac::format_mac(&frame.target_mac)
    );
    let payload = &frame.payload;
    let summary = match frame.ethernet_type {
        ETHERNET_TYPE_ARP if payload.len() >= ARP_HEADER_LEN => {
            let arp = arp::ARP_HEADER.decode(payload);
            match arp.get("opcode") as u16 {
                ARP_OPCODE_REQUEST => format!(
                    "ARP who-has {} tell {}",
                    ip::format_ip(&arp.get_ip("target_ip")),
                    ip::format_ip(&arp.get_ip("sender_ip"))
                ),
                ARP_OPCODE_REPLY => format!(
                    "ARP {} is-at {}",
                    ip::format_ip(&arp.get_ip("sender_ip")),
                    mac::format_mac(&arp.get_mac("sender_mac"))
                ),
                op => format!("ARP opcode {}", op),
            }
        }
        ETHERNET_TYPE_IP if payload.len() >= IP_HEADER_LEN => {
            let ip = ip::IP_HEADER.decode(payload);
            let hosts = format!(
                "{} > {}",
                ip::format_ip(&ip.get_ip("sender_ip")),
                ip::format_ip(&ip.get_ip("target_ip"))
            );
            let data = &payload[IP_HEADER_LEN..];
            match ip.get("protocol") as u8 {
                ICMP_PROTOCOL if data.len() >= ICMP_HEADER_LEN => {
                    let icmp = icmp::ICMP_HEADER.decode(data);
                    match icmp.get("msgtype") as u8 {
                        ICMP_TYPE_ECHO_REQUEST => format!("IPv4 {} ICMP echo request", hosts),
                        ICMP_TYPE_ECHO_REPLY => format!("IPv4 {} ICMP echo reply", hosts),
                        t => format!("IPv4 {} ICMP type {}", hosts, t),
                    }
                }
                UDP_PROTOCOL if data.len() >= UDP_HEADER_LEN => {
                    let udp = udp::UDP_HEADER.decode(data);
                    let (src, dst) = (udp.get("src_port"), udp.get("dst_port"));
                    let eb = &data[UDP_HEADER_LEN..];
                    if eb.len() >= 2 && u16::from_be_bytes([eb[0], eb[1]]) == ETHERBONE_MAGIC {
                        format!("IPv4 {} UDP {} > {} Etherbone", hosts, src, dst)
                    } else {
                        format!("IPv4 {} UDP {} > {}", hosts, src, dst)
                    }
                }
                p => format!("IPv4 {} protocol {}", hosts, p),
            }
        }
        t => format!("ethertype {:#06x}", t),
    };
    Some(format!("{} {}, length {}", eth, summary, bytes.len()))
}

// hex_dump() function
/// dump the frame as rows of 16 bytes
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, row)| format!("  {:04x}: {}", i * 16, row.iter().map(|b| format!("{:02x}", b)).join(" ")))
        .join("\n")
}

// run_stacks() function
/// Library entry point: sniff frames (mode 0) or run the configured boards
/// in the foreground (mode 1) or as a daemon (mode 2)
pub fn run_stacks(cfg: &Config, shutdown: Arc<AtomicBool>) -> Result<(), StackError> {
    let mut buf = [0u8; BOARD_RECV_BUF_LEN];

    // read operation mode
    match cfg.mode {
        // sniffer mode
        0 => {
            let debug = Verbose::new(cfg.debug().unwrap_or(DEBUG_LEVEL_INFO), 0, 0);

            // open raw socket
            let socket = RawSocket::open()?;

            // get interface name and index
            let iface = cfg.iface();
            let ifindex = os::interface_index(&iface)?;

            // set promiscuous flag on interface
            os::set_promiscuous(&socket, Some(iface.as_str()), PflagOp::Set)?;

            // print information
            println!("Listening for Ethernet frames on {}\n", iface);

            loop {
                // check if global shutdown variable is set
                // if set, then remove promisc mode on interface
                if shutdown.load(Ordering::Relaxed) {
                    os::set_promiscuous(&socket, Some(iface.as_str()), PflagOp::Unset)?;
                    println!("Exiting...");
                    return Ok(());
                }

                // Block on receiving frames
                let info = socket.recv(&mut buf)?;
                if info.ifindex != ifindex {
                    continue;
                }
                let frame = &buf[..info.len];
                if let Some(line) = describe_frame(frame) {
                    println!("{}", line);
                }
                print_debug(&debug, DEBUG_LEVEL_HIGH, DEBUG_SRC_SNIFF, format!("\n{}", hex_dump(frame)));
            }
        }
        // board modes
        1 | 2 => {
            // read configuration file
            let config = decode_config(&cfg.conf())?;

            // read debugging level from Config first
            let debug_level = match cfg.debug() {
                Some(v) => v,
                // if None, then read debug level from configuration file
                None => config.debug(),
            };

            // initialize 'debug' variable of type Verbose
            // and pass time format string from configuration file
            let debug: Verbose = Verbose::new(debug_level, config.time_zone(), config.time_format());

            // if the mode is 2, then daemonize:
            if cfg.mode == 2 {
                // create log files
                let stdout = File::create(config.main_log())?;
                let stderr = File::create(config.error_log())?;
                // initialize the daemon
                let deamon = Daemonize::new()
                    .pid_file(config.pid())
                    .chown_pid_file(true)
                    .working_directory(config.working_dir())
                    .user("root")
                    .group("root")
                    .umask(0o027)
                    .stdout(stdout)
                    .stderr(stderr);
                // daemonize the process
                match deamon.start() {
                    Ok(_) => println!("{} (v{}) daemon started", RETHERD_NAME, RETHERD_VERSION),
                    Err(e) => eprintln!("Error while starting {} daemon: {}", RETHERD_NAME, e),
                }
            }

            // create the boards
            let mut boards = Vec::with_capacity(config.boards().len());
            for bc in config.boards() {
                let ifindex = os::interface_index(bc.interface())?;
                boards.push(Board::new(bc.interface(), ifindex, &bc.stack_config()?, &debug)?);
            }

            // boards interfaces, without duplicates
            let interfaces: Vec<(String, i32)> = boards
                .iter()
                .map(|b| (b.interface().to_string(), b.ifindex()))
                .unique()
                .collect();

            // open raw socket
            let socket = Arc::new(RawSocket::open()?);

            // set boards interface(s) in promiscuous mode
            let names = || interfaces.iter().map(|(iface, _)| iface.as_str());
            os::set_promiscuous(&socket, names(), PflagOp::Set)?;

            // create a pool of threads
            let mut threads = ThreadPool::new(boards, socket.clone(), &debug)?;

            // send Startup event to worker threads
            threads.startup(&debug);

            loop {
                // check if global shutdown variable is set
                // if set, then remove promisc mode on interface(s)
                if shutdown.load(Ordering::Relaxed) {
                    os::set_promiscuous(&socket, names(), PflagOp::Unset)?;
                    println!("Exiting...");
                    // Manually calling the threads pool desctructor
                    threads.drop(&debug);
                    return Ok(());
                }

                // Block on receiving frames
                let info = socket.recv(&mut buf)?;
                // our own transmissions are seen back on the socket
                if info.outgoing || !interfaces.iter().any(|(_, i)| *i == info.ifindex) {
                    continue;
                }
                let notified = threads.dispatch(info.ifindex, &buf[..info.len]);
                print_debug(
                    &debug,
                    DEBUG_LEVEL_EXTENSIVE,
                    DEBUG_SRC_MAIN,
                    format!(
                        "frame of {} bytes on ifindex {} handed to {} board(s)",
                        info.len, info.ifindex, notified
                    ),
                );
            }
        }
        m => Err(StackError::Config(format!("unknown operation mode {}", m))),
    }
}
