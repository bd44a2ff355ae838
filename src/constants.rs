//! Constants module
//! This module regroups all the program's and protocols constants.

// Program Constants
pub const RETHERD_BANNER: &str = r"
       _____ _   _                  _
  _ __| ____| |_| |__   ___ _ __ __| |
 | '__|  _| | __| '_ \ / _ \ '__/ _` |
 | |  | |___| |_| | | |  __/ | | (_| |
 |_|  |_____|\__|_| |_|\___|_|  \__,_|
";
pub const RETHERD_DFLT_CFG_FILE: &str = "/etc/retherd/retherd.conf";
pub const RETHERD_DFLT_PIDFILE: &str = "/var/run/retherd.pid";
pub const RETHERD_DFLT_WORKDIR: &str = "/tmp";
pub const RETHERD_DFLT_LOGFILE: &str = "/var/log/retherd.log";
pub const RETHERD_DFLT_ELOGFILE: &str = "/var/log/retherd-error.log";
pub const RETHERD_DFLT_DATE_FORMAT: &str = "%b %e %Y %T";
pub const RETHERD_NAME: &str = env!("CARGO_PKG_NAME");
pub const RETHERD_VERSION: &str = env!("CARGO_PKG_VERSION");

// Debug Constants
pub const DEBUG_LEVEL_INFO: u8 = 0;
pub const DEBUG_LEVEL_LOW: u8 = 1;
pub const DEBUG_LEVEL_MEDIUM: u8 = 2;
pub const DEBUG_LEVEL_HIGH: u8 = 3;
pub const DEBUG_LEVEL_EXTENSIVE: u8 = 5;
pub const DEBUG_SRC_INFO: &str = "info";
pub const DEBUG_SRC_MAIN: &str = "main";
pub const DEBUG_SRC_MAC: &str = "mac";
pub const DEBUG_SRC_ARP: &str = "arp";
pub const DEBUG_SRC_IP: &str = "ip";
pub const DEBUG_SRC_ICMP: &str = "icmp";
pub const DEBUG_SRC_UDP: &str = "udp";
pub const DEBUG_SRC_DHCP: &str = "dhcp";
pub const DEBUG_SRC_ETHERBONE: &str = "etherbone";
pub const DEBUG_SRC_STREAMER: &str = "streamer";
pub const DEBUG_SRC_CROSSBAR: &str = "crossbar";
pub const DEBUG_SRC_CORE: &str = "core";
pub const DEBUG_SRC_THREAD: &str = "thread";
pub const DEBUG_SRC_THREADP: &str = "thread-pool";
pub const DEBUG_SRC_FSM: &str = "fsm";
pub const DEBUG_SRC_TIMER: &str = "timer";
pub const DEBUG_SRC_SNIFF: &str = "sniffer";

// Stream Constants
pub const STREAM_DFLT_DEPTH: usize = 4; // default depth of the inter-layer pipes
pub const STREAM_POLL_MAX_ROUNDS: usize = 65536; // upper bound of a single poll() pass

// Ethernet Constants
pub const ETH_MTU: usize = 1530;
pub const ETH_MIN_LEN: usize = 46; // minimum payload length
pub const ETH_MIN_FRAME_LEN: usize = 60; // minimum frame length, without FCS
pub const ETH_INTERPACKET_GAP: usize = 12;
pub const ETH_PREAMBLE: u64 = 0xD555555555555555;
pub const ETH_PREAMBLE_LEN: usize = 8;
pub const ETH_FCS_LEN: usize = 4;
pub const ETH_HEADER_LEN: usize = 14;
pub const ETH_BCAST_MAC: [u8; 6] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
pub const ETH_MCAST_OUI: [u8; 3] = [0x01, 0x00, 0x5e];
pub const ETHERNET_TYPE_IP: u16 = 0x0800;
pub const ETHERNET_TYPE_ARP: u16 = 0x0806;
pub const ETH_P_ALL: u16 = 0x0003; // every protocol (/usr/include/linux/if_ether.h)
pub const PACKET_OUTGOING: u8 = 4; // frame sent by the host (/usr/include/linux/if_packet.h)

// CRC32 Constants (IEEE 802.3)
pub const CRC32_POLYNOMIAL: u32 = 0x04C11DB7;
pub const CRC32_POLYNOMIAL_REFLECTED: u32 = 0xEDB88320;
pub const CRC32_INIT: u32 = 0xFFFFFFFF;
pub const CRC32_CHECK: u32 = 0xC704DD7B;

// ARP Constants
pub const ARP_HWTYPE_ETHERNET: u16 = 0x0001;
pub const ARP_PROTO_IP: u16 = 0x0800;
pub const ARP_OPCODE_REQUEST: u16 = 0x0001;
pub const ARP_OPCODE_REPLY: u16 = 0x0002;
pub const ARP_HEADER_LEN: usize = 28;
pub const ARP_DFLT_ENTRIES: usize = 1;
pub const ARP_DFLT_MAX_REQUESTS: usize = 8;
pub const ARP_DFLT_TIMEOUT_MS: u64 = 100;
pub const ARP_DFLT_CACHE_TIMEOUT_MS: u64 = 10_000;

// IP Constants
pub const IP_HEADER_LEN: usize = 20;
pub const IP_MAX_PAYLOAD_LEN: usize = 65535 - IP_HEADER_LEN; // total_length is 16 bits
pub const IP_VERSION: u8 = 0x4;
pub const IP_IHL: u8 = 0x5;
pub const IP_TTL: u8 = 0x80;
pub const IP_FLAG_MF: u8 = 0b001; // more fragments
pub const IP_CHECKSUM_POS: usize = 10;
pub const IP_MTU_OVERHEAD: usize = 30; // room left for MAC header, FCS and preamble
pub const IP_BCAST_LAST_OCTET: u8 = 0xff;
pub const IP_MCAST_NIBBLE: u8 = 0xe;
pub const ICMP_PROTOCOL: u8 = 0x01;
pub const UDP_PROTOCOL: u8 = 0x11;

// ICMP Constants
pub const ICMP_HEADER_LEN: usize = 8;
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;
pub const ICMP_DFLT_ECHO_DEPTH: usize = 4;

// UDP Constants
pub const UDP_HEADER_LEN: usize = 8;
pub const UDP_MAX_PAYLOAD_LEN: usize = IP_MAX_PAYLOAD_LEN - UDP_HEADER_LEN;

// DHCP Constants
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DHCP_BOOTP_LEN: usize = 236;
pub const DHCP_MAGIC_COOKIE: u32 = 0x63825363;
pub const DHCP_OP_BOOTREQUEST: u8 = 1;
pub const DHCP_OP_BOOTREPLY: u8 = 2;
pub const DHCP_HTYPE_ETHERNET: u8 = 1;
pub const DHCP_FLAGS_BROADCAST: u16 = 0x8000;
pub const DHCP_OPT_PAD: u8 = 0;
pub const DHCP_OPT_SUBNET_MASK: u8 = 1;
pub const DHCP_OPT_ROUTER: u8 = 3;
pub const DHCP_OPT_REQ_IP_ADDRESS: u8 = 50;
pub const DHCP_OPT_LEASE_TIME: u8 = 51;
pub const DHCP_OPT_MESSAGE_TYPE: u8 = 53;
pub const DHCP_OPT_SRV_IP_ADDRESS: u8 = 54;
pub const DHCP_OPT_PARAM_REQUEST_LIST: u8 = 55;
pub const DHCP_OPT_CLIENT_IDENTIFIER: u8 = 61;
pub const DHCP_OPT_END: u8 = 255;
pub const DHCP_MSG_DISCOVER: u8 = 1;
pub const DHCP_MSG_OFFER: u8 = 2;
pub const DHCP_MSG_REQUEST: u8 = 3;
pub const DHCP_MSG_ACK: u8 = 5;
pub const DHCP_DFLT_TIMEOUT_MS: u64 = 1_000;
pub const DHCP_DFLT_RETRY_MS: u64 = 4_000;

// Etherbone Constants
pub const ETHERBONE_MAGIC: u16 = 0x4e6f;
pub const ETHERBONE_VERSION: u8 = 1;
pub const ETHERBONE_PACKET_HEADER_LEN: usize = 8;
pub const ETHERBONE_RECORD_HEADER_LEN: usize = 4;
pub const ETHERBONE_ADDR_SIZE: u8 = 4; // 32 bits addresses
pub const ETHERBONE_PORT_SIZE: u8 = 4; // 32 bits data
pub const ETHERBONE_DW: usize = 4; // etherbone datapath in bytes
pub const ETHERBONE_DFLT_PORT: u16 = 1234;
pub const ETHERBONE_DFLT_BUFFER_DEPTH: usize = 4;
pub const SRAM_DFLT_BASE: u32 = 0x0000_0000;
pub const SRAM_DFLT_SIZE: usize = 0x2000; // bytes

// UDP Streamer Constants
pub const STREAMER_DFLT_PORT: u16 = 6000;
pub const STREAMER_DFLT_FIFO_DEPTH: usize = 64; // bytes
pub const STREAMER_DFLT_SEND_LEVEL: usize = 1;

// Board Constants
pub const BOARD_DFLT_MAC: [u8; 6] = [0x10, 0xe2, 0xd5, 0x00, 0x00, 0x00];
pub const BOARD_DFLT_DW_BITS: usize = 8;
pub const BOARD_RECV_BUF_LEN: usize = 2048; // raw socket receive buffer

// Timers Constants
pub const TIMER_TICK_MS: u64 = 10;
