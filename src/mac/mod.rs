//! Ethernet MAC module
//! This module handles the Ethernet framing of the stack: MAC header, padding,
//! FCS, preamble and interpacket gap on transmission, their checks on reception,
//! and the EtherType crossbar the upper layers subscribe to.
use super::*;

// sub-modules
pub mod crc;
pub mod gap;
pub mod padding;
pub mod preamble;

use crc::{crc32_check, crc32_insert};
use gap::GapInserter;
use padding::{PaddingChecker, PaddingInserter};
use preamble::{PreambleChecker, PreambleInserter};

// crossbar
use crate::crossbar::{Crossbar, CrossbarKind, CrossbarMaster, CrossbarPort, CrossbarStats, Keyed};

// packets
use crate::packets::{Depacketizer, Fields, Header, HeaderField, Packetizer};

// stream
use crate::stream::{check_dw, pipe, try_take, Pending};

// crossbeam
use crossbeam::channel::{Receiver, Sender};

static MAC_FIELDS: [HeaderField; 3] = [
    HeaderField::new("target_mac", 0, 0, 48),
    HeaderField::new("sender_mac", 6, 0, 48),
    HeaderField::new("ethernet_type", 12, 0, 16),
];
pub static MAC_HEADER: Header = Header {
    fields: &MAC_FIELDS,
    length: ETH_HEADER_LEN,
};

/// Ethernet Frame Structure
#[derive(Debug, Clone, PartialEq)]
pub struct EthFrame {
    pub target_mac: [u8; 6],
    pub sender_mac: [u8; 6],
    pub ethernet_type: u16,
    pub payload: Vec<u8>,
}

// EthFrame Implementation
impl EthFrame {
    // fields() method
    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields
            .set_mac("target_mac", &self.target_mac)
            .set_mac("sender_mac", &self.sender_mac)
            .set("ethernet_type", self.ethernet_type as u64);
        fields
    }
    // from_fields() function
    fn from_fields(fields: &Fields, payload: Vec<u8>) -> EthFrame {
        EthFrame {
            target_mac: fields.get_mac("target_mac"),
            sender_mac: fields.get_mac("sender_mac"),
            ethernet_type: fields.get("ethernet_type") as u16,
            payload,
        }
    }
}

impl Keyed for EthFrame {
    fn key(&self) -> u16 {
        self.ethernet_type
    }
}

// decode_frame() function
/// decode a frame carried without preamble and FCS (as read from a raw socket)
pub fn decode_frame(bytes: &[u8]) -> Option<EthFrame> {
    let mut depacketizer = Depacketizer::new(&MAC_HEADER, 1);
    let (fields, payload) = depacketizer.depacketize(bytes)?;
    Some(EthFrame::from_fields(&fields, payload))
}

// format_mac() function
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// PHY Port Structure
///
/// The wire side of the MAC: `sink` takes the frames received from the PHY,
/// `source` yields the frames to transmit.
#[derive(Debug, Clone)]
pub struct PhyPort {
    pub sink: Sender<Vec<u8>>,
    pub source: Receiver<Vec<u8>>,
}

/// MAC Statistics Structure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MacStats {
    pub rx_frames: u64,
    pub tx_frames: u64,
    pub preamble_errors: u64,
    pub crc_errors: u64,
    pub runts: u64,
    pub truncated: u64,
}

/// MAC Core Structure
#[derive(Debug)]
pub struct MacCore {
    mac_address: [u8; 6],
    with_preamble_crc: bool,
    crossbar: Crossbar<EthFrame>,
    master: CrossbarMaster<EthFrame>,
    phy: PhyPort,
    phy_rx: Receiver<Vec<u8>>,
    phy_tx: Sender<Vec<u8>>,
    // tx
    packetizer: Packetizer,
    padding_inserter: PaddingInserter,
    preamble_inserter: PreambleInserter,
    gap: GapInserter,
    tx_pending: Pending<Vec<u8>>,
    // rx
    preamble_checker: PreambleChecker,
    padding_checker: PaddingChecker,
    depacketizer: Depacketizer,
    rx_pending: Pending<EthFrame>,
    stats: MacStats,
    debug: Verbose,
}

// MacCore Implementation
impl MacCore {
    // new() method
    /// `dw` is the datapath width in bytes, `interpacket_gap` in bytes
    pub fn new(
        mac_address: [u8; 6],
        dw: usize,
        with_preamble_crc: bool,
        interpacket_gap: usize,
        depth: usize,
        debug: &Verbose,
    ) -> Result<MacCore, StackError> {
        let dw = check_dw(dw)?;
        let crossbar = Crossbar::new(CrossbarKind::EtherType, depth, debug);
        let master = crossbar.master();
        let (rx_sink, phy_rx) = pipe(depth);
        let (phy_tx, tx_source) = pipe(depth);
        let gap = if with_preamble_crc { interpacket_gap } else { 0 };
        Ok(MacCore {
            mac_address,
            with_preamble_crc,
            crossbar,
            master,
            phy: PhyPort {
                sink: rx_sink,
                source: tx_source,
            },
            phy_rx,
            phy_tx,
            packetizer: Packetizer::new(&MAC_HEADER, dw),
            padding_inserter: PaddingInserter::new(ETH_MIN_FRAME_LEN),
            preamble_inserter: PreambleInserter::new(dw),
            gap: GapInserter::new(gap, dw),
            tx_pending: Pending::new(),
            preamble_checker: PreambleChecker::new(dw),
            padding_checker: PaddingChecker::new(ETH_MIN_FRAME_LEN),
            depacketizer: Depacketizer::new(&MAC_HEADER, dw),
            rx_pending: Pending::new(),
            stats: MacStats::default(),
            debug: *debug,
        })
    }
    // mac_address() getter
    pub fn mac_address(&self) -> [u8; 6] {
        self.mac_address
    }
    // phy() method
    pub fn phy(&self) -> PhyPort {
        self.phy.clone()
    }
    // get_port() method
    /// subscribe to an EtherType
    pub fn get_port(&mut self, ethernet_type: u16) -> Result<CrossbarPort<EthFrame>, StackError> {
        self.crossbar.get_port(ethernet_type)
    }
    // stats() getter
    pub fn stats(&self) -> MacStats {
        self.stats
    }
    // crossbar_stats() getter
    pub fn crossbar_stats(&self) -> CrossbarStats {
        self.crossbar.stats()
    }
    // step() method
    pub fn step(&mut self) -> bool {
        let mut progress = self.crossbar.step();
        progress |= self.tx_step();
        progress |= self.rx_step();
        progress
    }
    // tx_step() method
    fn tx_step(&mut self) -> bool {
        let mut progress = false;
        if self.tx_pending.is_busy() {
            if !self.tx_pending.flush(&self.phy_tx) {
                return false;
            }
            progress = true;
        }
        if !self.gap.idle() {
            self.gap.tick();
            return true;
        }
        let frame = match try_take(&self.master.source) {
            Some(frame) => frame,
            None => return progress,
        };
        let bytes = self.packetizer.packetize(&frame.fields(), &frame.payload);
        let mut bytes = self.padding_inserter.process(bytes);
        if self.with_preamble_crc {
            bytes = self.preamble_inserter.process(&crc32_insert(&bytes));
            self.gap.start();
        }
        print_debug(
            &self.debug,
            DEBUG_LEVEL_EXTENSIVE,
            DEBUG_SRC_MAC,
            format!(
                "tx frame to {}, type {:#06x}, {} bytes",
                format_mac(&frame.target_mac),
                frame.ethernet_type,
                bytes.len()
            ),
        );
        self.stats.tx_frames += 1;
        self.tx_pending.send(&self.phy_tx, bytes);
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
        let bytes = match try_take(&self.phy_rx) {
            Some(bytes) => bytes,
            None => return progress,
        };
        if let Some(frame) = self.receive(bytes) {
            self.stats.rx_frames += 1;
            self.rx_pending.send(&self.master.sink, frame);
        }
        true
    }
    // receive() method
    fn receive(&mut self, mut bytes: Vec<u8>) -> Option<EthFrame> {
        if self.with_preamble_crc {
            bytes = match self.preamble_checker.process(&bytes) {
                Some(bytes) => bytes,
                None => {
                    self.stats.preamble_errors += 1;
                    self.drop_frame("preamble mismatch");
                    return None;
                }
            };
            if !crc32_check(&bytes) {
                self.stats.crc_errors += 1;
                self.drop_frame("crc error");
                return None;
            }
            bytes.truncate(bytes.len() - ETH_FCS_LEN);
        }
        let bytes = self.padding_checker.process(bytes);
        self.stats.runts = self.padding_checker.runts();
        match self.depacketizer.depacketize(&bytes) {
            Some((fields, payload)) => Some(EthFrame::from_fields(&fields, payload)),
            None => {
                self.stats.truncated += 1;
                self.drop_frame("truncated header");
                None
            }
        }
    }
    // drop_frame() method
    fn drop_frame(&self, reason: &str) {
        print_debug(
            &self.debug,
            DEBUG_LEVEL_MEDIUM,
            DEBUG_SRC_MAC,
            format!("rx frame dropped, {}", reason),
        );
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    const LOCAL_MAC: [u8; 6] = [0x10, 0xe2, 0xd5, 0x00, 0x00, 0x00];
    const REMOTE_MAC: [u8; 6] = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc];

    fn frame(ethernet_type: u16, len: usize) -> EthFrame {
        EthFrame {
            target_mac: REMOTE_MAC,
            sender_mac: LOCAL_MAC,
            ethernet_type,
            payload: (0..len).map(|i| i as u8).collect(),
        }
    }

    fn run(mac: &mut MacCore) {
        while mac.step() {}
    }

    #[test]
    fn tx_frame_is_padded_crc_protected_and_preambled() {
        let mut mac = MacCore::new(LOCAL_MAC, 1, true, 12, 4, &Verbose::default()).unwrap();
        let port = mac.get_port(ETHERNET_TYPE_IP).unwrap();
        let phy = mac.phy();
        port.sink.send(frame(ETHERNET_TYPE_IP, 10)).unwrap();
        run(&mut mac);
        let wire = phy.source.try_recv().unwrap();
        assert_eq!(wire.len(), ETH_PREAMBLE_LEN + ETH_MIN_FRAME_LEN + ETH_FCS_LEN);
        assert_eq!(&wire[..8], &[0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0xd5]);
        assert_eq!(&wire[8..14], &REMOTE_MAC);
        assert_eq!(&wire[20..22], &[0x08, 0x00]);
        assert!(crc32_check(&wire[8..]));
        assert!(wire[32..68].iter().all(|b| *b == 0));
        assert_eq!(mac.stats().tx_frames, 1);
    }

    #[test]
    fn loopback_through_phy_delivers_by_ethernet_type() {
        for &dw in &[1usize, 2, 4, 8] {
            let mut mac = MacCore::new(LOCAL_MAC, dw, true, 12, 4, &Verbose::default()).unwrap();
            let arp = mac.get_port(ETHERNET_TYPE_ARP).unwrap();
            let phy = mac.phy();
            arp.sink.send(frame(ETHERNET_TYPE_ARP, 100)).unwrap();
            run(&mut mac);
            let wire = phy.source.try_recv().unwrap();
            phy.sink.send(wire).unwrap();
            run(&mut mac);
            assert_eq!(arp.source.try_recv().unwrap(), frame(ETHERNET_TYPE_ARP, 100));
        }
    }

    #[test]
    fn corrupted_frames_are_dropped_and_counted() {
        let mut mac = MacCore::new(LOCAL_MAC, 4, true, 12, 4, &Verbose::default()).unwrap();
        let ip = mac.get_port(ETHERNET_TYPE_IP).unwrap();
        let phy = mac.phy();
        ip.sink.send(frame(ETHERNET_TYPE_IP, 64)).unwrap();
        run(&mut mac);
        let wire = phy.source.try_recv().unwrap();
        let mut bad_crc = wire.clone();
        bad_crc[30] ^= 0x10;
        let mut bad_preamble = wire.clone();
        bad_preamble[0] = 0xaa;
        phy.sink.send(bad_crc).unwrap();
        phy.sink.send(bad_preamble).unwrap();
        run(&mut mac);
        assert!(ip.source.try_recv().is_err());
        assert_eq!(mac.stats().crc_errors, 1);
        assert_eq!(mac.stats().preamble_errors, 1);
        assert_eq!(mac.stats().rx_frames, 0);
    }

    #[test]
    fn raw_frames_skip_preamble_and_crc() {
        let mut mac = MacCore::new(LOCAL_MAC, 8, false, 12, 4, &Verbose::default()).unwrap();
        let ip = mac.get_port(ETHERNET_TYPE_IP).unwrap();
        let phy = mac.phy();
        let mut raw = Vec::new();
        raw.extend_from_slice(&LOCAL_MAC);
        raw.extend_from_slice(&REMOTE_MAC);
        raw.extend_from_slice(&[0x08, 0x00, 0xde, 0xad]);
        phy.sink.send(raw.clone()).unwrap();
        run(&mut mac);
        let rx = ip.source.try_recv().unwrap();
        assert_eq!(rx.sender_mac, REMOTE_MAC);
        assert_eq!(rx.payload, vec![0xde, 0xad]);
        assert_eq!(mac.stats().runts, 1);
        assert_eq!(decode_frame(&raw).unwrap(), rx);
        assert!(decode_frame(&raw[..10]).is_none());
    }

    #[test]
    fn unknown_ethernet_type_is_absorbed() {
        let mut mac = MacCore::new(LOCAL_MAC, 1, false, 12, 4, &Verbose::default()).unwrap();
        let _ip = mac.get_port(ETHERNET_TYPE_IP).unwrap();
        assert!(mac.get_port(ETHERNET_TYPE_IP).is_err());
        let phy = mac.phy();
        let mut raw = vec![0xff; 12];
        raw.extend_from_slice(&[0x86, 0xdd]);
        raw.resize(60, 0);
        phy.sink.send(raw).unwrap();
        run(&mut mac);
        assert_eq!(mac.crossbar_stats().unknown, 1);
    }
}
