//! etherbone module
//! Remote Wishbone bus accesses over UDP. Only 32 bits addresses and data are
//! supported, with a single record per packet and no address spaces.
//!
//! The datapath is split like the protocol itself: the packet layer checks the
//! magic and answers the probes, the record receiver turns a record into
//! memory-mapped beats, the Wishbone master executes them against a bus and
//! the record sender packs the read results back into a response record.
use super::*;

// ip and udp
use crate::ip::format_ip;
use crate::udp::{UdpUserPacket, UdpUserPort};

// packets
use crate::packets::{Depacketizer, Fields, Header, HeaderField, Packetizer};

// stream
use crate::stream::{try_take, Pending};

// std
use std::collections::VecDeque;

static ETHERBONE_PACKET_FIELDS: [HeaderField; 7] = [
    HeaderField::new("magic", 0, 0, 16),
    HeaderField::new("version", 2, 4, 4),
    HeaderField::new("nr", 2, 2, 1),
    HeaderField::new("pr", 2, 1, 1),
    HeaderField::new("pf", 2, 0, 1),
    HeaderField::new("addr_size", 3, 4, 4),
    HeaderField::new("port_size", 3, 0, 4),
];
pub static ETHERBONE_PACKET_HEADER: Header = Header {
    fields: &ETHERBONE_PACKET_FIELDS,
    length: ETHERBONE_PACKET_HEADER_LEN,
};

static ETHERBONE_RECORD_FIELDS: [HeaderField; 9] = [
    HeaderField::new("bca", 0, 0, 1),
    HeaderField::new("rca", 0, 1, 1),
    HeaderField::new("rff", 0, 2, 1),
    HeaderField::new("cyc", 0, 4, 1),
    HeaderField::new("wca", 0, 5, 1),
    HeaderField::new("wff", 0, 6, 1),
    HeaderField::new("byte_enable", 1, 0, 8),
    HeaderField::new("wcount", 2, 0, 8),
    HeaderField::new("rcount", 3, 0, 8),
];
pub static ETHERBONE_RECORD_HEADER: Header = Header {
    fields: &ETHERBONE_RECORD_FIELDS,
    length: ETHERBONE_RECORD_HEADER_LEN,
};

/// Wishbone Bus Trait
///
/// `adr` is a word address (byte address >> 2), bit `i` of `sel` enables
/// the byte lane holding bits `8*i..8*i+7` of the data.
pub trait WishboneBus {
    fn read(&mut self, adr: u32, sel: u8) -> u32;
    fn write(&mut self, adr: u32, dat: u32, sel: u8);
}

/// SRAM Structure
/// An in-memory Wishbone slave mapped at `base` (bytes).
#[derive(Debug, Clone, PartialEq)]
pub struct Sram {
    base: u32,
    mem: Vec<u32>,
}

// Sram Implementation
impl Sram {
    // new() method
    pub fn new(base: u32, size: usize) -> Sram {
        Sram {
            base,
            mem: vec![0; (size + 3) / 4],
        }
    }
    // base() getter
    pub fn base(&self) -> u32 {
        self.base
    }
    // size() getter
    /// size in bytes
    pub fn size(&self) -> usize {
        self.mem.len() * 4
    }
    // index() method
    fn index(&self, adr: u32) -> Option<usize> {
        let index = adr.checked_sub(self.base >> 2)? as usize;
        if index < self.mem.len() {
            Some(index)
        } else {
            None
        }
    }
}

// sel_mask() function
fn sel_mask(sel: u8) -> u32 {
    (0..4)
        .filter(|i| sel & (1 << i) != 0)
        .fold(0, |mask, i| mask | (0xff << (8 * i)))
}

impl WishboneBus for Sram {
    // unmapped reads return zero, unmapped writes are ignored
    fn read(&mut self, adr: u32, sel: u8) -> u32 {
        match self.index(adr) {
            Some(i) => self.mem[i] & sel_mask(sel),
            None => 0,
        }
    }
    fn write(&mut self, adr: u32, dat: u32, sel: u8) {
        if let Some(i) = self.index(adr) {
            let mask = sel_mask(sel);
            self.mem[i] = (self.mem[i] & !mask) | (dat & mask);
        }
    }
}

/// Etherbone Record Header Structure
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecordHeader {
    pub byte_enable: u8,
    pub wcount: u8,
    pub rcount: u8,
}

// RecordHeader Implementation
impl RecordHeader {
    // from_fields() function
    fn from_fields(fields: &Fields) -> RecordHeader {
        RecordHeader {
            byte_enable: fields.get("byte_enable") as u8,
            wcount: fields.get("wcount") as u8,
            rcount: fields.get("rcount") as u8,
        }
    }
    // words() method
    /// number of 32 bits words following the record header
    pub fn words(&self) -> usize {
        let w = self.wcount as usize;
        let r = self.rcount as usize;
        (if w > 0 { 1 + w } else { 0 }) + (if r > 0 { 1 + r } else { 0 })
    }
}

/// Memory-Mapped Beat Structure
///
/// One bus access. Writes carry `data`, reads carry the return address in
/// `base_addr`. `addr` is a word address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmapBeat {
    pub we: bool,
    pub addr: u32,
    pub data: u32,
    pub base_addr: u32,
    pub be: u8,
    pub count: u8,
    pub last: bool,
}

/// Record Receiver States Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReceiverState {
    Idle,
    ReceiveWrites { base_addr: u32, counter: u8 },
    ReceiveBaseRetAddr,
    ReceiveReads { base_ret_addr: u32, counter: u8 },
}

// receive() function
/// record receiver transition, consumes one record word
pub fn receive(state: ReceiverState, record: &RecordHeader, word: u32) -> (ReceiverState, Option<MmapBeat>) {
    match state {
        ReceiverState::Idle => {
            if record.wcount > 0 {
                (
                    ReceiverState::ReceiveWrites {
                        base_addr: word,
                        counter: 0,
                    },
                    None,
                )
            } else if record.rcount > 0 {
                (
                    ReceiverState::ReceiveReads {
                        base_ret_addr: word,
                        counter: 0,
                    },
                    None,
                )
            } else {
                (ReceiverState::Idle, None)
            }
        }
        ReceiverState::ReceiveWrites { base_addr, counter } => {
            let last = counter == record.wcount - 1;
            let beat = MmapBeat {
                we: true,
                addr: (base_addr >> 2).wrapping_add(counter as u32),
                data: word,
                base_addr,
                be: record.byte_enable,
                count: record.wcount,
                last,
            };
            let next = if !last {
                ReceiverState::ReceiveWrites {
                    base_addr,
                    counter: counter + 1,
                }
            } else if record.rcount > 0 {
                ReceiverState::ReceiveBaseRetAddr
            } else {
                ReceiverState::Idle
            };
            (next, Some(beat))
        }
        ReceiverState::ReceiveBaseRetAddr => (
            ReceiverState::ReceiveReads {
                base_ret_addr: word,
                counter: 0,
            },
            None,
        ),
        ReceiverState::ReceiveReads { base_ret_addr, counter } => {
            let last = counter == record.rcount - 1;
            let beat = MmapBeat {
                we: false,
                addr: word >> 2,
                data: 0,
                base_addr: base_ret_addr,
                be: record.byte_enable,
                count: record.rcount,
                last,
            };
            let next = if last {
                ReceiverState::Idle
            } else {
                ReceiverState::ReceiveReads {
                    base_ret_addr,
                    counter: counter + 1,
                }
            };
            (next, Some(beat))
        }
    }
}

// execute() function
/// Wishbone master, runs one beat on the bus and returns the read result
/// (tagged as a write towards the return address)
pub fn execute<B: WishboneBus>(bus: &mut B, beat: &MmapBeat) -> Option<MmapBeat> {
    let sel = beat.be & 0x0f;
    if beat.we {
        bus.write(beat.addr, beat.data, sel);
        None
    } else {
        Some(MmapBeat {
            we: true,
            data: bus.read(beat.addr, sel),
            ..*beat
        })
    }
}

/// Record Sender States Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SenderState {
    Idle,
    SendBaseAddress,
    SendData,
}

/// Record Sender Structure
/// Buffers the read results until the last one then frames the response record.
#[derive(Debug)]
struct RecordSender {
    state: SenderState,
    fifo: Vec<MmapBeat>,
    packetizer: Packetizer,
}

// RecordSender Implementation
impl RecordSender {
    // new() method
    fn new() -> RecordSender {
        RecordSender {
            state: SenderState::Idle,
            fifo: Vec::new(),
            packetizer: Packetizer::new(&ETHERBONE_RECORD_HEADER, ETHERBONE_DW),
        }
    }
    // push() method
    /// buffer a read result, returns the framed record on the last one
    fn push(&mut self, beat: MmapBeat) -> Option<Vec<u8>> {
        self.fifo.push(beat);
        if beat.last {
            Some(self.send())
        } else {
            None
        }
    }
    // send() method
    fn send(&mut self) -> Vec<u8> {
        let beats: Vec<MmapBeat> = self.fifo.drain(..).collect();
        let mut words = Vec::with_capacity(beats.len() + 1);
        let mut data = beats.iter();
        loop {
            match self.state {
                SenderState::Idle => {
                    if beats.is_empty() {
                        break;
                    }
                    self.state = SenderState::SendBaseAddress;
                }
                SenderState::SendBaseAddress => {
                    words.push(beats[0].base_addr);
                    self.state = SenderState::SendData;
                }
                SenderState::SendData => match data.next() {
                    Some(beat) => {
                        words.push(beat.data);
                        if beat.last {
                            self.state = SenderState::Idle;
                            break;
                        }
                    }
                    None => {
                        self.state = SenderState::Idle;
                        break;
                    }
                },
            }
        }
        let mut fields = Fields::new();
        fields
            .set("byte_enable", beats.first().map_or(0, |b| b.be) as u64)
            .set("wcount", (words.len().saturating_sub(1)) as u64)
            .set("rcount", 0);
        let payload: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes().to_vec()).collect();
        self.packetizer.packetize(&fields, &payload)
    }
}

/// Inbound Record Structure
#[derive(Debug)]
struct InboundRecord {
    header: RecordHeader,
    words: VecDeque<u32>,
}

/// Etherbone Statistics Structure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EtherboneStats {
    pub probes: u64,
    pub records: u64,
    pub writes: u64,
    pub reads: u64,
    pub replies: u64,
    pub bad_magic: u64,
    pub malformed: u64,
}

/// Etherbone Core Structure
#[derive(Debug)]
pub struct EtherboneCore<B: WishboneBus> {
    udp_port: UdpUserPort,
    bus: B,
    packet_packetizer: Packetizer,
    packet_depacketizer: Depacketizer,
    record_depacketizer: Depacketizer,
    receiver: ReceiverState,
    inbound: Option<InboundRecord>,
    mmap: VecDeque<MmapBeat>, // receiver to master
    sender: RecordSender,
    replies: VecDeque<UdpUserPacket>,
    buffer_depth: usize,
    last_ip_address: [u8; 4],
    tx_pending: Pending<UdpUserPacket>,
    stats: EtherboneStats,
    debug: Verbose,
}

// EtherboneCore Implementation
impl<B: WishboneBus> EtherboneCore<B> {
    // new() method
    /// `udp_port` must be a 32 bits user port, replies are sent from and to its port
    pub fn new(udp_port: UdpUserPort, bus: B, buffer_depth: usize, debug: &Verbose) -> Result<EtherboneCore<B>, StackError> {
        if udp_port.dw != ETHERBONE_DW {
            return Err(StackError::Config(format!(
                "etherbone needs a {} bits UDP port, got {} bits",
                ETHERBONE_DW * 8,
                udp_port.dw * 8
            )));
        }
        Ok(EtherboneCore {
            udp_port,
            bus,
            packet_packetizer: Packetizer::new(&ETHERBONE_PACKET_HEADER, ETHERBONE_DW),
            packet_depacketizer: Depacketizer::new(&ETHERBONE_PACKET_HEADER, ETHERBONE_DW),
            record_depacketizer: Depacketizer::new(&ETHERBONE_RECORD_HEADER, ETHERBONE_DW),
            receiver: ReceiverState::Idle,
            inbound: None,
            mmap: VecDeque::with_capacity(buffer_depth.max(1)),
            sender: RecordSender::new(),
            replies: VecDeque::with_capacity(buffer_depth.max(1)),
            buffer_depth: buffer_depth.max(1),
            last_ip_address: [0; 4],
            tx_pending: Pending::new(),
            stats: EtherboneStats::default(),
            debug: *debug,
        })
    }
    // port() getter
    pub fn port(&self) -> u16 {
        self.udp_port.port
    }
    // bus() getter
    pub fn bus(&self) -> &B {
        &self.bus
    }
    // bus_mut() getter
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
    // receiver_state() getter
    pub fn receiver_state(&self) -> ReceiverState {
        self.receiver
    }
    // stats() getter
    pub fn stats(&self) -> EtherboneStats {
        self.stats
    }
    // step() method
    pub fn step(&mut self) -> bool {
        let mut progress = self.tx_step();
        progress |= self.master_step();
        progress |= self.record_step();
        progress |= self.rx_step();
        progress
    }
    // tx_step() method
    fn tx_step(&mut self) -> bool {
        let mut progress = false;
        if self.tx_pending.is_busy() {
            if !self.tx_pending.flush(&self.udp_port.sink) {
                return false;
            }
            progress = true;
        }
        match self.replies.pop_front() {
            Some(reply) => {
                self.stats.replies += 1;
                self.tx_pending.send(&self.udp_port.sink, reply);
                true
            }
            None => progress,
        }
    }
    // master_step() method
    fn master_step(&mut self) -> bool {
        let mut progress = false;
        // a response record needs room in the replies queue
        while self.replies.len() < self.buffer_depth {
            let beat = match self.mmap.pop_front() {
                Some(beat) => beat,
                None => break,
            };
            progress = true;
            if beat.we {
                self.stats.writes += 1;
            } else {
                self.stats.reads += 1;
            }
            if let Some(result) = execute(&mut self.bus, &beat) {
                if let Some(record) = self.sender.push(result) {
                    let reply = self.packet(0, 0, &record);
                    self.replies.push_back(reply);
                }
            }
        }
        progress
    }
    // record_step() method
    /// feed the inbound record words to the receiver while the mmap buffer has room
    fn record_step(&mut self) -> bool {
        let mut progress = false;
        while self.mmap.len() < self.buffer_depth {
            let record = match self.inbound.as_mut() {
                Some(record) => record,
                None => break,
            };
            let word = match record.words.pop_front() {
                Some(word) => word,
                None => {
                    self.inbound = None;
                    break;
                }
            };
            let (next, beat) = receive(self.receiver, &record.header, word);
            if next != self.receiver {
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_EXTENSIVE,
                    DEBUG_SRC_ETHERBONE,
                    format!("record receiver {:?} -> {:?}", self.receiver, next),
                );
            }
            self.receiver = next;
            if let Some(beat) = beat {
                self.mmap.push_back(beat);
            }
            progress = true;
        }
        if let Some(record) = self.inbound.as_ref() {
            if record.words.is_empty() {
                self.inbound = None;
            }
        }
        progress
    }
    // rx_step() method
    fn rx_step(&mut self) -> bool {
        // one packet in flight at a time so replies go to the right requester
        if self.inbound.is_some() || !self.mmap.is_empty() || self.replies.len() >= self.buffer_depth {
            return false;
        }
        let packet = match try_take(&self.udp_port.source) {
            Some(packet) => packet,
            None => return false,
        };
        let bytes = packet.bytes(self.udp_port.dw);
        let (fields, payload) = match self.packet_depacketizer.depacketize(&bytes) {
            Some(eb) if eb.0.get("magic") == ETHERBONE_MAGIC as u64 => eb,
            Some(_) => {
                self.stats.bad_magic += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_MEDIUM,
                    DEBUG_SRC_ETHERBONE,
                    format!("packet from {} dropped, bad magic", format_ip(&packet.ip_address)),
                );
                return true;
            }
            None => {
                self.stats.malformed += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_MEDIUM,
                    DEBUG_SRC_ETHERBONE,
                    format!(
                        "packet from {} dropped, {} bytes is shorter than the header",
                        format_ip(&packet.ip_address),
                        bytes.len()
                    ),
                );
                return true;
            }
        };
        self.last_ip_address = packet.ip_address;
        if fields.get("pf") == 1 {
            self.stats.probes += 1;
            print_debug(
                &self.debug,
                DEBUG_LEVEL_HIGH,
                DEBUG_SRC_ETHERBONE,
                format!("probe from {}", format_ip(&packet.ip_address)),
            );
            let reply = self.packet(fields.get("nr"), 1, &payload);
            self.replies.push_back(reply);
            return true;
        }
        match self.decode_record(&payload) {
            Some(record) => {
                self.stats.records += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_HIGH,
                    DEBUG_SRC_ETHERBONE,
                    format!(
                        "record from {}, {} writes {} reads",
                        format_ip(&packet.ip_address),
                        record.header.wcount,
                        record.header.rcount
                    ),
                );
                self.receiver = ReceiverState::Idle;
                self.inbound = Some(record);
            }
            None => {
                self.stats.malformed += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_MEDIUM,
                    DEBUG_SRC_ETHERBONE,
                    format!(
                        "packet from {} dropped, not a single well formed record",
                        format_ip(&packet.ip_address)
                    ),
                );
            }
        }
        true
    }
    // decode_record() method
    fn decode_record(&mut self, payload: &[u8]) -> Option<InboundRecord> {
        let (fields, data) = self.record_depacketizer.depacketize(payload)?;
        let header = RecordHeader::from_fields(&fields);
        if data.len() % 4 != 0 || data.len() / 4 != header.words() {
            return None;
        }
        let words = data
            .chunks(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        Some(InboundRecord { header, words })
    }
    // packet() method
    /// frame an outbound etherbone packet towards the last requester
    fn packet(&mut self, nr: u64, pr: u64, payload: &[u8]) -> UdpUserPacket {
        let mut fields = Fields::new();
        fields
            .set("magic", ETHERBONE_MAGIC as u64)
            .set("version", ETHERBONE_VERSION as u64)
            .set("nr", nr)
            .set("pr", pr)
            .set("pf", 0)
            .set("addr_size", ETHERBONE_ADDR_SIZE as u64)
            .set("port_size", ETHERBONE_PORT_SIZE as u64);
        let bytes = self.packet_packetizer.packetize(&fields, payload);
        let port = self.udp_port.port;
        UdpUserPacket::from_bytes(self.last_ip_address, port, port, &bytes, ETHERBONE_DW)
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::pipe;
    use crossbeam::channel::{Receiver, Sender};

    const HOST_IP: [u8; 4] = [192, 168, 1, 100];
    const SEED: [u32; 4] = [0x01234567, 0x89abcdef, 0x5aa55aa5, 0xa55aa55a];

    fn bench() -> (EtherboneCore<Sram>, Sender<UdpUserPacket>, Receiver<UdpUserPacket>) {
        let (to_eb, source) = pipe(4);
        let (sink, from_eb) = pipe(4);
        let port = UdpUserPort {
            port: ETHERBONE_DFLT_PORT,
            dw: 4,
            sink,
            source,
        };
        let eb = EtherboneCore::new(port, Sram::new(0, 0x2000), ETHERBONE_DFLT_BUFFER_DEPTH, &Verbose::default()).unwrap();
        (eb, to_eb, from_eb)
    }

    fn header(magic: u16, pf: bool) -> Vec<u8> {
        let flags = (ETHERBONE_VERSION << 4) | pf as u8;
        let mut bytes = magic.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[flags, 0x44, 0, 0, 0, 0]);
        bytes
    }

    fn record(base_addr: u32, writes: &[u32], base_ret_addr: u32, reads: &[u32]) -> Vec<u8> {
        let mut bytes = header(ETHERBONE_MAGIC, false);
        bytes.extend_from_slice(&[0, 0x0f, writes.len() as u8, reads.len() as u8]);
        if !writes.is_empty() {
            bytes.extend_from_slice(&base_addr.to_be_bytes());
            for w in writes {
                bytes.extend_from_slice(&w.to_be_bytes());
            }
        }
        if !reads.is_empty() {
            bytes.extend_from_slice(&base_ret_addr.to_be_bytes());
            for r in reads {
                bytes.extend_from_slice(&r.to_be_bytes());
            }
        }
        bytes
    }

    fn send(to_eb: &Sender<UdpUserPacket>, bytes: &[u8]) {
        to_eb
            .send(UdpUserPacket::from_bytes(HOST_IP, 40000, ETHERBONE_DFLT_PORT, bytes, 4))
            .unwrap();
    }

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .collect()
    }

    #[test]
    fn writes_then_reads_round_trip() {
        let (mut eb, to_eb, from_eb) = bench();
        send(&to_eb, &record(0x1000, &SEED, 0, &[]));
        while eb.step() {}
        assert!(from_eb.try_recv().is_err());
        for (i, value) in SEED.iter().enumerate() {
            assert_eq!(eb.bus_mut().read(0x400 + i as u32, 0x0f), *value);
        }
        send(&to_eb, &record(0, &[], 0x1000, &[0x1000, 0x1004, 0x1008, 0x100c]));
        while eb.step() {}
        let reply = from_eb.try_recv().unwrap();
        assert_eq!(reply.ip_address, HOST_IP);
        assert_eq!(reply.src_port, ETHERBONE_DFLT_PORT);
        assert_eq!(reply.dst_port, ETHERBONE_DFLT_PORT);
        let bytes = reply.bytes(4);
        assert_eq!(bytes.len(), 8 + 4 + 4 + 4 * 4);
        assert_eq!(&bytes[..4], &[0x4e, 0x6f, 0x10, 0x44]);
        assert_eq!(&bytes[8..12], &[0, 0x0f, 4, 0]);
        let data = words(&bytes[12..]);
        assert_eq!(data[0], 0x1000);
        assert_eq!(&data[1..], &SEED);
        let stats = eb.stats();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.writes, 4);
        assert_eq!(stats.reads, 4);
        assert_eq!(stats.replies, 1);
        assert_eq!(eb.receiver_state(), ReceiverState::Idle);
    }

    #[test]
    fn mixed_record_writes_before_reads() {
        let (mut eb, to_eb, from_eb) = bench();
        send(&to_eb, &record(0x20, &[0xdeadbeef, 0xcafebabe], 0x4000, &[0x24, 0x20]));
        while eb.step() {}
        let bytes = from_eb.try_recv().unwrap().bytes(4);
        assert_eq!(bytes[10], 2);
        assert_eq!(words(&bytes[12..]), vec![0x4000, 0xcafebabe, 0xdeadbeef]);
    }

    #[test]
    fn probe_is_answered() {
        let (mut eb, to_eb, from_eb) = bench();
        send(&to_eb, &header(ETHERBONE_MAGIC, true));
        while eb.step() {}
        let bytes = from_eb.try_recv().unwrap().bytes(4);
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes[2] & 0x03, 0b10);
        assert_eq!(bytes[2] >> 4, ETHERBONE_VERSION);
        assert_eq!(eb.stats().probes, 1);
    }

    #[test]
    fn bad_packets_are_dropped() {
        let (mut eb, to_eb, from_eb) = bench();
        let mut bad = record(0, &[], 0x1000, &[0x1000]);
        bad[0] = 0x4f;
        send(&to_eb, &bad);
        // a second record behind the first one
        let mut two = record(0x1000, &[1], 0, &[]);
        two.extend_from_slice(&[0, 0x0f, 1, 0, 0, 0, 0x10, 0, 0, 0, 0, 2]);
        send(&to_eb, &two);
        // counts larger than the data
        let mut short = record(0, &[], 0x1000, &[0x1000, 0x1004]);
        short.truncate(short.len() - 4);
        send(&to_eb, &short);
        while eb.step() {}
        assert!(from_eb.try_recv().is_err());
        assert_eq!(eb.bus_mut().read(0x400, 0x0f), 0);
        let stats = eb.stats();
        assert_eq!(stats.bad_magic, 1);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.writes + stats.reads, 0);
    }

    #[test]
    fn packets_shorter_than_the_header_are_malformed() {
        let (mut eb, to_eb, from_eb) = bench();
        send(&to_eb, &[0x4e, 0x6f, 0x10]);
        send(&to_eb, &[]);
        while eb.step() {}
        assert!(from_eb.try_recv().is_err());
        let stats = eb.stats();
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.bad_magic, 0);
    }

    #[test]
    fn receiver_walks_its_states() {
        let header = RecordHeader {
            byte_enable: 0x0f,
            wcount: 1,
            rcount: 1,
        };
        assert_eq!(header.words(), 4);
        let (state, beat) = receive(ReceiverState::Idle, &header, 0x1004);
        assert!(beat.is_none());
        let (state, beat) = receive(state, &header, 7);
        assert_eq!(state, ReceiverState::ReceiveBaseRetAddr);
        let beat = beat.unwrap();
        assert!(beat.we && beat.last);
        assert_eq!(beat.addr, 0x401);
        let (state, _) = receive(state, &header, 0x8000);
        let (state, beat) = receive(state, &header, 0x1004);
        assert_eq!(state, ReceiverState::Idle);
        let beat = beat.unwrap();
        assert!(!beat.we);
        assert_eq!((beat.addr, beat.base_addr), (0x401, 0x8000));
    }

    #[test]
    fn sram_honors_byte_enables() {
        let mut sram = Sram::new(0x1000, 16);
        sram.write(0x400, 0x11223344, 0x0f);
        sram.write(0x400, 0xffffffff, 0b0011);
        assert_eq!(sram.read(0x400, 0x0f), 0x1122ffff);
        assert_eq!(sram.read(0x400, 0b1000), 0x11000000);
        // outside the window
        sram.write(0x3ff, 1, 0x0f);
        assert_eq!(sram.read(0x3ff, 0x0f), 0);
        assert_eq!(sram.read(0x404, 0x0f), 0);
    }
}
