//! packets handling module
//! This module includes the header description types and the generic
//! Packetizer/Depacketizer framing primitives every protocol layer is built on.
//!
//! A header is an ordered set of named bit-fields. Multi-byte fields are
//! big-endian on the wire, sub-byte fields are located by their bit offset
//! (LSB = 0) inside the big-endian integer starting at their byte.
use crate::stream::{be_mask, beats_to_bytes, bytes_to_beats, lanes_mask, rotate_last_be, Beat};

// std
use std::collections::BTreeMap;

/// Header Field Structure
#[derive(Debug, Clone, Copy)]
pub struct HeaderField {
    pub name: &'static str,
    pub byte: usize,
    pub offset: usize,
    pub width: usize,
}

// HeaderField Implementation
impl HeaderField {
    // new() const function
    pub const fn new(name: &'static str, byte: usize, offset: usize, width: usize) -> HeaderField {
        HeaderField {
            name,
            byte,
            offset,
            width,
        }
    }
    // span() method
    /// number of bytes covered by the field
    fn span(&self) -> usize {
        (self.offset + self.width + 7) / 8
    }
}

/// Header Structure
#[derive(Debug)]
pub struct Header {
    pub fields: &'static [HeaderField],
    pub length: usize,
}

// Header Implementation
impl Header {
    // field() method
    pub fn field(&self, name: &str) -> Option<&HeaderField> {
        self.fields.iter().find(|f| f.name == name)
    }
    // encode() method
    /// encode the fields values into `length` bytes, missing fields are zero
    pub fn encode(&self, fields: &Fields) -> Vec<u8> {
        let mut bytes = vec![0u8; self.length];
        for f in self.fields {
            let span = f.span();
            let region = &mut bytes[f.byte..f.byte + span];
            let mut word: u128 = 0;
            for b in region.iter() {
                word = (word << 8) | *b as u128;
            }
            let mask = ((1u128 << f.width) - 1) << f.offset;
            word = (word & !mask) | (((fields.get(f.name) as u128) << f.offset) & mask);
            for (i, b) in region.iter_mut().enumerate() {
                *b = (word >> (8 * (span - 1 - i))) as u8;
            }
        }
        bytes
    }
    // decode() method
    /// decode the first `length` bytes of the buffer (short buffers decode as zero)
    pub fn decode(&self, bytes: &[u8]) -> Fields {
        let mut fields = Fields::new();
        for f in self.fields {
            let mut word: u128 = 0;
            for i in 0..f.span() {
                word = (word << 8) | *bytes.get(f.byte + i).unwrap_or(&0) as u128;
            }
            let value = (word >> f.offset) & ((1u128 << f.width) - 1);
            fields.set(f.name, value as u64);
        }
        fields
    }
}

/// Header Fields Values Structure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    values: BTreeMap<&'static str, u64>,
}

// Fields Implementation
impl Fields {
    // new() method
    pub fn new() -> Fields {
        Fields {
            values: BTreeMap::new(),
        }
    }
    // set() method
    pub fn set(&mut self, name: &'static str, value: u64) -> &mut Fields {
        self.values.insert(name, value);
        self
    }
    // with() method
    pub fn with(mut self, name: &'static str, value: u64) -> Fields {
        self.values.insert(name, value);
        self
    }
    // get() method
    pub fn get(&self, name: &str) -> u64 {
        *self.values.get(name).unwrap_or(&0)
    }
    // set_mac() method
    pub fn set_mac(&mut self, name: &'static str, mac: &[u8; 6]) -> &mut Fields {
        self.set(name, mac_to_u64(mac))
    }
    // get_mac() method
    pub fn get_mac(&self, name: &str) -> [u8; 6] {
        u64_to_mac(self.get(name))
    }
    // set_ip() method
    pub fn set_ip(&mut self, name: &'static str, ip: &[u8; 4]) -> &mut Fields {
        self.set(name, u32::from_be_bytes(*ip) as u64)
    }
    // get_ip() method
    pub fn get_ip(&self, name: &str) -> [u8; 4] {
        (self.get(name) as u32).to_be_bytes()
    }
}

// mac_to_u64() function
pub fn mac_to_u64(mac: &[u8; 6]) -> u64 {
    mac.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

// u64_to_mac() function
pub fn u64_to_mac(v: u64) -> [u8; 6] {
    let mut mac = [0u8; 6];
    for (i, b) in mac.iter_mut().enumerate() {
        *b = (v >> (8 * (5 - i))) as u8;
    }
    mac
}

/// Packetizer States Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
enum PacketizerState {
    Idle,
    Aligned,
    Unaligned,
}

/// Packetizer Structure
///
/// Emits the header beats ahead of the payload beats. When the header length
/// is not a multiple of the bus width, its leftover bytes share a beat with
/// the head of the payload and every payload beat is realigned.
#[derive(Debug)]
pub struct Packetizer {
    header: &'static Header,
    dw: usize,
    leftover: usize,
    carry: u64,
    state: PacketizerState,
}

// Packetizer Implementation
impl Packetizer {
    // new() method
    pub fn new(header: &'static Header, dw: usize) -> Packetizer {
        Packetizer {
            header,
            dw,
            leftover: header.length % dw,
            carry: 0,
            state: PacketizerState::Idle,
        }
    }
    // dw() getter
    pub fn dw(&self) -> usize {
        self.dw
    }
    // begin() method
    /// start a packet, returns the header beats that do not need payload bytes
    pub fn begin(&mut self, fields: &Fields) -> Vec<Beat> {
        let bytes = self.header.encode(fields);
        let full = self.header.length / self.dw;
        let mut beats = bytes_to_beats(&bytes[..full * self.dw], self.dw);
        if let Some(b) = beats.last_mut() {
            b.last = false;
            b.last_be = 0;
        }
        self.carry = 0;
        for (i, b) in bytes[full * self.dw..].iter().enumerate() {
            self.carry |= (*b as u64) << (8 * i);
        }
        self.state = if self.leftover == 0 {
            PacketizerState::Aligned
        } else {
            PacketizerState::Unaligned
        };
        beats
    }
    // push() method
    /// feed one payload beat, returns zero, one or two output beats
    pub fn push(&mut self, beat: Beat) -> Vec<Beat> {
        let mask = lanes_mask(self.dw);
        match self.state {
            PacketizerState::Idle | PacketizerState::Aligned => {
                if beat.last {
                    self.state = PacketizerState::Idle;
                }
                vec![beat]
            }
            PacketizerState::Unaligned => {
                let l = self.leftover;
                let data = (self.carry | (beat.data << (8 * l))) & mask;
                let carry = (beat.data >> (8 * (self.dw - l))) & mask;
                if !beat.last {
                    self.carry = carry;
                    return vec![Beat::new(data)];
                }
                self.state = PacketizerState::Idle;
                let last_be = rotate_last_be(beat.last_be, l, self.dw);
                if beat.last_be > last_be {
                    // the last bytes wrapped into a delayed beat
                    vec![
                        Beat::new(data),
                        Beat {
                            data: carry,
                            last: true,
                            last_be,
                        },
                    ]
                } else {
                    vec![Beat {
                        data,
                        last: true,
                        last_be,
                    }]
                }
            }
        }
    }
    // packetize_beats() method
    pub fn packetize_beats(&mut self, fields: &Fields, payload: &[Beat]) -> Vec<Beat> {
        if payload.is_empty() {
            self.state = PacketizerState::Idle;
            return bytes_to_beats(&self.header.encode(fields), self.dw);
        }
        let mut beats = self.begin(fields);
        for b in payload {
            beats.extend(self.push(*b));
            if b.last {
                break;
            }
        }
        beats
    }
    // packetize() method
    pub fn packetize(&mut self, fields: &Fields, payload: &[u8]) -> Vec<u8> {
        let beats = self.packetize_beats(fields, &bytes_to_beats(payload, self.dw));
        beats_to_bytes(&beats, self.dw)
    }
}

/// Depacketizer States Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
enum DepacketizerState {
    Header,
    Aligned,
    Unaligned,
}

/// Depacketizer Structure
///
/// Shifts the first header bytes into a decode buffer, then forwards the
/// remaining bytes as payload beats realigned on lane 0.
#[derive(Debug)]
pub struct Depacketizer {
    header: &'static Header,
    dw: usize,
    leftover: usize,
    count: usize,
    buf: Vec<u8>,
    prev: u64,
    state: DepacketizerState,
    fields: Option<Fields>,
    truncated: bool,
}

// Depacketizer Implementation
impl Depacketizer {
    // new() method
    pub fn new(header: &'static Header, dw: usize) -> Depacketizer {
        Depacketizer {
            header,
            dw,
            leftover: header.length % dw,
            count: 0,
            buf: Vec::with_capacity(header.length),
            prev: 0,
            state: DepacketizerState::Header,
            fields: None,
            truncated: false,
        }
    }
    // reset() method
    pub fn reset(&mut self) {
        self.count = 0;
        self.buf.clear();
        self.prev = 0;
        self.state = DepacketizerState::Header;
        self.fields = None;
        self.truncated = false;
    }
    // fields() getter
    /// decoded header of the current packet, once enough beats were received
    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }
    // truncated() getter
    pub fn truncated(&self) -> bool {
        self.truncated
    }
    // restart() method
    fn restart(&mut self) {
        self.count = 0;
        self.buf.clear();
        self.state = DepacketizerState::Header;
    }
    // push() method
    /// feed one beat, returns the payload beats it completed
    pub fn push(&mut self, beat: Beat) -> Vec<Beat> {
        let mask = lanes_mask(self.dw);
        let l = self.leftover;
        match self.state {
            DepacketizerState::Header => {
                let full = self.header.length / self.dw;
                if self.count == 0 {
                    self.fields = None;
                    self.truncated = false;
                }
                if self.count < full {
                    for i in 0..self.dw {
                        self.buf.push(beat.lane(i));
                    }
                    self.count += 1;
                    let complete = self.count == full
                        && l == 0
                        && (!beat.last || beat.valid_bytes(self.dw) == self.dw);
                    if complete {
                        self.fields = Some(self.header.decode(&self.buf));
                        if beat.last {
                            self.restart();
                        } else {
                            self.state = DepacketizerState::Aligned;
                        }
                    } else if beat.last {
                        self.truncated = true;
                        self.restart();
                    }
                    return vec![];
                }
                // leftover header bytes share this beat with the payload head
                for i in 0..l {
                    self.buf.push(beat.lane(i));
                }
                self.fields = Some(self.header.decode(&self.buf));
                if beat.last {
                    self.restart();
                    if beat.valid_bytes(self.dw) > l {
                        return vec![Beat {
                            data: (beat.data >> (8 * l)) & mask,
                            last: true,
                            last_be: rotate_last_be(beat.last_be, self.dw - l, self.dw),
                        }];
                    } else if beat.valid_bytes(self.dw) < l {
                        self.truncated = true;
                    }
                    return vec![];
                }
                self.prev = beat.data;
                self.state = DepacketizerState::Unaligned;
                vec![]
            }
            DepacketizerState::Aligned => {
                if beat.last {
                    self.restart();
                }
                vec![beat]
            }
            DepacketizerState::Unaligned => {
                let data = ((self.prev >> (8 * l)) | (beat.data << (8 * (self.dw - l)))) & mask;
                if !beat.last {
                    self.prev = beat.data;
                    return vec![Beat::new(data)];
                }
                self.restart();
                let last_be = rotate_last_be(beat.last_be, self.dw - l, self.dw);
                if beat.last_be > last_be {
                    // the last bytes wrapped into a delayed beat
                    vec![
                        Beat::new(data),
                        Beat {
                            data: (beat.data >> (8 * l)) & mask,
                            last: true,
                            last_be,
                        },
                    ]
                } else {
                    vec![Beat {
                        data,
                        last: true,
                        last_be: last_be & be_mask(self.dw),
                    }]
                }
            }
        }
    }
    // depacketize_beats() method
    /// decode a complete packet, None if it was too short to hold the header
    pub fn depacketize_beats(&mut self, beats: &[Beat]) -> Option<(Fields, Vec<Beat>)> {
        self.reset();
        let mut payload = Vec::with_capacity(beats.len());
        for b in beats {
            payload.extend(self.push(*b));
            if b.last {
                break;
            }
        }
        if self.truncated {
            return None;
        }
        let fields = self.fields.take()?;
        Some((fields, payload))
    }
    // depacketize() method
    pub fn depacketize(&mut self, bytes: &[u8]) -> Option<(Fields, Vec<u8>)> {
        let (fields, payload) = self.depacketize_beats(&bytes_to_beats(bytes, self.dw))?;
        Some((fields, beats_to_bytes(&payload, self.dw)))
    }
}
