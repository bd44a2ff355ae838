//! checksums related functions module
//! This module is dedicated to internet checksums functions.
//!
//! credit to ref. impl. https://github.com/m-labs/smoltcp/blob/master/src/wire/ip.rs
use byteorder::{ByteOrder, NetworkEndian};

const RFC1071_CHUNK_SIZE: usize = 32;

// rfc1071() function
/// compute rfc1071 internet checksum
/// returns all-ones if carried checksum is valid
pub fn rfc1071(mut data: &[u8]) -> u16 {
    let mut acc = 0;

    // for each 32 bytes chunk
    while data.len() >= RFC1071_CHUNK_SIZE {
        let mut d = &data[..RFC1071_CHUNK_SIZE];
        while d.len() >= 2 {
            // sum adjacent pairs converted to 16 bits integer
            acc += NetworkEndian::read_u16(d) as u32;
            // take the next 2 bytes for the next iteration
            d = &d[2..];
        }
        data = &data[RFC1071_CHUNK_SIZE..];
    }

    // if it does not fit a 32 bytes chunk
    while data.len() >= 2 {
        acc += NetworkEndian::read_u16(data) as u32;
        data = &data[2..];
    }

    // add odd byte is present
    if let Some(&v) = data.first() {
        acc += (v as u32) << 8;
    }

    propagate_carries(acc)
}

// propagate_carries() function
/// fold a 32 bits accumulator into a 16 bits ones' complement sum
pub fn propagate_carries(word: u32) -> u16 {
    let sum = (word >> 16) + (word & 0xffff);
    ((sum >> 16) as u16) + (sum as u16)
}

// one_complement_sum() function
/// returns all-zeros if checksum is valid
/// when a position is given, the 16 bits word at this offset is skipped
/// (used to compute a checksum over a header carrying a stale checksum field).
pub fn one_complement_sum(data: &[u8], pos: Option<usize>) -> u16 {
    let mut csum = InternetChecksum::new();
    match pos {
        Some(p) if p + 2 <= data.len() => {
            csum.update(&data[..p]);
            csum.update(&[0, 0]);
            csum.update(&data[p + 2..]);
        }
        _ => csum.update(data),
    }
    csum.finalize()
}

/// Streaming Internet Checksum Structure
///
/// Accumulates 16 bits big-endian words over successive calls to update(),
/// an odd trailing byte is kept until the next update() or finalize().
#[derive(Debug, Clone, Default)]
pub struct InternetChecksum {
    acc: u32,
    odd: Option<u8>,
}

// InternetChecksum Implementation
impl InternetChecksum {
    // new() method
    pub fn new() -> InternetChecksum {
        InternetChecksum { acc: 0, odd: None }
    }
    // reset() method
    pub fn reset(&mut self) {
        self.acc = 0;
        self.odd = None;
    }
    // update() method
    pub fn update(&mut self, mut data: &[u8]) {
        // complete a word started by the previous update
        if let Some(hi) = self.odd.take() {
            match data.first() {
                Some(&lo) => {
                    self.add_word(((hi as u16) << 8) | lo as u16);
                    data = &data[1..];
                }
                None => {
                    self.odd = Some(hi);
                    return;
                }
            }
        }
        while data.len() >= 2 {
            self.add_word(NetworkEndian::read_u16(data));
            data = &data[2..];
        }
        if let Some(&v) = data.first() {
            self.odd = Some(v);
        }
    }
    // add_word() method
    fn add_word(&mut self, word: u16) {
        self.acc += word as u32;
        // fold early so the accumulator never overflows on long streams
        if self.acc > 0xffff {
            self.acc = (self.acc & 0xffff) + (self.acc >> 16);
        }
    }
    // sum() method
    /// ones' complement sum of everything seen so far (not complemented)
    pub fn sum(&self) -> u16 {
        let mut acc = self.acc;
        if let Some(hi) = self.odd {
            acc += (hi as u32) << 8;
        }
        while acc >> 16 != 0 {
            acc = (acc >> 16) + (acc & 0xffff);
        }
        acc as u16
    }
    // finalize() method
    /// returns the checksum, all-zeros if the data carried a valid checksum
    pub fn finalize(&self) -> u16 {
        !self.sum()
    }
}

// icmp_echo_reply_checksum() function
/// Derive the checksum of an echo reply from the checksum of the echo request.
/// Only the type field changes (8 to 0), so the reply checksum is
/// ~((~C) - 0x0800) in ones' complement arithmetic (RFC 1624).
pub fn icmp_echo_reply_checksum(request: u16) -> u16 {
    // ones' complement subtraction is the addition of the complement
    let acc = (!request) as u32 + (!0x0800u16) as u32;
    !propagate_carries(acc)
}
