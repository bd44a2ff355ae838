//! streams module
//! This module provides the bounded pipes connecting the layers together,
//! the bus beats carried by the framing primitives and the stride converter
//! used at the user ports.
use crate::error::StackError;

// crossbeam
use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// Bus Beat Structure
///
/// One bus word of `dw` bytes, lane 0 holds the first byte of the word.
/// `last_be` is one-hot and only meaningful on the last beat of a packet,
/// it marks the last valid byte lane of that beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Beat {
    pub data: u64,
    pub last: bool,
    pub last_be: u8,
}

// Beat Implementation
impl Beat {
    // new() method
    pub fn new(data: u64) -> Beat {
        Beat {
            data,
            last: false,
            last_be: 0,
        }
    }
    // lane() method
    pub fn lane(&self, i: usize) -> u8 {
        (self.data >> (8 * i)) as u8
    }
    // valid_bytes() method
    /// number of valid bytes carried by this beat
    pub fn valid_bytes(&self, dw: usize) -> usize {
        if self.last && self.last_be != 0 {
            (8 - self.last_be.leading_zeros()) as usize
        } else {
            dw
        }
    }
}

// check_dw() function
/// verify a data width (in bytes) is supported by the framing primitives
pub fn check_dw(dw: usize) -> Result<usize, StackError> {
    match dw {
        1 | 2 | 4 | 8 => Ok(dw),
        _ => Err(StackError::InvalidDataWidth(dw)),
    }
}

// lanes_mask() function
pub fn lanes_mask(dw: usize) -> u64 {
    if dw >= 8 {
        !0
    } else {
        (1u64 << (8 * dw)) - 1
    }
}

// be_mask() function
pub fn be_mask(dw: usize) -> u8 {
    if dw >= 8 {
        0xff
    } else {
        ((1u16 << dw) - 1) as u8
    }
}

// rotate_last_be() function
/// rotate a one-hot last_be by `shift` lanes within a `dw` lanes word
pub fn rotate_last_be(last_be: u8, shift: usize, dw: usize) -> u8 {
    let shift = shift % dw;
    if shift == 0 {
        return last_be;
    }
    let be = last_be as u16;
    (((be << shift) | (be >> (dw - shift))) as u8) & be_mask(dw)
}

// bytes_to_beats() function
/// split a byte buffer into beats of `dw` bytes, the last one flagged
pub fn bytes_to_beats(bytes: &[u8], dw: usize) -> Vec<Beat> {
    let mut beats = Vec::with_capacity((bytes.len() + dw - 1) / dw);
    for chunk in bytes.chunks(dw) {
        let mut data = 0u64;
        for (i, b) in chunk.iter().enumerate() {
            data |= (*b as u64) << (8 * i);
        }
        beats.push(Beat::new(data));
    }
    if let (Some(beat), Some(rem)) = (beats.last_mut(), bytes.chunks(dw).last()) {
        beat.last = true;
        beat.last_be = 1 << (rem.len() - 1);
    }
    beats
}

// beats_to_bytes() function
/// reassemble a byte buffer from beats, honoring the last_be of the final beat
pub fn beats_to_bytes(beats: &[Beat], dw: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(beats.len() * dw);
    for beat in beats {
        for i in 0..beat.valid_bytes(dw) {
            bytes.push(beat.lane(i));
        }
        if beat.last {
            break;
        }
    }
    bytes
}

/// Stride Converter Structure
///
/// Converts between the byte stream of an internal crossbar and the word
/// stream of a user port of a different width.
#[derive(Debug, Clone, Copy)]
pub struct StrideConverter {
    from_dw: usize,
    to_dw: usize,
}

// StrideConverter Implementation
impl StrideConverter {
    // new() method
    pub fn new(from_dw: usize, to_dw: usize) -> Result<StrideConverter, StackError> {
        Ok(StrideConverter {
            from_dw: check_dw(from_dw)?,
            to_dw: check_dw(to_dw)?,
        })
    }
    // convert() method
    pub fn convert(&self, beats: &[Beat]) -> Vec<Beat> {
        if self.from_dw == self.to_dw {
            return beats.to_vec();
        }
        bytes_to_beats(&beats_to_bytes(beats, self.from_dw), self.to_dw)
    }
    // reverse() method
    pub fn reverse(&self) -> StrideConverter {
        StrideConverter {
            from_dw: self.to_dw,
            to_dw: self.from_dw,
        }
    }
}

// pipe() function
/// create a bounded pipe (a back-pressured point-to-point stream)
pub fn pipe<T>(depth: usize) -> (Sender<T>, Receiver<T>) {
    bounded(depth.max(1))
}

/// Pending Structure
///
/// Holds one item refused by a full pipe, the producing stage keeps its
/// output valid until the pipe accepts it.
#[derive(Debug)]
pub struct Pending<T> {
    slot: Option<T>,
}

// Pending Implementation
impl<T> Pending<T> {
    // new() method
    pub fn new() -> Pending<T> {
        Pending { slot: None }
    }
    // is_busy() method
    pub fn is_busy(&self) -> bool {
        self.slot.is_some()
    }
    // put() method
    pub fn put(&mut self, item: T) {
        debug_assert!(self.slot.is_none());
        self.slot = Some(item);
    }
    // flush() method
    /// try to move the held item into the pipe, returns true when it left
    /// (a disconnected pipe silently absorbs the item)
    pub fn flush(&mut self, sink: &Sender<T>) -> bool {
        match self.slot.take() {
            Some(item) => match sink.try_send(item) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => true,
                Err(TrySendError::Full(item)) => {
                    self.slot = Some(item);
                    false
                }
            },
            None => false,
        }
    }
    // send() method
    /// put then flush, returns true when the item left immediately
    pub fn send(&mut self, sink: &Sender<T>, item: T) -> bool {
        self.put(item);
        self.flush(sink)
    }
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Pending::new()
    }
}

// try_take() function
/// non-blocking receive, None when the pipe is empty or disconnected
pub fn try_take<T>(source: &Receiver<T>) -> Option<T> {
    match source.try_recv() {
        Ok(item) => Some(item),
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn beats_carry_last_be_of_the_last_lane() {
        let beats = bytes_to_beats(&[1, 2, 3, 4, 5], 4);
        assert_eq!(beats.len(), 2);
        assert!(!beats[0].last);
        assert_eq!(beats[0].data, 0x04030201);
        assert!(beats[1].last);
        assert_eq!(beats[1].last_be, 0b0001);
        assert_eq!(beats_to_bytes(&beats, 4), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn rotate_wraps_within_the_word() {
        assert_eq!(rotate_last_be(0b0001, 1, 4), 0b0010);
        assert_eq!(rotate_last_be(0b1000, 1, 4), 0b0001);
        assert_eq!(rotate_last_be(0b1000, 3, 4), 0b0100);
        assert_eq!(rotate_last_be(0x80, 2, 8), 0x02);
        assert_eq!(rotate_last_be(0x01, 0, 8), 0x01);
    }

    #[test]
    fn stride_converter_regroups_words() {
        let conv = StrideConverter::new(1, 4).unwrap();
        let bytes: Vec<u8> = (0..10).collect();
        let words = conv.convert(&bytes_to_beats(&bytes, 1));
        assert_eq!(words.len(), 3);
        assert_eq!(words[2].last_be, 0b0010);
        let back = conv.reverse().convert(&words);
        assert_eq!(beats_to_bytes(&back, 1), bytes);
        assert!(StrideConverter::new(3, 4).is_err());
    }

    #[test]
    fn pending_holds_until_pipe_has_room() {
        let (tx, rx) = pipe::<u8>(1);
        let mut p = Pending::new();
        assert!(p.send(&tx, 1));
        assert!(!p.send(&tx, 2));
        assert!(p.is_busy());
        assert_eq!(try_take(&rx), Some(1));
        assert!(p.flush(&tx));
        assert_eq!(try_take(&rx), Some(2));
        assert_eq!(try_take(&rx), None);
    }
}
