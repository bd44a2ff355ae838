//! Ethernet preamble module
//! The preamble and start frame delimiter are handled as an 8 bytes header
//! prepended to (or stripped from) the frame by the framing primitives.
use super::*;

static PREAMBLE_FIELDS: [HeaderField; 1] = [HeaderField::new("preamble", 0, 0, 64)];
pub static PREAMBLE_HEADER: Header = Header {
    fields: &PREAMBLE_FIELDS,
    length: ETH_PREAMBLE_LEN,
};

// preamble_value() function
/// wire order of ETH_PREAMBLE is least significant byte first (55 .. 55 D5)
fn preamble_value() -> u64 {
    u64::from_be_bytes(ETH_PREAMBLE.to_le_bytes())
}

/// Preamble Inserter Structure
#[derive(Debug)]
pub struct PreambleInserter {
    packetizer: Packetizer,
    fields: Fields,
}

// PreambleInserter Implementation
impl PreambleInserter {
    // new() method
    pub fn new(dw: usize) -> PreambleInserter {
        PreambleInserter {
            packetizer: Packetizer::new(&PREAMBLE_HEADER, dw),
            fields: Fields::new().with("preamble", preamble_value()),
        }
    }
    // process() method
    pub fn process(&mut self, frame: &[u8]) -> Vec<u8> {
        self.packetizer.packetize(&self.fields, frame)
    }
}

/// Preamble Checker Structure
#[derive(Debug)]
pub struct PreambleChecker {
    depacketizer: Depacketizer,
}

// PreambleChecker Implementation
impl PreambleChecker {
    // new() method
    pub fn new(dw: usize) -> PreambleChecker {
        PreambleChecker {
            depacketizer: Depacketizer::new(&PREAMBLE_HEADER, dw),
        }
    }
    // process() method
    /// strip the preamble, None on a short frame or a preamble mismatch
    pub fn process(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        let (fields, frame) = self.depacketizer.depacketize(bytes)?;
        if fields.get("preamble") != preamble_value() {
            return None;
        }
        Some(frame)
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn preamble_wire_order() {
        for &dw in &[1usize, 2, 4, 8] {
            let mut inserter = PreambleInserter::new(dw);
            let wire = inserter.process(&[0xaa, 0xbb, 0xcc]);
            assert_eq!(
                &wire[..8],
                &[0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0xd5]
            );
            let mut checker = PreambleChecker::new(dw);
            assert_eq!(checker.process(&wire).unwrap(), vec![0xaa, 0xbb, 0xcc]);
        }
    }

    #[test]
    fn corrupted_preamble_is_dropped() {
        let mut inserter = PreambleInserter::new(4);
        let mut wire = inserter.process(&[1, 2, 3, 4]);
        wire[7] = 0x55;
        let mut checker = PreambleChecker::new(4);
        assert!(checker.process(&wire).is_none());
        assert!(checker.process(&[0x55, 0x55]).is_none());
    }

    #[test]
    fn preamble_is_stripped_whatever_the_frame_length() {
        for &dw in &[1usize, 2, 4, 8] {
            let mut inserter = PreambleInserter::new(dw);
            let mut checker = PreambleChecker::new(dw);
            for len in 1..=17u8 {
                let frame: Vec<u8> = (0..len).collect();
                let wire = inserter.process(&frame);
                assert_eq!(wire.len(), ETH_PREAMBLE_LEN + frame.len());
                assert_eq!(wire[ETH_PREAMBLE_LEN - 1], 0xd5);
                assert!(wire[..ETH_PREAMBLE_LEN - 1].iter().all(|b| *b == 0x55));
                assert_eq!(checker.process(&wire).unwrap(), frame);
                let mut bad = wire.clone();
                bad[0] = 0xd5;
                assert!(checker.process(&bad).is_none(), "dw {} len {}", dw, len);
            }
        }
    }
}
