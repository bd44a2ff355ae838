//! Ethernet CRC32 (IEEE 802.3) module
//! The FCS is computed with a reflected LFSR updated byte per byte and is
//! appended least significant byte first.
use super::*;

// reflected_table() function
const fn reflected_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLYNOMIAL_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC32_TABLE: [u32; 256] = reflected_table();

/// CRC32 Structure
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    reg: u32,
}

// Crc32 Implementation
impl Crc32 {
    // new() method
    pub fn new() -> Crc32 {
        Crc32 { reg: CRC32_INIT }
    }
    // reset() method
    pub fn reset(&mut self) {
        self.reg = CRC32_INIT;
    }
    // update() method
    pub fn update(&mut self, data: &[u8]) {
        for b in data {
            self.reg = CRC32_TABLE[((self.reg ^ *b as u32) & 0xff) as usize] ^ (self.reg >> 8);
        }
    }
    // value() method
    /// the FCS of the bytes seen so far
    pub fn value(&self) -> u32 {
        !self.reg
    }
    // check() method
    /// true when the bytes seen so far end with a valid FCS
    pub fn check(&self) -> bool {
        self.reg.reverse_bits() == CRC32_CHECK
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Crc32::new()
    }
}

// crc32_insert() function
/// append the FCS to a frame
pub fn crc32_insert(frame: &[u8]) -> Vec<u8> {
    let mut crc = Crc32::new();
    crc.update(frame);
    let mut out = Vec::with_capacity(frame.len() + ETH_FCS_LEN);
    out.extend_from_slice(frame);
    out.extend_from_slice(&crc.value().to_le_bytes());
    out
}

// crc32_check() function
/// verify a frame ending with its FCS
pub fn crc32_check(frame: &[u8]) -> bool {
    if frame.len() < ETH_FCS_LEN {
        return false;
    }
    let mut crc = Crc32::new();
    crc.update(frame);
    crc.check()
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    #[test]
    fn known_check_value() {
        let mut crc = Crc32::new();
        crc.update(b"123456789");
        assert_eq!(crc.value(), 0xCBF43926);
    }

    #[test]
    fn polynomial_matches_reflected_table() {
        assert_eq!(CRC32_POLYNOMIAL.reverse_bits(), CRC32_POLYNOMIAL_REFLECTED);
    }

    #[test]
    fn inserted_crc_checks_and_any_bit_flip_fails() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let len = rng.gen_range(1, 128);
            let frame: Vec<u8> = (0..len).map(|_| rng.gen::<u8>()).collect();
            let with_fcs = crc32_insert(&frame);
            assert!(crc32_check(&with_fcs));
            for bit in 0..with_fcs.len() * 8 {
                let mut bad = with_fcs.clone();
                bad[bit / 8] ^= 1 << (bit % 8);
                assert!(!crc32_check(&bad));
            }
        }
    }

    #[test]
    fn streaming_update_resets_per_frame() {
        let mut crc = Crc32::new();
        crc.update(b"1234");
        crc.update(b"56789");
        assert_eq!(crc.value(), 0xCBF43926);
        crc.reset();
        crc.update(b"123456789");
        assert_eq!(crc.value(), 0xCBF43926);
    }
}
