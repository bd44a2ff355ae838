//! Ethernet interpacket gap module
//! After each frame the transmitter stays idle for at least `gap` bytes times,
//! one poll cycle being one bus beat of `dw` bytes.

/// Gap Inserter Structure
#[derive(Debug, Clone, Copy)]
pub struct GapInserter {
    cycles: usize,
    count: usize,
}

// GapInserter Implementation
impl GapInserter {
    // new() method
    pub fn new(gap: usize, dw: usize) -> GapInserter {
        GapInserter {
            cycles: (gap + dw - 1) / dw,
            count: 0,
        }
    }
    // start() method
    /// a frame just left, start the idle period
    pub fn start(&mut self) {
        self.count = self.cycles;
    }
    // tick() method
    /// advance one cycle, returns true once the transmitter may send again
    pub fn tick(&mut self) -> bool {
        if self.count > 0 {
            self.count -= 1;
            return false;
        }
        true
    }
    // idle() method
    pub fn idle(&self) -> bool {
        self.count == 0
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::ETH_INTERPACKET_GAP;

    #[test]
    fn idles_for_the_gap_in_beats() {
        let mut gap = GapInserter::new(12, 8);
        assert!(gap.tick());
        gap.start();
        assert!(!gap.tick());
        assert!(!gap.tick());
        assert!(gap.tick());
        assert!(gap.idle());
    }

    #[test]
    fn gap_lasts_twelve_byte_times_at_every_width() {
        for &(dw, cycles) in &[(1usize, 12usize), (2, 6), (4, 3), (8, 2)] {
            let mut gap = GapInserter::new(ETH_INTERPACKET_GAP, dw);
            gap.start();
            assert!(!gap.idle());
            let idle = (0..).take_while(|_| !gap.tick()).count();
            assert_eq!(idle, cycles, "dw {}", dw);
            assert!(gap.idle());
        }
    }
}
