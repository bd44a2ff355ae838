//! Ethernet padding module

/// Padding Inserter Structure
#[derive(Debug, Clone, Copy)]
pub struct PaddingInserter {
    min_length: usize,
}

// PaddingInserter Implementation
impl PaddingInserter {
    // new() method
    pub fn new(min_length: usize) -> PaddingInserter {
        PaddingInserter { min_length }
    }
    // process() method
    /// zero-pad the frame up to the minimum length (FCS excluded)
    pub fn process(&self, mut frame: Vec<u8>) -> Vec<u8> {
        if frame.len() < self.min_length {
            frame.resize(self.min_length, 0);
        }
        frame
    }
}

/// Padding Checker Structure
/// Short frames are passed through, only counted.
#[derive(Debug, Clone, Copy)]
pub struct PaddingChecker {
    min_length: usize,
    runts: u64,
}

// PaddingChecker Implementation
impl PaddingChecker {
    // new() method
    pub fn new(min_length: usize) -> PaddingChecker {
        PaddingChecker {
            min_length,
            runts: 0,
        }
    }
    // process() method
    pub fn process(&mut self, frame: Vec<u8>) -> Vec<u8> {
        if frame.len() < self.min_length {
            self.runts += 1;
        }
        frame
    }
    // runts() getter
    pub fn runts(&self) -> u64 {
        self.runts
    }
}
