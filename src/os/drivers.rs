//! generic drivers module
use std::io;

// pflag operation Enumerator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PflagOp {
    Set,
    Unset,
}

/// Frame Writer Trait
/// Transmits a complete Ethernet frame (without preamble and FCS) on an interface.
pub trait FrameWriter {
    fn write_frame(&self, ifindex: i32, frame: &[u8]) -> io::Result<usize>;
}
