//! errors module
//! This module defines the errors reported while building or running a stack.
//! Per-frame errors are never reported through this type, they are counted
//! by the layer that detected them.
use std::error::Error;
use std::fmt;
use std::io;

/// Stack Error Enumerator
#[derive(Debug)]
pub enum StackError {
    EtherTypeAlreadyAssigned(u16),
    ProtocolAlreadyAssigned(u16),
    PortAlreadyAssigned(u16),
    InvalidDataWidth(usize),
    Config(String),
    Io(io::Error),
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StackError::EtherTypeAlreadyAssigned(t) => {
                write!(f, "ethernet type {:#06x} already assigned", t)
            }
            StackError::ProtocolAlreadyAssigned(p) => {
                write!(f, "protocol {:#04x} already assigned", p)
            }
            StackError::PortAlreadyAssigned(p) => write!(f, "port {:#x} already assigned", p),
            StackError::InvalidDataWidth(dw) => {
                write!(f, "invalid data width of {} byte(s), expected 1, 2, 4 or 8", dw)
            }
            StackError::Config(s) => write!(f, "configuration error: {}", s),
            StackError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl Error for StackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StackError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StackError {
    fn from(e: io::Error) -> Self {
        StackError::Io(e)
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_duplicate_port() {
        let e = StackError::PortAlreadyAssigned(1234);
        assert_eq!(format!("{}", e), "port 0x4d2 already assigned");
    }

    #[test]
    fn io_errors_keep_their_source() {
        let e: StackError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(e.source().is_some());
        assert!(format!("{}", e).contains("boom"));
    }
}
