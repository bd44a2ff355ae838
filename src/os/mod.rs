//! operating systems support module
//! Boards are attached to the host interfaces through one raw socket, frames
//! are received from every interface and written back on the board's own.
//! Only Linux `AF_PACKET` sockets are available.
use std::io;

// drivers
pub mod drivers;
use drivers::PflagOp;

// Linux raw sockets and interface control
#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::socket::{RawSocket, RecvInfo};

// interface_index() function
/// kernel index of a named interface, as reported on received frames
#[cfg(target_os = "linux")]
pub fn interface_index(ifname: &str) -> io::Result<i32> {
    Ok(linux::libc::c_ifnametoindex(ifname)? as i32)
}

// set_promiscuous() function
/// set (or clear) promiscuous mode on each interface, stopping at the first failure
#[cfg(target_os = "linux")]
pub fn set_promiscuous<'a, I>(socket: &RawSocket, interfaces: I, op: PflagOp) -> io::Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    for ifname in interfaces {
        linux::netdev::set_if_promiscuous(socket.fd(), ifname, op)?;
    }
    Ok(())
}

// Tests
#[cfg(all(test, target_os = "linux"))]
mod test {
    use super::*;

    #[test]
    fn indexes_match_the_libc_lookup() {
        let lo = interface_index("lo").unwrap();
        assert_eq!(lo as u32, linux::libc::c_ifnametoindex("lo").unwrap());
        assert!(interface_index("no-such-board0").is_err());
    }
}
