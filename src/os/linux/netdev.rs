//! linux specific network device functions module
//! This module interfaces with the linux netdevice kernel API.
use crate::os::drivers::PflagOp;

// std, libc
use libc::{c_short, ioctl, IFF_PROMISC, IFF_RUNNING, IFF_UP, IF_NAMESIZE};
use std::io;

/// ioctl_flags Structure
#[repr(C)]
struct ioctl_flags {
    ifr_name: [u8; IF_NAMESIZE],
    ifr_flags: c_short,
    ifr_pad: [u8; 22], // rest of struct ifreq
}

// ifr_name() function
/// nul terminated interface name, as expected by the ioctls
fn ifr_name(ifname: &str) -> io::Result<[u8; IF_NAMESIZE]> {
    let bytes = ifname.as_bytes();
    if bytes.len() >= IF_NAMESIZE || bytes.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid interface name {:?}", ifname),
        ));
    }
    let mut buf = [0u8; IF_NAMESIZE];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

// set_if_promiscuous() function
/// Set (or Unset) interface in promiscuous mode
pub fn set_if_promiscuous(sockfd: i32, ifname: &str, op: PflagOp) -> io::Result<()> {
    let mut ifopts = ioctl_flags {
        ifr_name: ifr_name(ifname)?,
        ifr_flags: 0,
        ifr_pad: [0; 22],
    };

    // read the current flags first
    if unsafe { ioctl(sockfd, libc::SIOCGIFFLAGS, &mut ifopts) } < 0 {
        return Err(io::Error::last_os_error());
    }

    match op {
        PflagOp::Set => {
            ifopts.ifr_flags |= IFF_UP as c_short | IFF_RUNNING as c_short | IFF_PROMISC as c_short;
        }
        PflagOp::Unset => {
            ifopts.ifr_flags &= !(IFF_PROMISC as c_short);
        }
    }
    if unsafe { ioctl(sockfd, libc::SIOCSIFFLAGS, &mut ifopts) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interface_names_are_bounded() {
        let name = ifr_name("eth0").unwrap();
        assert_eq!(&name[..5], b"eth0\0");
        assert!(ifr_name("a-very-long-ifname").is_err());
        assert!(ifr_name("et\0h").is_err());
    }
}
