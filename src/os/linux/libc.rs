//! linux standard c library compatibility

// std, libc, ffi
use std::ffi::CString;
use std::io;

// c_ifnametoindex() function
/// see 'man 3 if_nametoindex'
pub fn c_ifnametoindex(ifname: &str) -> io::Result<u32> {
    let c_ifname = CString::new(ifname)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name holds a nul byte"))?;
    unsafe {
        match libc::if_nametoindex(c_ifname.as_ptr()) {
            0 => Err(io::Error::last_os_error()),
            r => Ok(r),
        }
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loopback_has_an_index() {
        assert!(c_ifnametoindex("lo").unwrap() > 0);
        assert!(c_ifnametoindex("no-such-iface0").is_err());
        assert!(c_ifnametoindex("bad\0name").is_err());
    }
}
