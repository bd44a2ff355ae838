//! linux AF_PACKET raw sockets module
//! This module opens the raw socket the boards are attached with, receives
//! every frame seen on the host interfaces and transmits the boards frames.
use crate::constants::{ETH_P_ALL, PACKET_OUTGOING};
use crate::os::drivers::FrameWriter;

// std, libc
use libc::{
    c_void, close, recvfrom, sendto, sockaddr, sockaddr_ll, socket, socklen_t, AF_PACKET, SOCK_RAW,
};
use std::io;
use std::mem;

/// Received Frame Structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecvInfo {
    pub len: usize,
    pub ifindex: i32,
    pub outgoing: bool, // frame sent by this host
}

/// Raw Socket Structure
#[derive(Debug)]
pub struct RawSocket {
    fd: i32,
}

// RawSocket Implementation
impl RawSocket {
    // open() function
    /// open a raw AF_PACKET socket receiving every protocol
    pub fn open() -> io::Result<RawSocket> {
        // man 2 socket
        match unsafe { socket(AF_PACKET, SOCK_RAW, (ETH_P_ALL.to_be()) as i32) } {
            -1 => Err(io::Error::last_os_error()),
            fd => Ok(RawSocket { fd }),
        }
    }
    // fd() getter
    pub fn fd(&self) -> i32 {
        self.fd
    }
    // recv() method
    /// block until a frame is received
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<RecvInfo> {
        let mut sa: sockaddr_ll = unsafe { mem::zeroed() };
        let mut sa_len = mem::size_of::<sockaddr_ll>() as socklen_t;
        let len = unsafe {
            recvfrom(
                self.fd,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                0,
                &mut sa as *mut sockaddr_ll as *mut sockaddr,
                &mut sa_len,
            )
        };
        if len < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(RecvInfo {
            len: len as usize,
            ifindex: sa.sll_ifindex,
            outgoing: sa.sll_pkttype == PACKET_OUTGOING,
        })
    }
}

impl FrameWriter for RawSocket {
    fn write_frame(&self, ifindex: i32, frame: &[u8]) -> io::Result<usize> {
        // sockaddr_ll (man 7 packet)
        let mut sa: sockaddr_ll = unsafe { mem::zeroed() };
        sa.sll_family = AF_PACKET as u16;
        sa.sll_protocol = ETH_P_ALL.to_be();
        sa.sll_ifindex = ifindex;
        let len = unsafe {
            sendto(
                self.fd,
                frame.as_ptr() as *const c_void,
                frame.len(),
                0,
                &sa as *const sockaddr_ll as *const sockaddr,
                mem::size_of::<sockaddr_ll>() as socklen_t,
            )
        };
        if len < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(len as usize)
        }
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        unsafe {
            close(self.fd);
        }
    }
}
