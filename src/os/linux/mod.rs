//! Linux Operating System support

// standard C library compatibility
pub mod libc;
// netdev support
pub mod netdev;
// AF_PACKET raw sockets
pub mod socket;
