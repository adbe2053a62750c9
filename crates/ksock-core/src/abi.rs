//! User-visible ABI: address families, socket types, protocols,
//! syscall numbers and the `sockaddr_in` layout.
//!
//! The family/type/protocol values are the POSIX ones, taken from libc so
//! user programs built against a regular libc agree with the kernel.

pub const AF_INET: i32 = libc::AF_INET;
pub const SOCK_STREAM: i32 = libc::SOCK_STREAM;
pub const SOCK_DGRAM: i32 = libc::SOCK_DGRAM;
pub const IPPROTO_TCP: i32 = libc::IPPROTO_TCP;
pub const IPPROTO_UDP: i32 = libc::IPPROTO_UDP;

/// Syscall numbers of the socket family. These are this kernel's own
/// numbers, not Linux's.
pub mod nr {
    pub const IOCTL: u32 = 27;
    pub const SOCKET: u32 = 28;
    pub const CONNECT: u32 = 29;
    pub const BIND: u32 = 30;
    pub const LISTEN: u32 = 31;
    pub const ACCEPT: u32 = 32;
    pub const RECV: u32 = 33;
    pub const SEND: u32 = 34;
    pub const RECVFROM: u32 = 35;
    pub const SENDTO: u32 = 36;
    pub const CLOSE: u32 = 21;
}

/// `struct sockaddr_in` exactly as user space lays it out.
/// Port and address are in network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct RawSockAddrIn {
    pub sin_family: u16,
    pub sin_port: u16,
    pub sin_addr: u32,
    pub sin_zero: [u8; 8],
}

pub const SOCKADDR_IN_LEN: u32 = core::mem::size_of::<RawSockAddrIn>() as u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockaddr_in_is_sixteen_bytes() {
        assert_eq!(SOCKADDR_IN_LEN, 16);
    }

    #[test]
    fn posix_values() {
        assert_eq!(AF_INET, 2);
        assert_eq!(IPPROTO_TCP, 6);
        assert_eq!(IPPROTO_UDP, 17);
    }
}
