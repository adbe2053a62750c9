//! IPv4 endpoint address.

use std::fmt;
use std::net::Ipv4Addr;

use crate::abi::{RawSockAddrIn, AF_INET};

/// An IPv4 address/port pair in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockAddrIn {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl SockAddrIn {
    pub const UNSPECIFIED: Self = Self {
        ip: Ipv4Addr::UNSPECIFIED,
        port: 0,
    };

    #[inline]
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// `0.0.0.0:port`, the usual address for a listening socket.
    #[inline]
    pub const fn any(port: u16) -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, port)
    }

    /// Decode a user-supplied `sockaddr_in`. Only `AF_INET` is accepted.
    pub fn from_raw(raw: &RawSockAddrIn) -> Option<Self> {
        if raw.sin_family as i32 != AF_INET {
            return None;
        }
        Some(Self {
            ip: Ipv4Addr::from(u32::from_be(raw.sin_addr)),
            port: u16::from_be(raw.sin_port),
        })
    }

    /// Encode into the user-visible `sockaddr_in` layout.
    pub fn to_raw(self) -> RawSockAddrIn {
        RawSockAddrIn {
            sin_family: AF_INET as u16,
            sin_port: self.port.to_be(),
            sin_addr: u32::from(self.ip).to_be(),
            sin_zero: [0; 8],
        }
    }
}

impl fmt::Display for SockAddrIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_layout_is_network_order() {
        let addr = SockAddrIn::new(Ipv4Addr::new(10, 0, 2, 15), 8080);
        let raw = addr.to_raw();
        assert_eq!(raw.sin_port, 8080u16.to_be());
        assert_eq!(raw.sin_addr, 0x0a00_020fu32.to_be());
        assert_eq!(SockAddrIn::from_raw(&raw), Some(addr));
    }

    #[test]
    fn rejects_foreign_family() {
        let mut raw = SockAddrIn::any(80).to_raw();
        raw.sin_family = 10; // AF_INET6
        assert_eq!(SockAddrIn::from_raw(&raw), None);
    }

    #[test]
    fn display() {
        assert_eq!(SockAddrIn::any(8080).to_string(), "0.0.0.0:8080");
    }
}
