//! # Numbered syscall surface
//!
//! Typed `sys_*` entry points that turn socket-layer results into
//! syscall return values (non-negative on success, negative errno on
//! failure, `0` for a read at end of stream), plus `syscall()` which
//! routes by number with raw user arguments.
//!
//! ```ignore
//! let fd = layer.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_TCP);
//! let r = layer.sys_bind(fd as i32, &SockAddrIn::any(8080).to_raw(), SOCKADDR_IN_LEN);
//! ```

use ksock_core::abi::{nr, RawSockAddrIn, SOCKADDR_IN_LEN};
use ksock_core::{Fd, SockAddrIn, SockError, SockResult};

use crate::layer::{Platform, SocketLayer};

#[inline]
fn ret_len(r: SockResult<usize>) -> i64 {
    match r {
        Ok(n) => n as i64,
        Err(e) => e.syscall_ret(),
    }
}

#[inline]
fn ret_unit(r: SockResult<()>) -> i64 {
    match r {
        Ok(()) => 0,
        Err(e) => e.syscall_ret(),
    }
}

#[inline]
fn neg(errno: i32) -> i64 {
    -(errno as i64)
}

fn decode_addr(addr: &RawSockAddrIn, addrlen: u32) -> SockResult<SockAddrIn> {
    if addrlen < SOCKADDR_IN_LEN {
        return Err(SockError::InvalidArgument);
    }
    SockAddrIn::from_raw(addr).ok_or(SockError::InvalidArgument)
}

impl<P: Platform> SocketLayer<P> {
    pub fn sys_socket(&self, domain: i32, ty: i32, protocol: i32) -> i64 {
        match self.create(domain, ty, protocol) {
            Ok(fd) => fd.0 as i64,
            Err(e) => e.syscall_ret(),
        }
    }

    pub fn sys_connect(&self, fd: i32, addr: &RawSockAddrIn, addrlen: u32) -> i64 {
        ret_unit(decode_addr(addr, addrlen).and_then(|a| self.connect(Fd(fd), a)))
    }

    pub fn sys_bind(&self, fd: i32, addr: &RawSockAddrIn, addrlen: u32) -> i64 {
        ret_unit(decode_addr(addr, addrlen).and_then(|a| self.bind(Fd(fd), a)))
    }

    pub fn sys_listen(&self, fd: i32, backlog: i32) -> i64 {
        ret_unit(self.listen(Fd(fd), backlog))
    }

    /// Accept one connection; fills `addr`/`addrlen` with the peer when
    /// given.
    pub fn sys_accept(
        &self,
        fd: i32,
        addr: Option<&mut RawSockAddrIn>,
        addrlen: Option<&mut u32>,
    ) -> i64 {
        match self.accept(Fd(fd)) {
            Ok((child, peer)) => {
                if let Some(addr) = addr {
                    *addr = peer.to_raw();
                }
                if let Some(len) = addrlen {
                    *len = SOCKADDR_IN_LEN;
                }
                child.0 as i64
            }
            Err(e) => e.syscall_ret(),
        }
    }

    pub fn sys_recv(&self, fd: i32, buf: &mut [u8], _flags: i32) -> i64 {
        ret_len(self.recv(Fd(fd), buf))
    }

    pub fn sys_send(&self, fd: i32, buf: &[u8], flags: i32) -> i64 {
        ret_len(self.send(Fd(fd), buf, flags))
    }

    /// Interface configuration is not supported; every request succeeds
    /// without effect.
    pub fn sys_ioctl(&self, _fd: i32, _req: u64, _arg: u64) -> i64 {
        0
    }

    pub fn sys_close(&self, fd: i32) -> i64 {
        ret_unit(self.close(Fd(fd)))
    }

    /// Route a socket-family syscall by number.
    ///
    /// Unknown numbers, and `recvfrom`/`sendto`, return `-ENOSYS`.
    ///
    /// # Safety
    ///
    /// Pointer arguments must be null or valid for the access the call
    /// makes: `sockaddr_in` reads for connect/bind, `sockaddr_in` and
    /// `u32` writes for accept, `len` bytes for recv/send.
    pub unsafe fn syscall(&self, number: u32, args: [u64; 6]) -> i64 {
        let fd = args[0] as i32;
        match number {
            nr::SOCKET => self.sys_socket(args[0] as i32, args[1] as i32, args[2] as i32),
            nr::CONNECT | nr::BIND => {
                let ptr = args[1] as *const RawSockAddrIn;
                if ptr.is_null() {
                    return neg(libc::EFAULT);
                }
                let addr = std::ptr::read_unaligned(ptr);
                if number == nr::CONNECT {
                    self.sys_connect(fd, &addr, args[2] as u32)
                } else {
                    self.sys_bind(fd, &addr, args[2] as u32)
                }
            }
            nr::LISTEN => self.sys_listen(fd, args[1] as i32),
            nr::ACCEPT => {
                let mut peer = RawSockAddrIn::default();
                let mut len = 0u32;
                let r = self.sys_accept(fd, Some(&mut peer), Some(&mut len));
                if r >= 0 {
                    let addr_ptr = args[1] as *mut RawSockAddrIn;
                    let len_ptr = args[2] as *mut u32;
                    if !addr_ptr.is_null() {
                        std::ptr::write_unaligned(addr_ptr, peer);
                    }
                    if !len_ptr.is_null() {
                        std::ptr::write_unaligned(len_ptr, len);
                    }
                }
                r
            }
            nr::RECV => {
                let len = args[2] as i64;
                if len <= 0 {
                    return neg(libc::EINVAL);
                }
                let ptr = args[1] as *mut u8;
                if ptr.is_null() {
                    return neg(libc::EFAULT);
                }
                let buf = std::slice::from_raw_parts_mut(ptr, len as usize);
                self.sys_recv(fd, buf, args[3] as i32)
            }
            nr::SEND => {
                let len = args[2] as i64;
                if len < 0 {
                    return neg(libc::EINVAL);
                }
                let ptr = args[1] as *const u8;
                if len == 0 {
                    return self.sys_send(fd, &[], args[3] as i32);
                }
                if ptr.is_null() {
                    return neg(libc::EFAULT);
                }
                let buf = std::slice::from_raw_parts(ptr, len as usize);
                self.sys_send(fd, buf, args[3] as i32)
            }
            nr::IOCTL => self.sys_ioctl(fd, args[1], args[2]),
            nr::CLOSE => self.sys_close(fd),
            _ => neg(libc::ENOSYS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SocketConfig;
    use crate::SimPlatform;
    use ksock_core::abi::{AF_INET, IPPROTO_TCP, SOCK_STREAM};
    use std::net::Ipv4Addr;

    fn layer() -> SocketLayer<SimPlatform> {
        SocketLayer::simulated(SocketConfig::default()).unwrap()
    }

    #[test]
    fn typed_surface() {
        let l = layer();
        let fd = l.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_TCP);
        assert_eq!(fd, 0);
        assert_eq!(l.sys_socket(AF_INET, SOCK_STREAM, 0), neg(libc::EINVAL));
        let addr = SockAddrIn::any(8080).to_raw();
        assert_eq!(l.sys_bind(0, &addr, SOCKADDR_IN_LEN), 0);
        assert_eq!(l.sys_bind(0, &addr, 4), neg(libc::EINVAL));
        assert_eq!(l.sys_listen(0, 4), 0);
        assert_eq!(l.sys_accept(0, None, None), neg(libc::EAGAIN));
        assert_eq!(l.sys_ioctl(0, 0x8913, 0), 0);
        assert_eq!(l.sys_close(0), 0);
        assert_eq!(l.sys_close(0), neg(libc::EBADF));
    }

    #[test]
    fn accept_fills_peer() {
        let l = layer();
        l.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_TCP);
        l.sys_listen(0, 1);
        let remote = SockAddrIn::new(Ipv4Addr::new(172, 16, 0, 9), 61000);
        let (id, ev) = l.stack().incoming(l.pcb_of(Fd(0)).unwrap(), remote).unwrap();
        l.dispatch(id, ev);
        let mut raw = RawSockAddrIn::default();
        let mut len = 0u32;
        assert_eq!(l.sys_accept(0, Some(&mut raw), Some(&mut len)), 1);
        assert_eq!(SockAddrIn::from_raw(&raw), Some(remote));
        assert_eq!(len, SOCKADDR_IN_LEN);
    }

    #[test]
    fn raw_routing() {
        let l = layer();
        unsafe {
            let fd = l.syscall(nr::SOCKET, [AF_INET as u64, SOCK_STREAM as u64, IPPROTO_TCP as u64, 0, 0, 0]);
            assert_eq!(fd, 0);
            let addr = SockAddrIn::any(80).to_raw();
            let addr_ptr = &addr as *const RawSockAddrIn as u64;
            assert_eq!(l.syscall(nr::BIND, [0, addr_ptr, SOCKADDR_IN_LEN as u64, 0, 0, 0]), 0);
            assert_eq!(l.syscall(nr::CONNECT, [0, 0, SOCKADDR_IN_LEN as u64, 0, 0, 0]), neg(libc::EFAULT));

            let mut buf = [0u8; 8];
            let buf_ptr = buf.as_mut_ptr() as u64;
            assert_eq!(l.syscall(nr::RECV, [0, buf_ptr, 0, 0, 0, 0]), neg(libc::EINVAL));
            assert_eq!(l.syscall(nr::RECV, [0, buf_ptr, 8, 0, 0, 0]), neg(libc::EAGAIN));
            assert_eq!(l.syscall(nr::SEND, [0, 0, 0, 0, 0, 0]), 0);
            assert_eq!(l.syscall(nr::IOCTL, [0, 1, 2, 0, 0, 0]), 0);
            assert_eq!(l.syscall(nr::RECVFROM, [0; 6]), neg(libc::ENOSYS));
            assert_eq!(l.syscall(nr::SENDTO, [0; 6]), neg(libc::ENOSYS));
            assert_eq!(l.syscall(999, [0; 6]), neg(libc::ENOSYS));
            assert_eq!(l.syscall(nr::CLOSE, [0; 6]), 0);
        }
    }

    #[test]
    fn end_of_stream_reads_zero() {
        let l = layer();
        l.sys_socket(AF_INET, SOCK_STREAM, IPPROTO_TCP);
        let id = l.socket_of(Fd(0)).unwrap();
        l.dispatch(id, ksock_core::StackEvent::Recv { buf: None, err: Ok(()) });
        let mut buf = [0u8; 4];
        assert_eq!(l.sys_recv(0, &mut buf, 0), 0);
    }
}
