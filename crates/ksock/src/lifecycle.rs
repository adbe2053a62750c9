//! Socket creation, teardown, bind and listen.

use ksock_core::abi::AF_INET;
use ksock_core::{
    kdebug, kwarn, CompletionSink, Descriptor, Fd, FileTable, ProtocolStack, SockAddrIn,
    SockError, SockResult, SocketCache, SocketId,
};

use crate::layer::{Platform, SocketLayer};
use crate::socket::{Protocol, Socket, SocketKind};

impl<P: Platform> SocketLayer<P> {
    /// Create a socket and attach it to a new descriptor.
    ///
    /// Only `AF_INET` with TCP/stream or UDP/datagram is accepted. If any
    /// allocation fails, everything already taken is given back.
    pub fn create(&self, domain: i32, ty: i32, protocol: i32) -> SockResult<Fd> {
        if domain != AF_INET {
            return Err(SockError::InvalidArgument);
        }
        let kind = SocketKind::from_raw(ty).ok_or(SockError::InvalidArgument)?;
        let protocol = Protocol::from_raw(protocol).ok_or(SockError::InvalidArgument)?;
        if !protocol.matches(kind) {
            return Err(SockError::InvalidArgument);
        }

        let fd = self.files.alloc().ok_or(SockError::InvalidArgument)?;
        let pcb = match protocol {
            Protocol::Tcp => self.stack.tcp_new(),
            Protocol::Udp => self.stack.udp_new(),
        };
        let pcb = match pcb {
            Some(pcb) => pcb,
            None => {
                self.files.release(fd);
                return Err(SockError::InvalidArgument);
            }
        };
        let sock = Socket::new(kind, protocol, pcb, self.config.backlog_capacity);
        let id = match self.cache.alloc(sock) {
            Some(id) => id,
            None => {
                self.release_pcb(protocol, pcb);
                self.files.release(fd);
                return Err(SockError::InvalidArgument);
            }
        };
        self.stack.set_arg(pcb, id);
        self.files.install(fd, Descriptor::socket(id));
        kdebug!("{}: created {:?}/{:?} on {} ({})", id, kind, protocol, fd, pcb);
        Ok(fd)
    }

    /// Tear down the descriptor and the socket behind it.
    pub fn close(&self, fd: Fd) -> SockResult<()> {
        let desc = self.files.release(fd).ok_or(SockError::BadDescriptor)?;
        let id = desc.socket_id().ok_or(SockError::NotSocket)?;
        self.destroy(id);
        Ok(())
    }

    /// Free a socket: its pending chunk, its control block (one close),
    /// then every queued child, recursively.
    pub(crate) fn destroy(&self, id: SocketId) {
        let mut sock = match self.cache.free(id) {
            Some(sock) => sock,
            None => {
                kwarn!("{}: destroy of a free socket", id);
                return;
            }
        };
        sock.recv.clear();
        if let Some(pcb) = sock.pcb.take() {
            self.release_pcb(sock.protocol, pcb);
        }
        if !sock.owner.is_none() {
            // The connect can no longer complete.
            self.completions.disarm(sock.owner);
        }
        let children: Vec<SocketId> = sock.backlog.drain().map(|p| p.socket).collect();
        kdebug!("{}: closed ({} queued children)", id, children.len());
        for child in children {
            self.destroy(child);
        }
    }

    fn release_pcb(&self, protocol: Protocol, pcb: ksock_core::PcbId) {
        match protocol {
            Protocol::Tcp => {
                if let Err(e) = self.stack.close(pcb) {
                    kwarn!("{}: close failed: {}", pcb, e);
                }
            }
            Protocol::Udp => self.stack.udp_remove(pcb),
        }
    }

    /// Bind to a local address. TCP only.
    pub fn bind(&self, fd: Fd, local: SockAddrIn) -> SockResult<()> {
        let id = self.lookup(fd)?;
        self.cache
            .with(id, |sock| {
                let pcb = match sock.pcb {
                    Some(pcb) if sock.is_tcp() => pcb,
                    _ => return Err(SockError::InvalidArgument),
                };
                self.stack.bind(pcb, local).map_err(|e| {
                    kdebug!("{}: bind {} refused: {}", id, local, e);
                    SockError::InvalidArgument
                })
            })
            .ok_or(SockError::BadDescriptor)?
    }

    /// Start listening. TCP only.
    ///
    /// `hint` is clamped and passed to the stack; the backlog itself keeps
    /// the configured capacity. The stack may swap the control block.
    /// Listening again is a no-op.
    pub fn listen(&self, fd: Fd, hint: i32) -> SockResult<()> {
        let id = self.lookup(fd)?;
        let hint = hint.clamp(1, self.config.listen_hint_cap as i32) as u8;
        self.cache
            .with(id, |sock| {
                let pcb = match sock.pcb {
                    Some(pcb) if sock.is_tcp() => pcb,
                    _ => return Err(SockError::InvalidArgument),
                };
                if sock.listening {
                    return Ok(());
                }
                match self.stack.listen(pcb, hint) {
                    Ok(lpcb) => {
                        sock.pcb = Some(lpcb);
                        sock.listening = true;
                        self.stack.set_arg(lpcb, id);
                        kdebug!("{}: listening ({} -> {}, hint {})", id, pcb, lpcb, hint);
                        Ok(())
                    }
                    Err(e) => {
                        kdebug!("{}: listen refused: {}", id, e);
                        Err(SockError::InvalidArgument)
                    }
                }
            })
            .ok_or(SockError::BadDescriptor)?
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SocketConfig;
    use crate::layer::SocketLayer;
    use ksock_core::abi::{AF_INET, IPPROTO_TCP, IPPROTO_UDP, SOCK_DGRAM, SOCK_STREAM};
    use ksock_core::{FileTable, SockAddrIn, SockError, StackErr};
    use ksock_module::sim_stack::{SimOp, SimState};
    use ksock_module::SimStack;

    fn layer() -> SocketLayer<crate::SimPlatform> {
        SocketLayer::simulated(SocketConfig::default()).unwrap()
    }

    #[test]
    fn create_validates_triplet() {
        let l = layer();
        assert!(l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).is_ok());
        assert!(l.create(AF_INET, SOCK_DGRAM, IPPROTO_UDP).is_ok());
        for (d, t, p) in [
            (libc::AF_INET6, SOCK_STREAM, IPPROTO_TCP),
            (AF_INET, SOCK_STREAM, IPPROTO_UDP),
            (AF_INET, SOCK_DGRAM, IPPROTO_TCP),
            (AF_INET, libc::SOCK_RAW, IPPROTO_TCP),
            (AF_INET, SOCK_STREAM, 0),
        ] {
            assert_eq!(l.create(d, t, p), Err(SockError::InvalidArgument));
        }
        assert_eq!(l.live_sockets(), 2);
        assert_eq!(l.files().in_use(), 2);
    }

    #[test]
    fn create_rolls_back_on_exhaustion() {
        let l = SocketLayer::simulated(SocketConfig::new().max_sockets(1)).unwrap();
        l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
        assert_eq!(l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP), Err(SockError::InvalidArgument));
        assert_eq!(l.files().in_use(), 1);
        assert_eq!(l.stack().live_pcbs(), 1);

        let l = SocketLayer::simulated_with(SocketConfig::default(), SimStack::new().with_pcb_limit(0)).unwrap();
        assert_eq!(l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP), Err(SockError::InvalidArgument));
        assert_eq!((l.files().in_use(), l.live_sockets()), (0, 0));
    }

    #[test]
    fn close_releases_everything_once() {
        let l = layer();
        let fd = l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
        let udp = l.create(AF_INET, SOCK_DGRAM, IPPROTO_UDP).unwrap();
        l.close(fd).unwrap();
        l.close(udp).unwrap();
        assert_eq!(l.close(fd), Err(SockError::BadDescriptor));
        assert_eq!(l.stack().closes(), 2);
        assert_eq!(l.stack().bad_closes(), 0);
        assert_eq!(l.live_sockets(), 0);
    }

    #[test]
    fn udp_supports_only_close() {
        let l = layer();
        let fd = l.create(AF_INET, SOCK_DGRAM, IPPROTO_UDP).unwrap();
        assert_eq!(l.bind(fd, SockAddrIn::any(53)), Err(SockError::InvalidArgument));
        assert_eq!(l.listen(fd, 1), Err(SockError::InvalidArgument));
        assert_eq!(l.accept(fd).err(), Some(SockError::InvalidArgument));
        let mut buf = [0u8; 4];
        assert_eq!(l.recv(fd, &mut buf), Err(SockError::InvalidArgument));
        assert_eq!(l.send(fd, b"x", 0), Err(SockError::InvalidArgument));
    }

    #[test]
    fn bind_rejection_is_invalid_argument() {
        let l = layer();
        let a = l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
        let b = l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
        l.bind(a, SockAddrIn::any(8080)).unwrap();
        assert_eq!(l.bind(b, SockAddrIn::any(8080)), Err(SockError::InvalidArgument));
    }

    #[test]
    fn listen_swaps_handle_and_keeps_it_on_failure() {
        let l = layer();
        let fd = l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
        let before = l.pcb_of(fd).unwrap();
        l.stack().inject(SimOp::Listen, StackErr::Mem);
        assert_eq!(l.listen(fd, 8), Err(SockError::InvalidArgument));
        assert_eq!(l.pcb_of(fd), Some(before));
        assert!(!l.is_listening(fd));

        l.listen(fd, 1000).unwrap();
        let after = l.pcb_of(fd).unwrap();
        assert_ne!(after, before);
        assert_eq!(l.stack().state(after), Some(SimState::Listening));
        assert_eq!(l.stack().backlog_hint(after), Some(255));
        l.listen(fd, 1).unwrap();
        assert_eq!(l.pcb_of(fd), Some(after));
    }

    #[test]
    fn descriptor_errors() {
        let l = layer();
        let plain = l.files().alloc().unwrap();
        assert_eq!(l.bind(plain, SockAddrIn::any(1)), Err(SockError::NotSocket));
        assert_eq!(l.listen(ksock_core::Fd(77), 1), Err(SockError::BadDescriptor));
    }
}
