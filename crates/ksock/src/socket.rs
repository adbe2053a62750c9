//! The socket object.

use ksock_core::abi::{IPPROTO_TCP, IPPROTO_UDP, SOCK_DGRAM, SOCK_STREAM};
use ksock_core::{PcbId, Pid, SockAddrIn};

use crate::backlog::Backlog;
use crate::recv::RecvBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
}

impl SocketKind {
    pub fn from_raw(ty: i32) -> Option<Self> {
        match ty {
            SOCK_STREAM => Some(Self::Stream),
            SOCK_DGRAM => Some(Self::Datagram),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn from_raw(proto: i32) -> Option<Self> {
        match proto {
            IPPROTO_TCP => Some(Self::Tcp),
            IPPROTO_UDP => Some(Self::Udp),
            _ => None,
        }
    }

    /// The only protocol each kind runs over here.
    pub fn matches(self, kind: SocketKind) -> bool {
        matches!(
            (self, kind),
            (Self::Tcp, SocketKind::Stream) | (Self::Udp, SocketKind::Datagram)
        )
    }
}

/// Per-socket state shared by the syscall path and the event path.
///
/// Lives in the socket cache; each access goes through the cache's
/// per-object lock.
#[derive(Debug)]
pub struct Socket<B> {
    pub kind: SocketKind,
    pub protocol: Protocol,
    /// Handle to the stack's control block. `None` once the stack has
    /// reported a fatal error and freed it.
    pub pcb: Option<PcbId>,
    pub recv: RecvBuffer<B>,
    /// Always empty unless `listening`.
    pub backlog: Backlog,
    pub listening: bool,
    /// Process waiting on a connect; `Pid::NONE` otherwise.
    pub owner: Pid,
    /// Remote endpoint, recorded for accepted connections.
    pub peer: Option<SockAddrIn>,
}

impl<B> Socket<B> {
    pub fn new(kind: SocketKind, protocol: Protocol, pcb: PcbId, backlog_capacity: usize) -> Self {
        Self {
            kind,
            protocol,
            pcb: Some(pcb),
            recv: RecvBuffer::default(),
            backlog: Backlog::new(backlog_capacity),
            listening: false,
            owner: Pid::NONE,
            peer: None,
        }
    }

    /// A connection queued on `parent`'s backlog. Inherits kind and
    /// protocol.
    pub fn child_of(parent: &Socket<B>, pcb: PcbId, peer: SockAddrIn) -> Self {
        let mut child = Self::new(parent.kind, parent.protocol, pcb, parent.backlog.capacity());
        child.peer = Some(peer);
        child
    }

    #[inline]
    pub fn is_tcp(&self) -> bool {
        self.protocol == Protocol::Tcp
    }
}
