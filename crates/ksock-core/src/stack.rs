//! Protocol stack abstraction.
//!
//! The stack owns protocol control blocks and packet buffers and runs in
//! its own execution context. The socket layer drives it through
//! `ProtocolStack` and is driven by it through `StackEvent`s.
//!
//! # Implementors
//!
//! - `SimStack` (ksock-module): deterministic in-memory model. Control
//!   blocks are table entries, the send window is a settable counter,
//!   events are produced by helper methods and fed to the dispatcher by
//!   the caller. Used by tests, benchmarks and the smoke binary.
//!
//! - A real TCP/IP stack binding: wraps the stack's raw control block
//!   pointers in `PcbId`, packs each hook invocation into a `RawEvent`
//!   and hands it to the dispatcher's raw entry point.

use crate::addr::SockAddrIn;
use crate::error::{StackErr, StackResult};
use crate::ids::{PcbId, SocketId};

/// A chunk of received bytes owned by the stack's buffer pool.
///
/// Dropping the value releases it back to the stack.
pub trait PacketBuf: Send {
    /// Total bytes in the chunk (all segments).
    fn total_len(&self) -> usize;

    /// Copy up to `dst.len()` bytes starting at `offset` into `dst`.
    /// Returns the number of bytes copied.
    fn copy_partial(&self, dst: &mut [u8], offset: usize) -> usize;
}

impl PacketBuf for Vec<u8> {
    fn total_len(&self) -> usize {
        self.len()
    }

    fn copy_partial(&self, dst: &mut [u8], offset: usize) -> usize {
        if offset >= self.len() {
            return 0;
        }
        let n = dst.len().min(self.len() - offset);
        dst[..n].copy_from_slice(&self[offset..offset + n]);
        n
    }
}

/// Commands the socket layer issues to the stack.
///
/// **Contract:** no method blocks. Every call returns the stack's verdict
/// immediately; outcomes that take time (connection establishment, data
/// arrival) come back later as `StackEvent`s.
///
/// The socket layer calls these methods while holding the socket's lock.
/// An implementation must not call back into the socket layer (raise an
/// event for any socket) before returning; events are raised from the
/// stack's own context afterwards.
pub trait ProtocolStack: Send + Sync {
    /// The stack's received-chunk type.
    type Buf: PacketBuf;

    /// Create a fresh TCP control block. `None` when the stack is out of
    /// control blocks.
    fn tcp_new(&self) -> Option<PcbId>;

    /// Create a fresh UDP control block.
    fn udp_new(&self) -> Option<PcbId>;

    /// Route every future event on `pcb` to `socket`.
    fn set_arg(&self, pcb: PcbId, socket: SocketId);

    /// Bind to a local address/port.
    fn bind(&self, pcb: PcbId, local: SockAddrIn) -> StackResult<()>;

    /// Turn a bound control block into a listening one.
    ///
    /// The stack may free `pcb` and hand back a different, smaller
    /// listening control block; the caller must use the returned handle
    /// from now on. On error `pcb` is untouched.
    fn listen(&self, pcb: PcbId, backlog: u8) -> StackResult<PcbId>;

    /// Start an active open. The outcome arrives as `StackEvent::Connected`.
    fn connect(&self, pcb: PcbId, remote: SockAddrIn) -> StackResult<()>;

    /// Close a TCP control block. After success the handle is dead.
    fn close(&self, pcb: PcbId) -> StackResult<()>;

    /// Remove a UDP control block.
    fn udp_remove(&self, pcb: PcbId);

    /// Bytes currently acceptable for transmission.
    fn send_window(&self, pcb: PcbId) -> usize;

    /// Queue `data` for transmission (copied by the stack).
    fn write(&self, pcb: PcbId, data: &[u8]) -> StackResult<()>;

    /// Transmit queued data now.
    fn output(&self, pcb: PcbId) -> StackResult<()>;

    /// Credit `len` bytes back to the receive window.
    fn recved(&self, pcb: PcbId, len: usize);

    /// Remote endpoint of a connected control block.
    fn remote_addr(&self, pcb: PcbId) -> Option<SockAddrIn>;
}

/// Raw numbering of stack events, as the stack's event hook reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    Accept = 0,
    Sent = 1,
    Recv = 2,
    Connected = 3,
    Poll = 4,
    Err = 5,
}

impl EventKind {
    /// Decode a raw event number.
    ///
    /// # Panics
    ///
    /// An unknown number means the stack and this layer disagree on the
    /// event contract. That is not recoverable.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Accept,
            1 => Self::Sent,
            2 => Self::Recv,
            3 => Self::Connected,
            4 => Self::Poll,
            5 => Self::Err,
            _ => unreachable!("ksock: unknown stack event kind {}", raw),
        }
    }
}

/// One notification from the stack, with its payload.
#[derive(Debug)]
pub enum StackEvent<B> {
    /// A listener completed a handshake. `pcb` is the new connection.
    Accept { pcb: PcbId, err: StackResult<()> },
    /// `len` bytes were acknowledged by the peer.
    Sent { len: u16 },
    /// Data arrived (`buf`), or the peer closed (`buf == None`), or the
    /// connection failed (`err`).
    Recv { buf: Option<B>, err: StackResult<()> },
    /// Outcome of an active open.
    Connected { err: StackResult<()> },
    /// Periodic tick.
    Poll,
    /// The connection died. The stack has already freed the control block.
    Err { err: StackErr },
}

/// Arguments of one call into the stack's event hook, before decoding.
///
/// Fields a given kind does not use are ignored: `pcb` is read by
/// `Accept` only, `buf` by `Recv`, `len` by `Sent`.
#[derive(Debug)]
pub struct RawEvent<B> {
    pub kind: u8,
    pub pcb: Option<PcbId>,
    pub buf: Option<B>,
    pub len: u16,
    /// Raw stack status, `0` for success.
    pub err: i8,
}

/// Decode a raw status. A code the stack never defines is read as `Arg`.
fn status(code: i8) -> StackResult<()> {
    match code {
        0 => Ok(()),
        code => Err(StackErr::from_raw(code).unwrap_or(StackErr::Arg)),
    }
}

impl<B> StackEvent<B> {
    /// Decode the event hook's raw arguments.
    ///
    /// # Panics
    ///
    /// On an unknown event kind, and on an `Accept` without a control
    /// block. Both mean the stack broke the event contract.
    pub fn from_raw(raw: RawEvent<B>) -> Self {
        match EventKind::from_raw(raw.kind) {
            EventKind::Accept => match raw.pcb {
                Some(pcb) => Self::Accept { pcb, err: status(raw.err) },
                None => panic!("ksock: accept event without a control block"),
            },
            EventKind::Sent => Self::Sent { len: raw.len },
            EventKind::Recv => Self::Recv { buf: raw.buf, err: status(raw.err) },
            EventKind::Connected => Self::Connected { err: status(raw.err) },
            EventKind::Poll => Self::Poll,
            EventKind::Err => Self::Err {
                err: status(raw.err).err().unwrap_or(StackErr::Arg),
            },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Accept { .. } => EventKind::Accept,
            Self::Sent { .. } => EventKind::Sent,
            Self::Recv { .. } => EventKind::Recv,
            Self::Connected { .. } => EventKind::Connected,
            Self::Poll => EventKind::Poll,
            Self::Err { .. } => EventKind::Err,
        }
    }
}

/// The socket layer's answer to one `StackEvent`.
///
/// A refused data chunk travels back inside `Busy` so the stack keeps
/// ownership and can redeliver it later.
#[derive(Debug)]
pub enum EventReply<B> {
    /// Event consumed.
    Ok,
    /// A chunk is still pending on the socket; the stack must hold this one.
    Busy(B),
    /// Incoming connection refused (backlog or socket cache full).
    Refused,
    /// The socket has released the control block.
    Abort,
}

impl<B> EventReply<B> {
    /// The status code the stack's event hook expects.
    pub fn code(&self) -> StackResult<()> {
        match self {
            Self::Ok => Ok(()),
            Self::Busy(_) | Self::Refused => Err(StackErr::Mem),
            Self::Abort => Err(StackErr::Abrt),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Raw status for the event hook, plus the chunk it must keep.
    pub fn into_raw(self) -> (i8, Option<B>) {
        let code = match self.code() {
            Ok(()) => 0,
            Err(e) => e.raw(),
        };
        (code, self.into_refused())
    }

    /// Take back a refused chunk.
    pub fn into_refused(self) -> Option<B> {
        match self {
            Self::Busy(buf) => Some(buf),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_copy_partial() {
        let chunk: Vec<u8> = (0u8..10).collect();
        let mut dst = [0u8; 4];
        assert_eq!(chunk.copy_partial(&mut dst, 0), 4);
        assert_eq!(dst, [0, 1, 2, 3]);
        assert_eq!(chunk.copy_partial(&mut dst, 8), 2);
        assert_eq!(&dst[..2], &[8, 9]);
        assert_eq!(chunk.copy_partial(&mut dst, 10), 0);
    }

    #[test]
    fn event_kind_numbering() {
        let ev: StackEvent<Vec<u8>> = StackEvent::Poll;
        assert_eq!(ev.kind(), EventKind::Poll);
        assert_eq!(EventKind::from_raw(2), EventKind::Recv);
        assert_eq!(EventKind::from_raw(EventKind::Err as u8), EventKind::Err);
    }

    #[test]
    fn reply_codes() {
        assert_eq!(EventReply::<Vec<u8>>::Ok.code(), Ok(()));
        assert_eq!(EventReply::<Vec<u8>>::Refused.code(), Err(StackErr::Mem));
        assert_eq!(EventReply::<Vec<u8>>::Abort.code(), Err(StackErr::Abrt));
        let busy = EventReply::Busy(vec![1u8, 2]);
        assert_eq!(busy.code(), Err(StackErr::Mem));
        assert_eq!(busy.into_refused(), Some(vec![1, 2]));
    }

    fn raw(kind: EventKind, err: i8) -> RawEvent<Vec<u8>> {
        RawEvent { kind: kind as u8, pcb: None, buf: None, len: 0, err }
    }

    #[test]
    fn decodes_raw_events() {
        let ev = StackEvent::from_raw(RawEvent { pcb: Some(PcbId(7)), ..raw(EventKind::Accept, 0) });
        assert!(matches!(ev, StackEvent::Accept { pcb: PcbId(7), err: Ok(()) }));

        let ev = StackEvent::from_raw(RawEvent { buf: Some(vec![1u8, 2, 3]), ..raw(EventKind::Recv, 0) });
        assert!(matches!(ev, StackEvent::Recv { buf: Some(ref b), err: Ok(()) } if b.len() == 3));

        let ev = StackEvent::from_raw(RawEvent { len: 512, ..raw(EventKind::Sent, 0) });
        assert!(matches!(ev, StackEvent::Sent { len: 512 }));

        let ev = StackEvent::from_raw(raw(EventKind::Connected, StackErr::Rte.raw()));
        assert!(matches!(ev, StackEvent::Connected { err: Err(StackErr::Rte) }));

        let ev = StackEvent::from_raw(raw(EventKind::Err, StackErr::Rst.raw()));
        assert!(matches!(ev, StackEvent::Err { err: StackErr::Rst }));

        // Undefined status codes and a success code on an error event.
        let ev = StackEvent::from_raw(raw(EventKind::Recv, -100));
        assert!(matches!(ev, StackEvent::Recv { buf: None, err: Err(StackErr::Arg) }));
        let ev = StackEvent::from_raw(raw(EventKind::Err, 0));
        assert!(matches!(ev, StackEvent::Err { err: StackErr::Arg }));
    }

    #[test]
    fn raw_replies() {
        assert_eq!(EventReply::<Vec<u8>>::Ok.into_raw(), (0, None));
        assert_eq!(EventReply::<Vec<u8>>::Refused.into_raw(), (StackErr::Mem.raw(), None));
        assert_eq!(EventReply::<Vec<u8>>::Abort.into_raw(), (StackErr::Abrt.raw(), None));
        assert_eq!(EventReply::Busy(vec![9u8]).into_raw(), (StackErr::Mem.raw(), Some(vec![9])));
    }

    #[test]
    #[should_panic(expected = "accept event without a control block")]
    fn accept_needs_a_control_block() {
        StackEvent::from_raw(raw(EventKind::Accept, 0));
    }

    #[test]
    #[should_panic(expected = "unknown stack event kind")]
    fn unknown_event_kind_is_fatal() {
        EventKind::from_raw(42);
    }
}
