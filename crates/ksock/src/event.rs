//! Stack event dispatch.
//!
//! The single entry point the stack calls, from its own context, with
//! the socket it registered through `set_arg`. Every event runs under the
//! target socket's lock; the reply tells the stack whether to keep going,
//! hold and retry (`Busy`, `Refused`), or forget the control block
//! (`Abort`).
//!
//! | Event     | Action                                         | Reply            |
//! |-----------|------------------------------------------------|------------------|
//! | Accept    | queue a child socket in the backlog            | Ok / Refused     |
//! | Sent      | nothing                                        | Ok               |
//! | Recv      | store the chunk, or mark the receive side done | Ok / Busy        |
//! | Connected | deliver the outcome to the connecting process  | Ok               |
//! | Poll      | nothing                                        | Ok               |
//! | Err       | drop the dead handle, close the receive side   | Abort            |

use ksock_core::{
    kdebug, ktrace, kwarn, EventReply, PacketBuf, PcbId, Pid, ProtocolStack, RawEvent,
    SockAddrIn, SocketCache, SocketId, StackErr, StackEvent, StackResult,
};

use crate::backlog::Pending;
use crate::layer::{BufOf, Platform, SocketLayer};
use crate::socket::Socket;

impl<P: Platform> SocketLayer<P> {
    /// Handle one event for `id`.
    pub fn dispatch(&self, id: SocketId, event: StackEvent<BufOf<P>>) -> EventReply<BufOf<P>> {
        ktrace!("{}: event {:?}", id, event.kind());
        match event {
            StackEvent::Accept { pcb, err } => self.on_accept(id, pcb, err),
            StackEvent::Sent { len } => {
                ktrace!("{}: {} bytes acknowledged", id, len);
                EventReply::Ok
            }
            StackEvent::Recv { buf, err } => self.on_recv(id, buf, err),
            StackEvent::Connected { err } => self.on_connected(id, err),
            StackEvent::Poll => EventReply::Ok,
            StackEvent::Err { err } => self.on_error(id, err),
        }
    }

    /// Entry point for a stack's event hook: decode, dispatch, and encode
    /// the reply. A refused chunk comes back with the status code.
    ///
    /// # Panics
    ///
    /// On an event the stack's contract does not define.
    pub fn dispatch_raw(&self, id: SocketId, raw: RawEvent<BufOf<P>>) -> (i8, Option<BufOf<P>>) {
        self.dispatch(id, StackEvent::from_raw(raw)).into_raw()
    }

    fn on_accept(&self, id: SocketId, pcb: PcbId, err: StackResult<()>) -> EventReply<BufOf<P>> {
        if err.is_err() {
            return EventReply::Ok;
        }
        let queued = self.cache.with(id, |parent| {
            if !parent.listening {
                kwarn!("{}: connection {} on a socket that is not listening", id, pcb);
                return false;
            }
            if parent.backlog.is_full() {
                kdebug!("{}: backlog full, refusing {}", id, pcb);
                return false;
            }
            let peer = self.stack.remote_addr(pcb).unwrap_or(SockAddrIn::UNSPECIFIED);
            let child = match self.cache.alloc(Socket::child_of(parent, pcb, peer)) {
                Some(child) => child,
                None => {
                    kdebug!("{}: no socket object for {}", id, pcb);
                    return false;
                }
            };
            self.stack.set_arg(pcb, child);
            // Room was checked above under the same lock.
            let _ = parent.backlog.insert(Pending { socket: child, peer });
            kdebug!("{}: queued {} from {} ({})", id, child, peer, pcb);
            true
        });
        match queued {
            Some(true) => EventReply::Ok,
            Some(false) => EventReply::Refused,
            None => {
                kwarn!("{}: accept event for a freed socket", id);
                EventReply::Refused
            }
        }
    }

    fn on_recv(
        &self,
        id: SocketId,
        buf: Option<BufOf<P>>,
        err: StackResult<()>,
    ) -> EventReply<BufOf<P>> {
        let reply = self.cache.with(id, |sock| {
            let chunk = match (buf, err) {
                (Some(chunk), Ok(())) => chunk,
                (_, err) => {
                    // Any chunk delivered alongside an error is dropped here.
                    kdebug!("{}: receive side closed ({:?})", id, err);
                    sock.recv.mark_closed();
                    return EventReply::Ok;
                }
            };
            if sock.recv.has_chunk() {
                kdebug!("{}: busy, holding back {} bytes", id, chunk.total_len());
                return EventReply::Busy(chunk);
            }
            let len = chunk.total_len();
            // Window credit is given on arrival, not on read.
            if let Some(pcb) = sock.pcb {
                self.stack.recved(pcb, len);
            }
            ktrace!("{}: stored {} bytes", id, len);
            match sock.recv.offer(chunk) {
                Ok(()) => EventReply::Ok,
                Err(chunk) => EventReply::Busy(chunk),
            }
        });
        reply.unwrap_or_else(|| {
            kwarn!("{}: data for a freed socket", id);
            EventReply::Ok
        })
    }

    fn on_connected(&self, id: SocketId, err: StackResult<()>) -> EventReply<BufOf<P>> {
        let owner = self
            .cache
            .with(id, |sock| std::mem::replace(&mut sock.owner, Pid::NONE));
        match owner {
            Some(pid) if !pid.is_none() => self.finish_connect(id, pid, err),
            Some(_) => panic!("ksock: {}: connect completion without an outstanding connect", id),
            None => kwarn!("{}: connect completion for a freed socket", id),
        }
        EventReply::Ok
    }

    fn on_error(&self, id: SocketId, err: StackErr) -> EventReply<BufOf<P>> {
        let owner = self.cache.with(id, |sock| {
            sock.pcb = None;
            sock.recv.mark_closed();
            std::mem::replace(&mut sock.owner, Pid::NONE)
        });
        kwarn!("{}: connection lost: {}", id, err);
        if let Some(pid) = owner.filter(|p| !p.is_none()) {
            // The attempt died before it completed.
            self.finish_connect(id, pid, Err(err));
        }
        EventReply::Abort
    }
}
