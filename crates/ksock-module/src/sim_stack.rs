//! `SimStack`: in-memory `ProtocolStack` model.
//!
//! Control blocks are table entries with a small state machine, the send
//! window is a per-block counter, and nothing ever touches a wire. The
//! stack side of a conversation is driven by hand: helper methods such
//! as `incoming()`, `deliver()` or `abort()` update the model and return
//! the `StackEvent` a real stack would raise, together with the socket
//! registered through `set_arg()`. The caller feeds that pair to the
//! socket layer's dispatcher.
//!
//! Faults are injected per operation with `inject()`; the next call of
//! that operation fails with the given code.

use ksock_core::addr::SockAddrIn;
use ksock_core::error::{StackErr, StackResult};
use ksock_core::ids::{PcbId, SocketId};
use ksock_core::spinlock::SpinLock;
use ksock_core::stack::{PacketBuf, ProtocolStack, StackEvent};
use ksock_core::ktrace;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default send window of a fresh connection.
pub const SIM_DEFAULT_WINDOW: usize = 8192;

/// A received chunk. Dropping it counts as a release to the pool.
#[derive(Debug)]
pub struct SimChunk {
    data: Vec<u8>,
    released: Arc<AtomicUsize>,
}

impl SimChunk {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl PacketBuf for SimChunk {
    fn total_len(&self) -> usize {
        self.data.len()
    }

    fn copy_partial(&self, dst: &mut [u8], offset: usize) -> usize {
        self.data.copy_partial(dst, offset)
    }
}

impl Drop for SimChunk {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    Fresh,
    Bound,
    Listening,
    Connecting,
    Connected,
    Closed,
}

/// Operations that accept an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Bind,
    Listen,
    Connect,
    Write,
    Output,
    Close,
}

struct SimPcb {
    udp: bool,
    state: SimState,
    arg: Option<SocketId>,
    local: Option<SockAddrIn>,
    remote: Option<SockAddrIn>,
    window: usize,
    written: Vec<u8>,
    credited: usize,
    outputs: usize,
    backlog_hint: u8,
}

impl SimPcb {
    fn new(udp: bool, window: usize) -> Self {
        Self {
            udp,
            state: SimState::Fresh,
            arg: None,
            local: None,
            remote: None,
            window,
            written: Vec::new(),
            credited: 0,
            outputs: 0,
            backlog_hint: 0,
        }
    }

    fn live(&self) -> bool {
        self.state != SimState::Closed
    }
}

struct Inner {
    pcbs: HashMap<u64, SimPcb>,
    next_pcb: u64,
    faults: HashMap<SimOp, StackErr>,
    closes: usize,
    bad_closes: usize,
}

impl Inner {
    fn fault(&mut self, op: SimOp) -> StackResult<()> {
        match self.faults.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn live_count(&self) -> usize {
        self.pcbs.values().filter(|p| p.live()).count()
    }

    fn insert(&mut self, pcb: SimPcb) -> PcbId {
        self.next_pcb += 1;
        self.pcbs.insert(self.next_pcb, pcb);
        PcbId(self.next_pcb)
    }

    fn live_mut(&mut self, pcb: PcbId) -> Option<&mut SimPcb> {
        self.pcbs.get_mut(&pcb.0).filter(|p| p.live())
    }
}

pub struct SimStack {
    inner: SpinLock<Inner>,
    pcb_limit: usize,
    default_window: usize,
    released: Arc<AtomicUsize>,
}

impl Default for SimStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SimStack {
    pub fn new() -> Self {
        Self {
            inner: SpinLock::new(Inner {
                pcbs: HashMap::new(),
                next_pcb: 0,
                faults: HashMap::new(),
                closes: 0,
                bad_closes: 0,
            }),
            pcb_limit: usize::MAX,
            default_window: SIM_DEFAULT_WINDOW,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cap the number of live control blocks.
    pub fn with_pcb_limit(mut self, limit: usize) -> Self {
        self.pcb_limit = limit;
        self
    }

    /// Send window given to new connections.
    pub fn with_window(mut self, window: usize) -> Self {
        self.default_window = window;
        self
    }

    // ── Fault injection and knobs ──

    /// Make the next `op` fail with `err`.
    pub fn inject(&self, op: SimOp, err: StackErr) {
        self.inner.lock().faults.insert(op, err);
    }

    pub fn set_window(&self, pcb: PcbId, window: usize) {
        if let Some(p) = self.inner.lock().live_mut(pcb) {
            p.window = window;
        }
    }

    // ── Stack-side events ──

    /// Build a chunk owned by this stack's pool.
    pub fn chunk(&self, bytes: &[u8]) -> SimChunk {
        SimChunk {
            data: bytes.to_vec(),
            released: Arc::clone(&self.released),
        }
    }

    /// A peer at `remote` completed a handshake with `listener`. The new
    /// connection inherits the listener's socket argument.
    pub fn incoming(
        &self,
        listener: PcbId,
        remote: SockAddrIn,
    ) -> Option<(SocketId, StackEvent<SimChunk>)> {
        let mut inner = self.inner.lock();
        let (arg, local) = {
            let l = inner.live_mut(listener)?;
            if l.state != SimState::Listening {
                return None;
            }
            (l.arg?, l.local)
        };
        if inner.live_count() >= self.pcb_limit {
            return None;
        }
        let mut child = SimPcb::new(false, self.default_window);
        child.state = SimState::Connected;
        child.arg = Some(arg);
        child.local = local;
        child.remote = Some(remote);
        let pcb = inner.insert(child);
        ktrace!("sim: {} accepted {} from {}", listener, pcb, remote);
        Some((arg, StackEvent::Accept { pcb, err: Ok(()) }))
    }

    /// Finish an active open started with `connect()`.
    pub fn establish(
        &self,
        pcb: PcbId,
        result: StackResult<()>,
    ) -> Option<(SocketId, StackEvent<SimChunk>)> {
        let mut inner = self.inner.lock();
        let p = inner.live_mut(pcb)?;
        if p.state != SimState::Connecting {
            return None;
        }
        p.state = match result {
            Ok(()) => SimState::Connected,
            Err(_) => SimState::Fresh,
        };
        Some((p.arg?, StackEvent::Connected { err: result }))
    }

    /// Data arrived on `pcb`.
    pub fn deliver(&self, pcb: PcbId, bytes: &[u8]) -> Option<(SocketId, StackEvent<SimChunk>)> {
        let chunk = self.chunk(bytes);
        self.redeliver(pcb, chunk)
    }

    /// Offer a previously refused chunk again.
    pub fn redeliver(&self, pcb: PcbId, chunk: SimChunk) -> Option<(SocketId, StackEvent<SimChunk>)> {
        let arg = self.arg(pcb)?;
        Some((arg, StackEvent::Recv { buf: Some(chunk), err: Ok(()) }))
    }

    /// The peer closed its side.
    pub fn peer_close(&self, pcb: PcbId) -> Option<(SocketId, StackEvent<SimChunk>)> {
        let arg = self.arg(pcb)?;
        Some((arg, StackEvent::Recv { buf: None, err: Ok(()) }))
    }

    /// The peer acknowledged `len` bytes; the window grows back.
    pub fn ack(&self, pcb: PcbId, len: u16) -> Option<(SocketId, StackEvent<SimChunk>)> {
        let mut inner = self.inner.lock();
        let p = inner.live_mut(pcb)?;
        p.window += len as usize;
        Some((p.arg?, StackEvent::Sent { len }))
    }

    pub fn poll(&self, pcb: PcbId) -> Option<(SocketId, StackEvent<SimChunk>)> {
        Some((self.arg(pcb)?, StackEvent::Poll))
    }

    /// The connection died. The control block is freed before the event
    /// is raised, as a real stack does.
    pub fn abort(&self, pcb: PcbId, err: StackErr) -> Option<(SocketId, StackEvent<SimChunk>)> {
        let p = self.inner.lock().pcbs.remove(&pcb.0)?;
        if !p.live() {
            return None;
        }
        Some((p.arg?, StackEvent::Err { err }))
    }

    // ── Inspection ──

    pub fn state(&self, pcb: PcbId) -> Option<SimState> {
        self.inner.lock().pcbs.get(&pcb.0).map(|p| p.state)
    }

    pub fn arg(&self, pcb: PcbId) -> Option<SocketId> {
        self.inner.lock().live_mut(pcb)?.arg
    }

    pub fn local_addr(&self, pcb: PcbId) -> Option<SockAddrIn> {
        self.inner.lock().live_mut(pcb)?.local
    }

    /// Everything `write()` queued on `pcb`.
    pub fn written(&self, pcb: PcbId) -> Vec<u8> {
        self.inner.lock().pcbs.get(&pcb.0).map(|p| p.written.clone()).unwrap_or_default()
    }

    /// Drain what `write()` queued on `pcb` so far.
    pub fn take_written(&self, pcb: PcbId) -> Vec<u8> {
        self.inner
            .lock()
            .pcbs
            .get_mut(&pcb.0)
            .map(|p| std::mem::take(&mut p.written))
            .unwrap_or_default()
    }

    /// Bytes credited back through `recved()`.
    pub fn credited(&self, pcb: PcbId) -> usize {
        self.inner.lock().pcbs.get(&pcb.0).map_or(0, |p| p.credited)
    }

    pub fn outputs(&self, pcb: PcbId) -> usize {
        self.inner.lock().pcbs.get(&pcb.0).map_or(0, |p| p.outputs)
    }

    pub fn backlog_hint(&self, pcb: PcbId) -> Option<u8> {
        self.inner.lock().pcbs.get(&pcb.0).map(|p| p.backlog_hint)
    }

    pub fn live_pcbs(&self) -> usize {
        self.inner.lock().live_count()
    }

    /// Successful `close()`/`udp_remove()` calls.
    pub fn closes(&self) -> usize {
        self.inner.lock().closes
    }

    /// Close calls on dead or unknown control blocks.
    pub fn bad_closes(&self) -> usize {
        self.inner.lock().bad_closes
    }

    /// Chunks dropped by their holders.
    pub fn released_chunks(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    fn create(&self, udp: bool) -> Option<PcbId> {
        let mut inner = self.inner.lock();
        if inner.live_count() >= self.pcb_limit {
            return None;
        }
        Some(inner.insert(SimPcb::new(udp, self.default_window)))
    }

    fn remove(&self, pcb: PcbId, udp: bool) -> StackResult<()> {
        let mut inner = self.inner.lock();
        match inner.live_mut(pcb).filter(|p| p.udp == udp) {
            Some(p) => {
                p.state = SimState::Closed;
                inner.closes += 1;
                Ok(())
            }
            None => {
                inner.bad_closes += 1;
                Err(StackErr::Clsd)
            }
        }
    }
}

impl ProtocolStack for SimStack {
    type Buf = SimChunk;

    fn tcp_new(&self) -> Option<PcbId> {
        self.create(false)
    }

    fn udp_new(&self) -> Option<PcbId> {
        self.create(true)
    }

    fn set_arg(&self, pcb: PcbId, socket: SocketId) {
        if let Some(p) = self.inner.lock().live_mut(pcb) {
            p.arg = Some(socket);
        }
    }

    fn bind(&self, pcb: PcbId, local: SockAddrIn) -> StackResult<()> {
        let mut inner = self.inner.lock();
        inner.fault(SimOp::Bind)?;
        let udp = match inner.live_mut(pcb) {
            Some(p) if p.state == SimState::Fresh => p.udp,
            Some(_) => return Err(StackErr::Val),
            None => return Err(StackErr::Arg),
        };
        let taken = local.port != 0
            && inner.pcbs.iter().any(|(id, p)| {
                *id != pcb.0 && p.live() && p.udp == udp && p.local.map(|a| a.port) == Some(local.port)
            });
        if taken {
            return Err(StackErr::Use);
        }
        if let Some(p) = inner.live_mut(pcb) {
            p.local = Some(local);
            p.state = SimState::Bound;
        }
        Ok(())
    }

    fn listen(&self, pcb: PcbId, backlog: u8) -> StackResult<PcbId> {
        let mut inner = self.inner.lock();
        inner.fault(SimOp::Listen)?;
        match inner.live_mut(pcb) {
            Some(p) if !p.udp && matches!(p.state, SimState::Fresh | SimState::Bound) => {}
            Some(_) => return Err(StackErr::Clsd),
            None => return Err(StackErr::Arg),
        }
        // The full block is freed and a listening one takes its place.
        let old = inner.pcbs.remove(&pcb.0).ok_or(StackErr::Arg)?;
        let mut lpcb = SimPcb::new(false, 0);
        lpcb.state = SimState::Listening;
        lpcb.arg = old.arg;
        lpcb.local = old.local;
        lpcb.backlog_hint = backlog;
        let id = inner.insert(lpcb);
        ktrace!("sim: {} listening as {} (backlog {})", pcb, id, backlog);
        Ok(id)
    }

    fn connect(&self, pcb: PcbId, remote: SockAddrIn) -> StackResult<()> {
        let mut inner = self.inner.lock();
        inner.fault(SimOp::Connect)?;
        let p = inner.live_mut(pcb).ok_or(StackErr::Arg)?;
        match p.state {
            SimState::Fresh | SimState::Bound => {
                p.state = SimState::Connecting;
                p.remote = Some(remote);
                Ok(())
            }
            SimState::Connecting => Err(StackErr::Already),
            _ => Err(StackErr::IsConn),
        }
    }

    fn close(&self, pcb: PcbId) -> StackResult<()> {
        self.inner.lock().fault(SimOp::Close)?;
        self.remove(pcb, false)
    }

    fn udp_remove(&self, pcb: PcbId) {
        let _ = self.remove(pcb, true);
    }

    fn send_window(&self, pcb: PcbId) -> usize {
        match self.inner.lock().live_mut(pcb) {
            Some(p) if p.state == SimState::Connected => p.window,
            _ => 0,
        }
    }

    fn write(&self, pcb: PcbId, data: &[u8]) -> StackResult<()> {
        let mut inner = self.inner.lock();
        inner.fault(SimOp::Write)?;
        let p = inner.live_mut(pcb).ok_or(StackErr::Arg)?;
        if p.state != SimState::Connected {
            return Err(StackErr::Conn);
        }
        if data.len() > p.window {
            return Err(StackErr::Mem);
        }
        p.window -= data.len();
        p.written.extend_from_slice(data);
        Ok(())
    }

    fn output(&self, pcb: PcbId) -> StackResult<()> {
        let mut inner = self.inner.lock();
        inner.fault(SimOp::Output)?;
        let p = inner.live_mut(pcb).ok_or(StackErr::Arg)?;
        p.outputs += 1;
        Ok(())
    }

    fn recved(&self, pcb: PcbId, len: usize) {
        if let Some(p) = self.inner.lock().live_mut(pcb) {
            p.credited += len;
        }
    }

    fn remote_addr(&self, pcb: PcbId) -> Option<SockAddrIn> {
        self.inner.lock().live_mut(pcb)?.remote
    }
}
