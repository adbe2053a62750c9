//! `SocketLayer`: the socket layer, generic over its collaborators.
//!
//! Syscall-side operations live in `lifecycle`, `connect`, `backlog`,
//! `recv` and `send`; the stack-side entry point in `event`; the
//! numbered surface in `syscall`. All of them are `impl` blocks on this
//! one type.

use ksock_core::{
    CompletionSink, Fd, FileTable, PcbId, Pid, ProcessContext, ProtocolStack, SockError,
    SockResult, SocketCache, SocketId,
};
use ksock_module::{CurrentProcess, DescriptorTable, OneshotCompletions, SimStack, SlabCache};

use crate::config::SocketConfig;
use crate::socket::Socket;

/// The stack's received-chunk type for platform `P`.
pub type BufOf<P> = <<P as Platform>::Stack as ProtocolStack>::Buf;

/// Bundles the collaborator types one kernel build plugs in.
pub trait Platform: 'static {
    type Stack: ProtocolStack;
    type Files: FileTable;
    type Procs: ProcessContext;
    type Completions: CompletionSink;
    type Cache: SocketCache<Socket<BufOf<Self>>>;
}

/// The in-memory platform: `SimStack` plus every default implementation.
pub struct SimPlatform;

impl Platform for SimPlatform {
    type Stack = SimStack;
    type Files = DescriptorTable;
    type Procs = CurrentProcess;
    type Completions = OneshotCompletions;
    type Cache = SlabCache<Socket<ksock_module::SimChunk>>;
}

pub struct SocketLayer<P: Platform> {
    pub(crate) stack: P::Stack,
    pub(crate) files: P::Files,
    pub(crate) procs: P::Procs,
    pub(crate) completions: P::Completions,
    pub(crate) cache: P::Cache,
    pub(crate) config: SocketConfig,
}

impl<P: Platform> SocketLayer<P> {
    /// Wire the collaborators together. The config is validated here, so
    /// every later operation can rely on its bounds.
    pub fn new(
        config: SocketConfig,
        stack: P::Stack,
        files: P::Files,
        procs: P::Procs,
        completions: P::Completions,
        cache: P::Cache,
    ) -> Result<Self, &'static str> {
        config.validate()?;
        Ok(Self {
            stack,
            files,
            procs,
            completions,
            cache,
            config,
        })
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub fn stack(&self) -> &P::Stack {
        &self.stack
    }

    pub fn files(&self) -> &P::Files {
        &self.files
    }

    pub fn procs(&self) -> &P::Procs {
        &self.procs
    }

    pub fn completions(&self) -> &P::Completions {
        &self.completions
    }

    /// Resolve a descriptor to its socket.
    pub(crate) fn lookup(&self, fd: Fd) -> SockResult<SocketId> {
        let desc = self.files.get(fd).ok_or(SockError::BadDescriptor)?;
        desc.socket_id().ok_or(SockError::NotSocket)
    }

    fn inspect<R>(&self, fd: Fd, f: impl FnOnce(&Socket<BufOf<P>>) -> R) -> Option<R> {
        let id = self.lookup(fd).ok()?;
        self.cache.with(id, |sock| f(sock))
    }

    // ── Introspection ──

    pub fn socket_of(&self, fd: Fd) -> Option<SocketId> {
        self.lookup(fd).ok()
    }

    pub fn pcb_of(&self, fd: Fd) -> Option<PcbId> {
        self.inspect(fd, |s| s.pcb).flatten()
    }

    pub fn backlog_len(&self, fd: Fd) -> usize {
        self.inspect(fd, |s| s.backlog.len()).unwrap_or(0)
    }

    /// Unread bytes of the pending receive chunk.
    pub fn pending_len(&self, fd: Fd) -> usize {
        self.inspect(fd, |s| s.recv.pending_len()).unwrap_or(0)
    }

    pub fn owner_pid(&self, fd: Fd) -> Pid {
        self.inspect(fd, |s| s.owner).unwrap_or(Pid::NONE)
    }

    pub fn is_listening(&self, fd: Fd) -> bool {
        self.inspect(fd, |s| s.listening).unwrap_or(false)
    }

    pub fn is_recv_closed(&self, fd: Fd) -> bool {
        self.inspect(fd, |s| s.recv.is_closed()).unwrap_or(false)
    }

    /// Socket objects alive, including unclaimed backlog children.
    pub fn live_sockets(&self) -> usize {
        self.cache.in_use()
    }
}

impl SocketLayer<SimPlatform> {
    /// A layer over `SimStack` and the default collaborators, with
    /// `Pid(1)` running.
    pub fn simulated(config: SocketConfig) -> Result<Self, &'static str> {
        Self::simulated_with(config, SimStack::new())
    }

    pub fn simulated_with(config: SocketConfig, stack: SimStack) -> Result<Self, &'static str> {
        let files = DescriptorTable::new(config.max_files);
        let cache = SlabCache::new("socket_cache", config.max_sockets);
        Self::new(
            config,
            stack,
            files,
            CurrentProcess::new(Pid(1)),
            OneshotCompletions::new(),
            cache,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksock_core::abi::{AF_INET, IPPROTO_TCP, SOCK_STREAM};
    use ksock_core::SockAddrIn;

    #[test]
    fn rejects_invalid_config() {
        for bad in [
            SocketConfig::new().listen_hint_cap(0),
            SocketConfig::new().backlog_capacity(0),
            SocketConfig::new().max_sockets(0),
            SocketConfig::new().max_files(0),
        ] {
            assert!(SocketLayer::simulated(bad.clone()).is_err());
            let built = SocketLayer::<SimPlatform>::new(
                bad,
                SimStack::new(),
                DescriptorTable::new(4),
                CurrentProcess::new(Pid(1)),
                OneshotCompletions::new(),
                SlabCache::new("socket_cache", 4),
            );
            assert!(built.is_err());
        }
    }

    #[test]
    fn smallest_hint_cap_still_listens() {
        let l = SocketLayer::simulated(SocketConfig::new().listen_hint_cap(1)).unwrap();
        let fd = l.create(AF_INET, SOCK_STREAM, IPPROTO_TCP).unwrap();
        l.bind(fd, SockAddrIn::any(8080)).unwrap();
        assert_eq!(l.listen(fd, 64), Ok(()));
        assert_eq!(l.stack().backlog_hint(l.pcb_of(fd).unwrap()), Some(1));
    }
}
