//! Socket layer configuration

use ksock_core::env::env_get;

/// Hard upper bound on backlog slots per listening socket. The backlog
/// is an inline array of this size; `backlog_capacity` selects how many
/// slots are usable.
pub const MAX_BACKLOG: usize = 16;

pub const DEFAULT_BACKLOG: usize = 4;
pub const DEFAULT_MAX_SOCKETS: usize = 256;
pub const DEFAULT_MAX_FILES: usize = 128;

/// Configuration for a `SocketLayer`
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Usable backlog slots per listening socket (1..=MAX_BACKLOG).
    /// Independent of the hint passed to `listen`.
    pub backlog_capacity: usize,

    /// Socket object cache capacity
    pub max_sockets: usize,

    /// Descriptor table capacity
    pub max_files: usize,

    /// Clamp for the backlog hint forwarded to the stack
    pub listen_hint_cap: u8,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            backlog_capacity: DEFAULT_BACKLOG,
            max_sockets: DEFAULT_MAX_SOCKETS,
            max_files: DEFAULT_MAX_FILES,
            listen_hint_cap: u8::MAX,
        }
    }
}

impl SocketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `KSOCK_BACKLOG`, `KSOCK_MAX_SOCKETS` and
    /// `KSOCK_MAX_FILES`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            backlog_capacity: env_get("KSOCK_BACKLOG", d.backlog_capacity),
            max_sockets: env_get("KSOCK_MAX_SOCKETS", d.max_sockets),
            max_files: env_get("KSOCK_MAX_FILES", d.max_files),
            listen_hint_cap: d.listen_hint_cap,
        }
    }

    pub fn backlog_capacity(mut self, n: usize) -> Self {
        self.backlog_capacity = n;
        self
    }

    pub fn max_sockets(mut self, n: usize) -> Self {
        self.max_sockets = n;
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.max_files = n;
        self
    }

    pub fn listen_hint_cap(mut self, cap: u8) -> Self {
        self.listen_hint_cap = cap;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.backlog_capacity == 0 {
            return Err("backlog_capacity must be at least 1");
        }
        if self.backlog_capacity > MAX_BACKLOG {
            return Err("backlog_capacity exceeds MAX_BACKLOG");
        }
        if self.max_sockets == 0 {
            return Err("max_sockets must be at least 1");
        }
        if self.max_sockets > u32::MAX as usize {
            return Err("max_sockets exceeds socket id range");
        }
        if self.max_files == 0 {
            return Err("max_files must be at least 1");
        }
        if self.max_files > i32::MAX as usize {
            return Err("max_files exceeds descriptor range");
        }
        if self.listen_hint_cap == 0 {
            return Err("listen_hint_cap must be at least 1");
        }
        Ok(())
    }
}
