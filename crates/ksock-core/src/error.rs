//! KSOCK error types.
//!
//! Three layers of errors meet here:
//!
//! - `StackErr`: what the protocol stack reports, and what an event
//!   callback answers the stack with.
//! - `SockError`: what a socket operation reports to the syscall layer.
//! - `CompletionError`: misuse of the one-shot connect completion slot.

use std::fmt;

/// Error codes of the protocol stack.
///
/// The numbering matches the stack's own `err_t` values so raw codes can
/// cross the boundary unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum StackErr {
    /// Out of memory. As a callback reply: "busy, hold and retry".
    Mem = -1,
    Buf = -2,
    Timeout = -3,
    Rte = -4,
    InProgress = -5,
    Val = -6,
    WouldBlock = -7,
    Use = -8,
    Already = -9,
    IsConn = -10,
    Conn = -11,
    If = -12,
    /// Connection aborted. As a callback reply: "the control block is gone".
    Abrt = -13,
    Rst = -14,
    Clsd = -15,
    Arg = -16,
}

impl StackErr {
    /// Decode a raw stack code. `0` (success) and unknown codes yield `None`.
    pub fn from_raw(code: i8) -> Option<Self> {
        Some(match code {
            -1 => Self::Mem,
            -2 => Self::Buf,
            -3 => Self::Timeout,
            -4 => Self::Rte,
            -5 => Self::InProgress,
            -6 => Self::Val,
            -7 => Self::WouldBlock,
            -8 => Self::Use,
            -9 => Self::Already,
            -10 => Self::IsConn,
            -11 => Self::Conn,
            -12 => Self::If,
            -13 => Self::Abrt,
            -14 => Self::Rst,
            -15 => Self::Clsd,
            -16 => Self::Arg,
            _ => return None,
        })
    }

    #[inline]
    pub fn raw(self) -> i8 {
        self as i8
    }

    /// POSIX errno for this stack error.
    pub fn errno(self) -> i32 {
        match self {
            Self::Mem => libc::ENOMEM,
            Self::Buf => libc::ENOBUFS,
            Self::Timeout => libc::ETIMEDOUT,
            Self::Rte => libc::EHOSTUNREACH,
            Self::InProgress => libc::EINPROGRESS,
            Self::Val => libc::EINVAL,
            Self::WouldBlock => libc::EWOULDBLOCK,
            Self::Use => libc::EADDRINUSE,
            Self::Already => libc::EALREADY,
            Self::IsConn => libc::EISCONN,
            Self::Conn => libc::ENOTCONN,
            Self::If => libc::ENETDOWN,
            Self::Abrt => libc::ECONNABORTED,
            Self::Rst => libc::ECONNRESET,
            Self::Clsd => libc::ENOTCONN,
            Self::Arg => libc::EIO,
        }
    }
}

impl fmt::Display for StackErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            Self::Mem => "out of memory",
            Self::Buf => "buffer error",
            Self::Timeout => "timeout",
            Self::Rte => "routing problem",
            Self::InProgress => "operation in progress",
            Self::Val => "illegal value",
            Self::WouldBlock => "operation would block",
            Self::Use => "address in use",
            Self::Already => "already connecting",
            Self::IsConn => "already connected",
            Self::Conn => "not connected",
            Self::If => "low-level netif error",
            Self::Abrt => "connection aborted",
            Self::Rst => "connection reset",
            Self::Clsd => "connection closed",
            Self::Arg => "illegal argument",
        };
        write!(f, "stack: {} ({})", what, self.raw())
    }
}

impl std::error::Error for StackErr {}

pub type StackResult<T> = std::result::Result<T, StackErr>;

/// Errors reported by socket operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockError {
    /// Bad domain/type/protocol, operation not valid for this socket,
    /// allocation failure, or a stack rejection with no finer mapping.
    InvalidArgument,
    /// Nothing to do yet (no data, no connection, no send window).
    /// Not a failure: the caller retries or blocks.
    RetryLater,
    /// The receive side is closed and fully drained.
    EndOfStream,
    /// The descriptor number is not open.
    BadDescriptor,
    /// The descriptor is open but not backed by a socket.
    NotSocket,
    /// A stack rejection passed through with its own errno.
    Stack(StackErr),
}

impl SockError {
    /// POSIX errno, positive.
    pub fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument => libc::EINVAL,
            Self::RetryLater => libc::EAGAIN,
            Self::EndOfStream => libc::ENOTCONN,
            Self::BadDescriptor => libc::EBADF,
            Self::NotSocket => libc::ENOTSOCK,
            Self::Stack(e) => e.errno(),
        }
    }

    /// Value a syscall returns for this error: negative errno, except
    /// end-of-stream which reads as `0` bytes like POSIX end-of-file.
    pub fn syscall_ret(self) -> i64 {
        match self {
            Self::EndOfStream => 0,
            e => -(e.errno() as i64),
        }
    }

    #[inline]
    pub fn is_retry(self) -> bool {
        matches!(self, Self::RetryLater)
    }
}

impl fmt::Display for SockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::RetryLater => write!(f, "try again"),
            Self::EndOfStream => write!(f, "end of stream"),
            Self::BadDescriptor => write!(f, "bad descriptor"),
            Self::NotSocket => write!(f, "not a socket"),
            Self::Stack(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stack(e) => Some(e),
            _ => None,
        }
    }
}

pub type SockResult<T> = std::result::Result<T, SockError>;

/// Misuse of a connect completion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionError {
    /// The process already has a connect outstanding.
    AlreadyArmed(crate::Pid),
    /// No connect is outstanding for the process.
    NotArmed(crate::Pid),
    /// The slot already holds an undelivered outcome.
    Delivered(crate::Pid),
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyArmed(p) => write!(f, "{} already has a connect outstanding", p),
            Self::NotArmed(p) => write!(f, "{} has no connect outstanding", p),
            Self::Delivered(p) => write!(f, "{} already has an undelivered completion", p),
        }
    }
}

impl std::error::Error for CompletionError {}
