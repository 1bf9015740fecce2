/*!
 * Error Types
 * Structured socket errors with an explicit POSIX errno mapping
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Socket operation result
///
/// # Must Use
/// Socket operations surface POSIX error conditions that callers must handle
#[must_use = "socket operations can fail and must be handled"]
pub type SockResult<T> = Result<T, SocketError>;

/// Raw POSIX errno value
///
/// The emulation's boundary contract is errno fidelity: every error a
/// translation layer hands back to emulated code maps onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Errno(pub i32);

impl Errno {
    pub const EAGAIN: Errno = Errno(11);
    pub const EBADF: Errno = Errno(9);
    pub const EINVAL: Errno = Errno(22);
    pub const EMFILE: Errno = Errno(24);
    pub const ESPIPE: Errno = Errno(29);
    pub const ENOSYS: Errno = Errno(38);
    pub const EOPNOTSUPP: Errno = Errno(95);
    pub const EADDRINUSE: Errno = Errno(98);
    pub const ECONNRESET: Errno = Errno(104);
    pub const EISCONN: Errno = Errno(106);
    pub const ECONNREFUSED: Errno = Errno(111);
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "errno {}", self.0)
    }
}

/// Socket errors with structured, type-safe error handling
///
/// One variant per row of the error taxonomy; `errno()` gives the value a
/// POSIX translation layer should report. Serialization uses the tagged
/// enum pattern for type safety.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum SocketError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already connected")]
    AlreadyConnected,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("operation not supported on this socket type")]
    OpNotSupported,

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("resource temporarily unavailable")]
    WouldBlock,

    #[error("bad file descriptor")]
    BadDescriptor,

    #[error("descriptor table full")]
    TableFull,

    #[error("illegal seek")]
    IllegalSeek,

    #[error("address already in use: {0}")]
    AddressInUse(String),
}

impl SocketError {
    /// The POSIX errno a translation layer should surface for this error.
    pub const fn errno(&self) -> Errno {
        match self {
            SocketError::InvalidArgument(_) => Errno::EINVAL,
            SocketError::AlreadyConnected => Errno::EISCONN,
            SocketError::Unsupported(_) => Errno::ENOSYS,
            SocketError::OpNotSupported => Errno::EOPNOTSUPP,
            SocketError::ConnectionRefused(_) => Errno::ECONNREFUSED,
            SocketError::ConnectionReset => Errno::ECONNRESET,
            SocketError::WouldBlock => Errno::EAGAIN,
            SocketError::BadDescriptor => Errno::EBADF,
            SocketError::TableFull => Errno::EMFILE,
            SocketError::IllegalSeek => Errno::ESPIPE,
            SocketError::AddressInUse(_) => Errno::EADDRINUSE,
        }
    }
}
