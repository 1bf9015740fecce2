/*!
 * Sandbox Unix Sockets
 * In-process emulation of AF_UNIX sockets for sandboxed runtimes
 *
 * Provides stream, datagram and seqpacket local sockets (plus the
 * half-duplex pipe variants) without ever touching the host kernel's
 * socket API. Endpoints rendezvous through two in-memory name
 * registries (abstract and logd), exchange ancillary data
 * (SCM_RIGHTS, SCM_CREDENTIALS) and integrate with a surrounding
 * virtual file system that owns the single process-wide lock,
 * condition variable and descriptor table.
 */

pub mod core;
pub mod process;
pub mod socket;
pub mod vfs;

pub use crate::core::errors::{Errno, SockResult, SocketError};
pub use crate::core::limits::Limits;
pub use crate::process::{ProcessIdentity, StaticIdentity, Ucred};
pub use crate::socket::{
    Endpoint, EndpointState, EndpointStats, MsgFlags, PollEvents, RecvOutcome, SocketAddr,
    SocketType, StreamDir,
};
pub use crate::vfs::Vfs;
