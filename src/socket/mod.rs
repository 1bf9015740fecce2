/*!
 * Socket Module
 * The local-socket endpoint and its supporting pieces
 */

pub mod addr;
pub mod cmsg;
pub mod endpoint;
pub mod ring;
pub mod types;

// Re-export public API
pub use addr::SocketAddr;
pub use endpoint::Endpoint;
pub use ring::StreamRing;
pub use types::{
    Datagram, EndpointState, EndpointStats, MsgFlags, PollEvents, RecvOutcome, SocketFlags,
    SocketType, StreamDir,
};
