/*!
 * Socket Types
 * Common types, flags and stats for local sockets
 */

use crate::core::serde::is_zero_usize;
use crate::core::types::Size;
use crate::process::Ucred;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Local socket type (SOCK_STREAM / SOCK_DGRAM / SOCK_SEQPACKET)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketType {
    Stream,
    Datagram,
    SeqPacket,
}

impl SocketType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(SocketType::Stream),
            2 => Some(SocketType::Datagram),
            5 => Some(SocketType::SeqPacket),
            _ => None,
        }
    }

    pub const fn as_raw(&self) -> i32 {
        match self {
            SocketType::Stream => 1,
            SocketType::Datagram => 2,
            SocketType::SeqPacket => 5,
        }
    }

    /// Stream and seqpacket sockets handshake through listen/accept;
    /// datagram sockets do not.
    pub const fn is_connection_oriented(&self) -> bool {
        !matches!(self, SocketType::Datagram)
    }

    /// Datagram and seqpacket sockets preserve record boundaries.
    pub const fn preserves_boundaries(&self) -> bool {
        !matches!(self, SocketType::Stream)
    }
}

/// Data direction of an endpoint; pipes use the half-duplex variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamDir {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl StreamDir {
    pub const fn can_read(&self) -> bool {
        matches!(self, StreamDir::ReadOnly | StreamDir::ReadWrite)
    }

    pub const fn can_write(&self) -> bool {
        matches!(self, StreamDir::WriteOnly | StreamDir::ReadWrite)
    }
}

/// Endpoint state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    New,
    Connecting,
    Connected,
    Listening,
}

/// Per-endpoint open flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", default)]
pub struct SocketFlags {
    pub nonblocking: bool,
    pub close_on_exec: bool,
}

bitflags! {
    /// Poll readiness bitmask, Linux `poll(2)` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollEvents: i16 {
        const IN  = 0x001;
        const OUT = 0x004;
        const ERR = 0x008;
        const HUP = 0x010;
    }
}

bitflags! {
    /// sendmsg/recvmsg flags, Linux `MSG_*` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsgFlags: i32 {
        const CTRUNC   = 0x08;
        const TRUNC    = 0x20;
        const DONTWAIT = 0x40;
    }
}

/// One queued datagram: payload plus the sender's credentials.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub cred: Ucred,
}

/// What a recvmsg call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvOutcome {
    /// Payload bytes copied into the iovecs.
    pub bytes: usize,
    /// Control bytes written (msg_controllen on the way out).
    pub control_len: usize,
    /// MSG_TRUNC / MSG_CTRUNC as applicable.
    pub flags: MsgFlags,
}

impl RecvOutcome {
    pub(crate) fn bytes(bytes: usize) -> Self {
        Self {
            bytes,
            control_len: 0,
            flags: MsgFlags::empty(),
        }
    }
}

/// Endpoint introspection snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EndpointStats {
    pub socket_type: SocketType,
    pub dir: StreamDir,
    pub state: EndpointState,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub buffered: Size,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub queued_datagrams: usize,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub pending_connections: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_type_raw() {
        assert_eq!(SocketType::from_raw(1), Some(SocketType::Stream));
        assert_eq!(SocketType::from_raw(2), Some(SocketType::Datagram));
        assert_eq!(SocketType::from_raw(5), Some(SocketType::SeqPacket));
        assert_eq!(SocketType::from_raw(3), None);
        assert_eq!(SocketType::SeqPacket.as_raw(), 5);
    }

    #[test]
    fn test_stream_dir() {
        assert!(StreamDir::ReadOnly.can_read());
        assert!(!StreamDir::ReadOnly.can_write());
        assert!(StreamDir::WriteOnly.can_write());
        assert!(StreamDir::ReadWrite.can_read() && StreamDir::ReadWrite.can_write());
    }

    #[test]
    fn test_boundaries() {
        assert!(!SocketType::Stream.preserves_boundaries());
        assert!(SocketType::Datagram.preserves_boundaries());
        assert!(SocketType::SeqPacket.preserves_boundaries());
        assert!(SocketType::SeqPacket.is_connection_oriented());
        assert!(!SocketType::Datagram.is_connection_oriented());
    }

    #[test]
    fn test_stats_serialization() {
        let stats = EndpointStats {
            socket_type: SocketType::Stream,
            dir: StreamDir::ReadWrite,
            state: EndpointState::Connected,
            buffered: 0,
            queued_datagrams: 0,
            pending_connections: 0,
            bound: None,
        };
        let json = serde_json::to_string(&stats).unwrap();
        // Zero counts are skipped
        assert!(!json.contains("buffered"));
        assert!(json.contains("\"state\":\"connected\""));
    }
}
