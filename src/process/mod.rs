/*!
 * Process Identity
 * The process-emulator seam supplying pid/uid/gid for socket credentials
 */

use crate::core::types::{Gid, Pid, Uid};
use serde::{Deserialize, Serialize};

/// Source of the emulated process identity.
///
/// Injected into the VFS as a collaborator handle; every endpoint snapshots
/// the identity at creation time for SO_PEERCRED / SCM_CREDENTIALS.
pub trait ProcessIdentity: Send + Sync {
    fn pid(&self) -> Pid;
    fn uid(&self) -> Uid;
    fn gid(&self) -> Gid;
}

/// Fixed identity for embedders and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StaticIdentity {
    pub pid: Pid,
    pub uid: Uid,
    pub gid: Gid,
}

impl Default for StaticIdentity {
    fn default() -> Self {
        Self {
            pid: 1,
            uid: 0,
            gid: 0,
        }
    }
}

impl ProcessIdentity for StaticIdentity {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn uid(&self) -> Uid {
        self.uid
    }

    fn gid(&self) -> Gid {
        self.gid
    }
}

/// Socket-level credentials, the `struct ucred` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Ucred {
    pub pid: Pid,
    pub uid: Uid,
    pub gid: Gid,
}

impl Ucred {
    /// Wire size of `struct ucred` (pid, uid, gid as 32-bit fields).
    pub const WIRE_LEN: usize = 12;

    /// Credentials of a socket that has never been connected:
    /// pid 0, uid -1, gid -1.
    pub const UNSET: Ucred = Ucred {
        pid: 0,
        uid: Uid::MAX,
        gid: Gid::MAX,
    };

    /// Snapshot the current identity.
    pub fn capture(identity: &dyn ProcessIdentity) -> Self {
        Self {
            pid: identity.pid(),
            uid: identity.uid(),
            gid: identity.gid(),
        }
    }

    /// Native-endian `struct ucred` layout.
    pub fn to_wire(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..4].copy_from_slice(&(self.pid as i32).to_ne_bytes());
        out[4..8].copy_from_slice(&self.uid.to_ne_bytes());
        out[8..12].copy_from_slice(&self.gid.to_ne_bytes());
        out
    }

    /// Parse a native-endian `struct ucred`; `None` if the slice is short.
    pub fn from_wire(data: &[u8]) -> Option<Self> {
        if data.len() < Self::WIRE_LEN {
            return None;
        }
        let pid = i32::from_ne_bytes(data[0..4].try_into().ok()?) as Pid;
        let uid = Uid::from_ne_bytes(data[4..8].try_into().ok()?);
        let gid = Gid::from_ne_bytes(data[8..12].try_into().ok()?);
        Some(Self { pid, uid, gid })
    }
}

impl Default for Ucred {
    fn default() -> Self {
        Self::UNSET
    }
}
