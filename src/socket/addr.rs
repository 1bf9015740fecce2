/*!
 * Socket Addresses
 * sockaddr_un parsing for the abstract and logd namespaces
 */

use crate::core::errors::{SockResult, SocketError};
use serde::{Deserialize, Serialize};

/// AF_UNIX address family value.
pub const AF_UNIX: u16 = 1;

/// Byte offset of `sun_path` inside `sockaddr_un`.
pub const SUN_PATH_OFFSET: usize = 2;

/// Size of the `sun_path` array.
pub const SUN_PATH_LEN: usize = 108;

/// A parsed local-socket name.
///
/// A leading NUL in `sun_path` selects the abstract namespace; anything else
/// is a logd pathname. Neither form ever touches a filesystem, and abstract
/// names may contain embedded NULs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketAddr {
    Abstract(Vec<u8>),
    Pathname(Vec<u8>),
}

impl SocketAddr {
    /// Parse a raw `sockaddr_un` as handed through the syscall boundary.
    ///
    /// `bytes` must cover `sun_family` plus at least one `sun_path` byte.
    pub fn parse(bytes: &[u8]) -> SockResult<Self> {
        if bytes.len() < SUN_PATH_OFFSET + 1 {
            return Err(SocketError::InvalidArgument(
                "socket address too short".into(),
            ));
        }
        if bytes.len() > SUN_PATH_OFFSET + SUN_PATH_LEN {
            return Err(SocketError::InvalidArgument(
                "socket address too long".into(),
            ));
        }
        let family = u16::from_ne_bytes([bytes[0], bytes[1]]);
        if family != AF_UNIX {
            return Err(SocketError::InvalidArgument(format!(
                "address family {} is not AF_UNIX",
                family
            )));
        }

        let path = &bytes[SUN_PATH_OFFSET..];
        if path[0] != 0 {
            // Pathname form: NUL-terminated C string.
            let end = path.iter().position(|&b| b == 0).unwrap_or(path.len());
            Ok(SocketAddr::Pathname(path[..end].to_vec()))
        } else {
            // Abstract form: the remaining bytes verbatim, NULs included.
            Ok(SocketAddr::Abstract(path[1..].to_vec()))
        }
    }

    /// Build an abstract-namespace address.
    pub fn from_abstract(name: impl Into<Vec<u8>>) -> Self {
        SocketAddr::Abstract(name.into())
    }

    /// Build a logd pathname address.
    pub fn from_pathname(path: impl Into<Vec<u8>>) -> Self {
        SocketAddr::Pathname(path.into())
    }

    /// Encode back into `sockaddr_un` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SUN_PATH_OFFSET + 1 + self.name().len());
        out.extend_from_slice(&AF_UNIX.to_ne_bytes());
        match self {
            SocketAddr::Abstract(name) => {
                out.push(0);
                out.extend_from_slice(name);
            }
            SocketAddr::Pathname(path) => {
                out.extend_from_slice(path);
                out.push(0);
            }
        }
        out
    }

    /// The family-only address accept reports for its out-parameter.
    pub fn encode_family_only() -> Vec<u8> {
        AF_UNIX.to_ne_bytes().to_vec()
    }

    /// Registry key: the name bytes without namespace framing.
    pub fn name(&self) -> &[u8] {
        match self {
            SocketAddr::Abstract(name) => name,
            SocketAddr::Pathname(path) => path,
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, SocketAddr::Abstract(_))
    }

    /// Human-readable form for logging; abstract names get the conventional
    /// `@` prefix.
    pub fn display(&self) -> String {
        match self {
            SocketAddr::Abstract(name) => format!("@{}", String::from_utf8_lossy(name)),
            SocketAddr::Pathname(path) => String::from_utf8_lossy(path).into_owned(),
        }
    }
}
