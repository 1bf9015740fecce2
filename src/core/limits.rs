/*!
 * Limits
 * Resource limits for the emulated socket layer
 */

use serde::{Deserialize, Serialize};

/// 224K is the default SO_SNDBUF/SO_RCVBUF in the linux kernel.
pub const STREAM_RING_CAPACITY: usize = 224 * 1024;

/// Default descriptor table capacity.
pub const DEFAULT_MAX_DESCRIPTORS: usize = 1024;

/// Upper bound on listen backlogs (SOMAXCONN).
pub const MAX_BACKLOG: usize = 4096;

/// Resource limits for a VFS instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Limits {
    pub max_descriptors: usize,
    pub stream_capacity: usize,
    pub max_backlog: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_descriptors: DEFAULT_MAX_DESCRIPTORS,
            stream_capacity: STREAM_RING_CAPACITY,
            max_backlog: MAX_BACKLOG,
        }
    }
}

impl Limits {
    /// Minimal limits for constrained embedders
    pub fn minimal() -> Self {
        Self {
            max_descriptors: 16,
            stream_capacity: 4096,
            max_backlog: 8,
        }
    }
}
