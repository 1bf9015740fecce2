/*!
 * Descriptor Table
 * File-descriptor slots referencing socket endpoints
 */

use crate::core::errors::{SockResult, SocketError};
use crate::core::types::Fd;
use crate::socket::Endpoint;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

/// The descriptor table.
///
/// Reads (`get`) are lock-free so pollers can resolve descriptors without
/// the VFS lock; every mutation happens with the VFS lock held, which is
/// what keeps lowest-free allocation race-free.
pub(crate) struct FdTable {
    entries: DashMap<Fd, Arc<Endpoint>, RandomState>,
    max: usize,
}

impl FdTable {
    pub fn new(max: usize) -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            max,
        }
    }

    pub fn get(&self, fd: Fd) -> Option<Arc<Endpoint>> {
        self.entries.get(&fd).map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Allocate the lowest free descriptor at or above `min`.
    pub fn insert_lowest(&self, min: Fd, endpoint: Arc<Endpoint>) -> SockResult<Fd> {
        if self.entries.len() >= self.max {
            return Err(SocketError::TableFull);
        }
        for fd in min..self.max as Fd {
            if !self.entries.contains_key(&fd) {
                self.entries.insert(fd, endpoint);
                return Ok(fd);
            }
        }
        Err(SocketError::TableFull)
    }

    pub fn remove(&self, fd: Fd) -> Option<Arc<Endpoint>> {
        self.entries.remove(&fd).map(|(_, e)| e)
    }
}
