/*!
 * Stream Ring
 * Fixed-capacity byte ring backing stream-socket receive buffers
 */

use ringbuf::{traits::*, HeapRb};

/// Bounded receive ring for stream sockets.
///
/// Writes are partial when the ring is near-full and never block; readers
/// drain whatever is present. Capacity is fixed at construction.
pub struct StreamRing {
    rb: HeapRb<u8>,
    capacity: usize,
}

impl StreamRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            rb: HeapRb::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rb.occupied_len()
    }

    pub fn free(&self) -> usize {
        self.rb.vacant_len()
    }

    pub fn is_empty(&self) -> bool {
        self.rb.is_empty()
    }

    /// Write as many bytes as fit; returns the count actually written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.rb.push_slice(data)
    }

    /// Read up to `dst.len()` bytes; returns the count actually read.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.rb.pop_slice(dst)
    }
}

impl std::fmt::Debug for StreamRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRing")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
