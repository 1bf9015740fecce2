/*!
 * Core Types
 * Common type aliases used across the emulation
 */

/// Emulated process ID type
pub type Pid = u32;

/// Emulated user ID type
pub type Uid = u32;

/// Emulated group ID type
pub type Gid = u32;

/// File descriptor type
pub type Fd = u32;

/// Size type for buffer operations
pub type Size = usize;
