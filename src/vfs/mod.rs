/*!
 * VFS Module
 * The virtual-file-system facade local sockets plug into: one global lock,
 * one condition variable, the descriptor table and the two name registries
 */

pub mod registry;
pub mod table;
pub mod vfs;

// Re-export public API
pub use registry::NameRegistry;
pub use vfs::{Vfs, VfsShared};
