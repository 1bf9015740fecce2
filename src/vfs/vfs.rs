/*!
 * VFS Facade
 * Global lock, broadcast condition, descriptor table and name registries
 *
 * Every socket operation runs with the single VFS mutex held; blocking
 * operations park on the condition variable and every state change
 * broadcasts it, so waiters simply re-evaluate their predicates.
 */

use crate::core::errors::{SockResult, SocketError};
use crate::core::limits::Limits;
use crate::core::types::Fd;
use crate::process::{ProcessIdentity, StaticIdentity, Ucred};
use crate::socket::addr::SocketAddr;
use crate::socket::types::{PollEvents, SocketType, StreamDir};
use crate::socket::Endpoint;
use crate::vfs::registry::NameRegistry;
use crate::vfs::table::FdTable;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Instant;

/// State living under the global VFS lock.
pub struct VfsShared {
    pub(crate) abstract_ns: NameRegistry,
    pub(crate) logd_ns: NameRegistry,
}

impl VfsShared {
    /// The registry a parsed address belongs to.
    pub(crate) fn registry_mut(&mut self, addr: &SocketAddr) -> &mut NameRegistry {
        if addr.is_abstract() {
            &mut self.abstract_ns
        } else {
            &mut self.logd_ns
        }
    }

    pub(crate) fn lookup(&self, addr: &SocketAddr) -> Option<Arc<Endpoint>> {
        if addr.is_abstract() {
            self.abstract_ns.lookup(addr.name())
        } else {
            self.logd_ns.lookup(addr.name())
        }
    }
}

/// The virtual file system facade local sockets are built against.
///
/// Owns the process-wide mutex and condition variable (one lock, one
/// broadcast domain), the descriptor table, both name registries, the
/// injected process identity and the resource limits. Endpoints receive a
/// `&Vfs` on every operation rather than reaching for a global.
pub struct Vfs {
    shared: Mutex<VfsShared>,
    cond: Condvar,
    table: FdTable,
    identity: Arc<dyn ProcessIdentity>,
    limits: Limits,
}

impl Vfs {
    pub fn new(limits: Limits, identity: Arc<dyn ProcessIdentity>) -> Self {
        Self {
            shared: Mutex::new(VfsShared {
                abstract_ns: NameRegistry::new("abstract"),
                logd_ns: NameRegistry::new("logd"),
            }),
            cond: Condvar::new(),
            table: FdTable::new(limits.max_descriptors),
            identity,
            limits,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Limits::default(), Arc::new(StaticIdentity::default()))
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Snapshot of the emulated process identity.
    pub(crate) fn current_cred(&self) -> Ucred {
        Ucred::capture(&*self.identity)
    }

    // --- descriptor-level API -------------------------------------------

    /// Create an unconnected socket of the given type.
    pub fn socket(&self, socket_type: SocketType) -> SockResult<(Fd, Arc<Endpoint>)> {
        let endpoint = Endpoint::fresh(socket_type, self.current_cred(), &self.limits);
        let mut shared = self.lock_shared();
        let fd = self.add_stream_locked(&mut shared, &endpoint)?;
        log::debug!("created {} fd {}", endpoint.kind_name(), fd);
        Ok((fd, endpoint))
    }

    /// Create a connected pair of sockets of the given type.
    pub fn socket_pair(
        &self,
        socket_type: SocketType,
    ) -> SockResult<((Fd, Arc<Endpoint>), (Fd, Arc<Endpoint>))> {
        let a = Endpoint::connected(
            socket_type,
            StreamDir::ReadWrite,
            self.current_cred(),
            &self.limits,
        );
        let b = Endpoint::connected(
            socket_type,
            StreamDir::ReadWrite,
            self.current_cred(),
            &self.limits,
        );
        self.install_pair(a, b)
    }

    /// Create a pipe: a half-duplex stream pair, (read end, write end).
    pub fn pipe(&self) -> SockResult<((Fd, Arc<Endpoint>), (Fd, Arc<Endpoint>))> {
        let read_end = Endpoint::connected(
            SocketType::Stream,
            StreamDir::ReadOnly,
            self.current_cred(),
            &self.limits,
        );
        let write_end = Endpoint::connected(
            SocketType::Stream,
            StreamDir::WriteOnly,
            self.current_cred(),
            &self.limits,
        );
        self.install_pair(read_end, write_end)
    }

    fn install_pair(
        &self,
        a: Arc<Endpoint>,
        b: Arc<Endpoint>,
    ) -> SockResult<((Fd, Arc<Endpoint>), (Fd, Arc<Endpoint>))> {
        let mut shared = self.lock_shared();
        Endpoint::pair(&a, &b);
        let fd_a = self.add_stream_locked(&mut shared, &a)?;
        let fd_b = match self.add_stream_locked(&mut shared, &b) {
            Ok(fd) => fd,
            Err(e) => {
                let _ = self.close_locked(&mut shared, fd_a);
                return Err(e);
            }
        };
        log::debug!("created {} pair fds {}/{}", a.kind_name(), fd_a, fd_b);
        Ok(((fd_a, a), (fd_b, b)))
    }

    /// Resolve a descriptor without taking the VFS lock.
    pub fn resolve(&self, fd: Fd) -> Option<Arc<Endpoint>> {
        self.table.get(fd)
    }

    /// Duplicate a descriptor onto the lowest free slot.
    pub fn dup(&self, fd: Fd) -> SockResult<Fd> {
        let mut shared = self.lock_shared();
        self.dup_locked(&mut shared, fd, 0)
    }

    /// Close a descriptor; the endpoint's last close runs its teardown hook.
    pub fn close(&self, fd: Fd) -> SockResult<()> {
        let mut shared = self.lock_shared();
        self.close_locked(&mut shared, fd)
    }

    /// Number of live descriptors.
    pub fn open_descriptors(&self) -> usize {
        self.table.len()
    }

    /// Poll readiness of a descriptor.
    pub fn poll_events(&self, fd: Fd) -> SockResult<PollEvents> {
        let endpoint = self.resolve(fd).ok_or(SocketError::BadDescriptor)?;
        Ok(endpoint.poll_events(self))
    }

    // --- the locked collaborator contract -------------------------------
    //
    // The `&mut VfsShared` parameter on the *_locked operations is the
    // caller's proof that it holds the VFS lock; descriptor-table mutations
    // are only race-free under it.

    pub(crate) fn lock_shared(&self) -> MutexGuard<'_, VfsShared> {
        self.shared.lock()
    }

    /// Wake every waiter; predicates are cheap, so state changes always
    /// broadcast rather than signalling selectively.
    pub(crate) fn broadcast(&self) {
        self.cond.notify_all();
    }

    pub(crate) fn wait(&self, guard: &mut MutexGuard<'_, VfsShared>) {
        self.cond.wait(guard);
    }

    /// Returns true if the deadline passed without a wakeup.
    pub(crate) fn wait_deadline(
        &self,
        guard: &mut MutexGuard<'_, VfsShared>,
        deadline: Instant,
    ) -> bool {
        self.cond.wait_until(guard, deadline).timed_out()
    }

    pub(crate) fn add_stream_locked(
        &self,
        _shared: &mut VfsShared,
        endpoint: &Arc<Endpoint>,
    ) -> SockResult<Fd> {
        let fd = self.table.insert_lowest(0, Arc::clone(endpoint))?;
        endpoint.add_fd_ref();
        Ok(fd)
    }

    pub(crate) fn dup_locked(
        &self,
        _shared: &mut VfsShared,
        fd: Fd,
        min: Fd,
    ) -> SockResult<Fd> {
        let endpoint = self.table.get(fd).ok_or(SocketError::BadDescriptor)?;
        let new_fd = self.table.insert_lowest(min, Arc::clone(&endpoint))?;
        endpoint.add_fd_ref();
        Ok(new_fd)
    }

    pub(crate) fn close_locked(&self, shared: &mut VfsShared, fd: Fd) -> SockResult<()> {
        let endpoint = self.table.remove(fd).ok_or(SocketError::BadDescriptor)?;
        if endpoint.release_fd_ref() {
            endpoint.on_last_ref_locked(self, shared);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("open_descriptors", &self.table.len())
            .field("limits", &self.limits)
            .finish()
    }
}
