/*!
 * Socket Endpoint
 * The local-socket object: state machine, rendezvous, data path and
 * ancillary-data plumbing
 *
 * Locking protocol: the mutable state of every endpoint sits in a private
 * mutex that is only ever taken while the caller holds the VFS global lock,
 * and never across a wait. The global lock is therefore the sole
 * serialization point; the per-endpoint mutex exists to give the borrow
 * checker a handle on interior mutation, and peer-to-peer access cannot
 * deadlock because at most one thread is past the global lock at a time.
 * Read-only snapshots (poll, stats, option reads) take only the endpoint
 * mutex.
 */

use crate::core::errors::{SockResult, SocketError};
use crate::core::limits::Limits;
use crate::core::types::Fd;
use crate::process::Ucred;
use crate::socket::addr::SocketAddr;
use crate::socket::cmsg;
use crate::socket::ring::StreamRing;
use crate::socket::types::{
    Datagram, EndpointState, EndpointStats, MsgFlags, PollEvents, RecvOutcome, SocketFlags,
    SocketType, StreamDir,
};
use crate::vfs::{Vfs, VfsShared};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Socket-level option names (SOL_SOCKET).
pub const SOL_SOCKET: i32 = cmsg::SOL_SOCKET;
pub const SO_TYPE: i32 = 3;
pub const SO_SNDBUF: i32 = 7;
pub const SO_RCVBUF: i32 = 8;
pub const SO_PASSCRED: i32 = 16;
pub const SO_PEERCRED: i32 = 17;
pub const SO_RCVTIMEO: i32 = 20;

/// Get input queue size.
pub const FIONREAD: u32 = 0x541B;

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

struct EndpointInner {
    state: EndpointState,
    flags: SocketFlags,
    /// Symmetric peer link; cleared on either side's last descriptor close.
    peer: Option<Arc<Endpoint>>,
    /// Bound name, abstract or logd, at most one per endpoint.
    bound: Option<SocketAddr>,
    /// Destination recorded by datagram connect for later sendmsg routing.
    target: Option<SocketAddr>,
    backlog: usize,
    /// Connectors parked in CONNECTING, waiting for accept.
    pending: VecDeque<Arc<Endpoint>>,
    /// Stream receive ring; absent for datagram sockets and write-only pipe
    /// ends.
    ring: Option<StreamRing>,
    datagrams: VecDeque<Datagram>,
    /// One descriptor list per sendmsg that carried SCM_RIGHTS, delivered
    /// in order alongside payload bytes.
    ctrl: VecDeque<Vec<Fd>>,
    peer_cred: Ucred,
    pass_cred: bool,
    recv_timeout: Option<Duration>,
    fd_refs: usize,
    closed: bool,
}

impl EndpointInner {
    fn has_data(&self, socket_type: SocketType) -> bool {
        match socket_type {
            SocketType::Stream => self.ring.as_ref().map(|r| !r.is_empty()).unwrap_or(false),
            _ => !self.datagrams.is_empty(),
        }
    }
}

/// One local-socket endpoint.
///
/// Created by `Vfs::socket`, `Vfs::socket_pair`, `Vfs::pipe`, or minted by
/// `accept`. A pair of endpoints with mutual peer links forms a connection;
/// a LISTENING endpoint never carries data and only pairs connectors with
/// freshly minted server endpoints.
pub struct Endpoint {
    id: u64,
    socket_type: SocketType,
    dir: StreamDir,
    my_cred: Ucred,
    buffer_capacity: usize,
    inner: Mutex<EndpointInner>,
}

impl Endpoint {
    fn make(
        socket_type: SocketType,
        dir: StreamDir,
        state: EndpointState,
        cred: Ucred,
        limits: &Limits,
    ) -> Arc<Self> {
        let ring = if socket_type == SocketType::Stream && dir.can_read() {
            Some(StreamRing::new(limits.stream_capacity))
        } else {
            None
        };
        Arc::new(Self {
            id: NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed),
            socket_type,
            dir,
            my_cred: cred,
            buffer_capacity: limits.stream_capacity,
            inner: Mutex::new(EndpointInner {
                state,
                flags: SocketFlags::default(),
                peer: None,
                bound: None,
                target: None,
                backlog: 0,
                pending: VecDeque::new(),
                ring,
                datagrams: VecDeque::new(),
                ctrl: VecDeque::new(),
                peer_cred: Ucred::UNSET,
                pass_cred: false,
                recv_timeout: None,
                fd_refs: 0,
                closed: false,
            }),
        })
    }

    /// A fresh unconnected socket. Datagram sockets have no handshake and
    /// are born CONNECTED.
    pub(crate) fn fresh(socket_type: SocketType, cred: Ucred, limits: &Limits) -> Arc<Self> {
        let state = if socket_type.is_connection_oriented() {
            EndpointState::New
        } else {
            EndpointState::Connected
        };
        Self::make(socket_type, StreamDir::ReadWrite, state, cred, limits)
    }

    /// A connected endpoint awaiting a peer link (socketpair halves, pipe
    /// ends, accept-minted servers).
    pub(crate) fn connected(
        socket_type: SocketType,
        dir: StreamDir,
        cred: Ucred,
        limits: &Limits,
    ) -> Arc<Self> {
        Self::make(socket_type, dir, EndpointState::Connected, cred, limits)
    }

    /// Mutually link two endpoints and stamp peer credentials. Callers hold
    /// the VFS lock.
    pub(crate) fn pair(a: &Arc<Self>, b: &Arc<Self>) {
        {
            let mut inner = a.inner.lock();
            inner.peer = Some(Arc::clone(b));
            inner.peer_cred = b.my_cred;
            inner.state = EndpointState::Connected;
        }
        {
            let mut inner = b.inner.lock();
            inner.peer = Some(Arc::clone(a));
            inner.peer_cred = a.my_cred;
            inner.state = EndpointState::Connected;
        }
    }

    // --- simple accessors ------------------------------------------------

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub fn direction(&self) -> StreamDir {
        self.dir
    }

    pub fn state(&self) -> EndpointState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().bound.clone()
    }

    pub fn peer_cred(&self) -> Ucred {
        self.inner.lock().peer_cred
    }

    pub fn pass_cred(&self) -> bool {
        self.inner.lock().pass_cred
    }

    pub fn set_pass_cred(&self, enabled: bool) {
        self.inner.lock().pass_cred = enabled;
    }

    pub fn recv_timeout(&self) -> Option<Duration> {
        self.inner.lock().recv_timeout
    }

    pub fn set_recv_timeout(&self, timeout: Option<Duration>) {
        self.inner.lock().recv_timeout = timeout;
    }

    pub fn is_nonblocking(&self) -> bool {
        self.inner.lock().flags.nonblocking
    }

    pub fn set_nonblocking(&self, nonblocking: bool) {
        self.inner.lock().flags.nonblocking = nonblocking;
    }

    pub fn close_on_exec(&self) -> bool {
        self.inner.lock().flags.close_on_exec
    }

    pub fn set_close_on_exec(&self, close_on_exec: bool) {
        self.inner.lock().flags.close_on_exec = close_on_exec;
    }

    pub fn kind_name(&self) -> &'static str {
        match (self.socket_type, self.dir) {
            (SocketType::Stream, StreamDir::ReadOnly) => "pipe_read",
            (SocketType::Stream, StreamDir::WriteOnly) => "pipe_write",
            (SocketType::Stream, _) => "unix_stream",
            (SocketType::Datagram, _) => "unix_dgram",
            (SocketType::SeqPacket, _) => "unix_seqpacket",
        }
    }

    pub fn stats(&self) -> EndpointStats {
        let inner = self.inner.lock();
        EndpointStats {
            socket_type: self.socket_type,
            dir: self.dir,
            state: inner.state,
            buffered: inner.ring.as_ref().map(|r| r.len()).unwrap_or(0),
            queued_datagrams: inner.datagrams.len(),
            pending_connections: inner.pending.len(),
            bound: inner.bound.as_ref().map(|a| a.display()),
        }
    }

    // --- rendezvous ------------------------------------------------------

    /// Bind to an abstract or logd name. Succeeds at most once per endpoint.
    pub fn bind(self: &Arc<Self>, vfs: &Vfs, addr: &[u8]) -> SockResult<()> {
        let addr = SocketAddr::parse(addr)?;
        let mut shared = vfs.lock_shared();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SocketError::BadDescriptor);
        }
        if inner.bound.is_some() {
            return Err(SocketError::InvalidArgument(
                "socket is already bound".into(),
            ));
        }
        shared.registry_mut(&addr).bind(addr.name(), Some(self))?;
        debug!("endpoint {} bound to {}", self.id, addr.display());
        inner.bound = Some(addr);
        Ok(())
    }

    /// Start listening. Requires a bound stream/seqpacket socket.
    pub fn listen(&self, vfs: &Vfs, backlog: usize) -> SockResult<()> {
        if self.socket_type == SocketType::Datagram {
            return Err(SocketError::OpNotSupported);
        }
        let _shared = vfs.lock_shared();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SocketError::BadDescriptor);
        }
        match inner.state {
            EndpointState::New => {
                if inner.bound.is_none() {
                    return Err(SocketError::InvalidArgument(
                        "listen on an unbound socket".into(),
                    ));
                }
                inner.backlog = backlog.min(vfs.limits().max_backlog);
                inner.state = EndpointState::Listening;
                debug!("endpoint {} listening, backlog {}", self.id, inner.backlog);
                Ok(())
            }
            EndpointState::Listening => {
                // Re-listen only adjusts the backlog.
                inner.backlog = backlog.min(vfs.limits().max_backlog);
                Ok(())
            }
            _ => Err(SocketError::InvalidArgument(
                "listen on a connected socket".into(),
            )),
        }
    }

    /// Connect to a bound name.
    ///
    /// Stream/seqpacket connect enqueues on the listener and blocks until an
    /// accept pairs it; datagram connect just records the routing target.
    pub fn connect(self: &Arc<Self>, vfs: &Vfs, addr: &[u8]) -> SockResult<()> {
        let mut shared = vfs.lock_shared();

        if self.socket_type == SocketType::Datagram {
            let addr = SocketAddr::parse(addr)?;
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(SocketError::BadDescriptor);
            }
            inner.target = Some(addr);
            return Ok(());
        }

        {
            let inner = self.inner.lock();
            if inner.closed {
                return Err(SocketError::BadDescriptor);
            }
            match inner.state {
                EndpointState::New => {}
                _ => return Err(SocketError::AlreadyConnected),
            }
            if inner.flags.nonblocking {
                return Err(SocketError::Unsupported(
                    "non-blocking connect on a local stream socket".into(),
                ));
            }
        }

        let addr = SocketAddr::parse(addr)?;
        let listener = shared
            .lookup(&addr)
            .ok_or_else(|| SocketError::ConnectionRefused(addr.display()))?;
        if listener.socket_type != self.socket_type {
            return Err(SocketError::ConnectionRefused(addr.display()));
        }
        {
            let mut listener_inner = listener.inner.lock();
            if listener_inner.closed || listener_inner.state != EndpointState::Listening {
                return Err(SocketError::ConnectionRefused(addr.display()));
            }
            if listener_inner.pending.len() >= listener_inner.backlog {
                return Err(SocketError::ConnectionRefused(addr.display()));
            }
            let was_empty = listener_inner.pending.is_empty();
            listener_inner.pending.push_back(Arc::clone(self));
            if was_empty {
                vfs.broadcast();
            }
        }
        self.inner.lock().state = EndpointState::Connecting;
        debug!("endpoint {} connecting to {}", self.id, addr.display());

        loop {
            let (state, closed) = {
                let inner = self.inner.lock();
                (inner.state, inner.closed)
            };
            if closed {
                return Err(SocketError::BadDescriptor);
            }
            if state != EndpointState::Connecting {
                break;
            }
            vfs.wait(&mut shared);
        }

        match self.state() {
            EndpointState::Connected => Ok(()),
            _ => Err(SocketError::ConnectionRefused(addr.display())),
        }
    }

    /// Accept a pending connection, minting a fresh server endpoint.
    ///
    /// Blocks until a connector arrives, bounded by SO_RCVTIMEO; fills
    /// `addr_out` with the family-only peer address when provided.
    pub fn accept(
        &self,
        vfs: &Vfs,
        addr_out: Option<&mut Vec<u8>>,
    ) -> SockResult<(Fd, Arc<Endpoint>)> {
        if self.socket_type == SocketType::Datagram {
            return Err(SocketError::OpNotSupported);
        }
        let mut shared = vfs.lock_shared();
        let deadline = {
            let inner = self.inner.lock();
            if inner.closed {
                return Err(SocketError::BadDescriptor);
            }
            if inner.state != EndpointState::Listening {
                return Err(SocketError::InvalidArgument(
                    "accept on a socket that is not listening".into(),
                ));
            }
            if inner.flags.nonblocking {
                return Err(SocketError::Unsupported(
                    "non-blocking accept on a local stream socket".into(),
                ));
            }
            inner.recv_timeout.map(|t| Instant::now() + t)
        };

        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(SocketError::BadDescriptor);
                }
                // Connectors that gave up (closed) are skipped and dropped.
                while let Some(head) = inner.pending.front().cloned() {
                    if head.is_closed() {
                        inner.pending.pop_front();
                    } else {
                        break;
                    }
                }
                if !inner.pending.is_empty() {
                    break;
                }
            }
            match deadline {
                Some(d) => {
                    if vfs.wait_deadline(&mut shared, d) {
                        return Err(SocketError::WouldBlock);
                    }
                }
                None => vfs.wait(&mut shared),
            }
        }

        // Mint and install the server side first so descriptor exhaustion
        // leaves the pending connection intact for a later accept.
        let server = Endpoint::connected(
            self.socket_type,
            StreamDir::ReadWrite,
            vfs.current_cred(),
            vfs.limits(),
        );
        let fd = vfs.add_stream_locked(&mut shared, &server)?;

        let client = self
            .inner
            .lock()
            .pending
            .pop_front()
            .expect("pending connector vanished under the VFS lock");
        Endpoint::pair(&client, &server);
        vfs.broadcast();
        debug!(
            "endpoint {} accepted connection: client {} paired with server {} (fd {})",
            self.id, client.id, server.id, fd
        );

        if let Some(out) = addr_out {
            *out = SocketAddr::encode_family_only();
        }
        Ok((fd, server))
    }

    // --- data path -------------------------------------------------------

    /// Scatter-gather send with optional control bytes.
    pub fn send_msg(
        &self,
        vfs: &Vfs,
        iov: &[&[u8]],
        control: &[u8],
        _flags: MsgFlags,
    ) -> SockResult<usize> {
        if !self.dir.can_write() {
            return Err(SocketError::BadDescriptor);
        }
        let mut shared = vfs.lock_shared();
        let (peer, target) = {
            let inner = self.inner.lock();
            if inner.closed {
                return Err(SocketError::BadDescriptor);
            }
            if self.socket_type.is_connection_oriented()
                && inner.state != EndpointState::Connected
            {
                return Err(SocketError::InvalidArgument(
                    "socket is not connected".into(),
                ));
            }
            (inner.peer.clone(), inner.target.clone())
        };

        if let Some(peer) = peer {
            return peer.deliver_locked(vfs, &mut shared, iov, control, self.my_cred);
        }

        if self.socket_type == SocketType::Datagram {
            let target = target.ok_or_else(|| {
                SocketError::ConnectionRefused("datagram socket has no destination".into())
            })?;
            let dest = shared
                .lookup(&target)
                .filter(|d| d.socket_type == SocketType::Datagram && !d.is_closed())
                .ok_or_else(|| SocketError::ConnectionRefused(target.display()))?;
            return dest.deliver_locked(vfs, &mut shared, iov, control, self.my_cred);
        }

        Err(SocketError::ConnectionReset)
    }

    /// Deliver a message into this endpoint's inbound storage. Runs on the
    /// receiver with the VFS lock held.
    fn deliver_locked(
        self: &Arc<Self>,
        vfs: &Vfs,
        shared: &mut VfsShared,
        iov: &[&[u8]],
        control: &[u8],
        sender: Ucred,
    ) -> SockResult<usize> {
        let mut attempted = 0usize;
        let mut delivered = 0usize;
        {
            let mut inner = self.inner.lock();
            match self.socket_type {
                SocketType::Stream => {
                    for chunk in iov {
                        attempted += chunk.len();
                        if let Some(ring) = inner.ring.as_mut() {
                            delivered += ring.write(chunk);
                        }
                    }
                }
                _ => {
                    // Record boundaries are preserved: one datagram per send.
                    if !iov.is_empty() {
                        let total = iov.iter().map(|c| c.len()).sum::<usize>();
                        let mut payload = Vec::with_capacity(total);
                        for chunk in iov {
                            payload.extend_from_slice(chunk);
                        }
                        attempted = total;
                        delivered = total;
                        inner.datagrams.push_back(Datagram {
                            payload,
                            cred: sender,
                        });
                    }
                }
            }
        }

        // Control data rides along only when payload bytes were delivered.
        // Descriptors are duplicated now, at send time; the sender keeps its
        // originals and the queue entry owns the copies until recvmsg hands
        // them over.
        if delivered > 0 && !control.is_empty() {
            let wire_fds = cmsg::rights_fds(control);
            if !wire_fds.is_empty() {
                let mut duped = Vec::with_capacity(wire_fds.len());
                for fd in &wire_fds {
                    match vfs.dup_locked(shared, *fd, 0) {
                        Ok(new_fd) => duped.push(new_fd),
                        Err(e) => {
                            warn!(
                                "dropping SCM_RIGHTS list: descriptor {} did not dup: {}",
                                fd, e
                            );
                            for fd in duped.drain(..).rev() {
                                let _ = vfs.close_locked(shared, fd);
                            }
                            break;
                        }
                    }
                }
                if !duped.is_empty() {
                    self.inner.lock().ctrl.push_back(duped);
                }
            }
        }

        if delivered > 0 {
            vfs.broadcast();
        }
        if delivered == 0 && attempted != 0 {
            return Err(SocketError::WouldBlock);
        }
        Ok(delivered)
    }

    /// Scatter-gather receive with optional control buffer.
    pub fn recv_msg(
        &self,
        vfs: &Vfs,
        iov: &mut [&mut [u8]],
        control: &mut [u8],
        flags: MsgFlags,
    ) -> SockResult<RecvOutcome> {
        if !self.dir.can_read() {
            return Err(SocketError::BadDescriptor);
        }
        let mut shared = vfs.lock_shared();
        let (blocking, deadline) = {
            let inner = self.inner.lock();
            if inner.closed {
                return Err(SocketError::BadDescriptor);
            }
            if self.socket_type.is_connection_oriented()
                && inner.state != EndpointState::Connected
            {
                return Err(SocketError::InvalidArgument(
                    "socket is not connected".into(),
                ));
            }
            (
                !inner.flags.nonblocking && !flags.contains(MsgFlags::DONTWAIT),
                inner.recv_timeout.map(|t| Instant::now() + t),
            )
        };

        if blocking {
            loop {
                let (wait_more, closed) = {
                    let inner = self.inner.lock();
                    (
                        inner.peer.is_some() && !inner.has_data(self.socket_type),
                        inner.closed,
                    )
                };
                if closed {
                    return Err(SocketError::BadDescriptor);
                }
                if !wait_more {
                    break;
                }
                match deadline {
                    Some(d) => {
                        if vfs.wait_deadline(&mut shared, d) {
                            return Err(SocketError::WouldBlock);
                        }
                    }
                    None => vfs.wait(&mut shared),
                }
            }
        }

        let mut out_flags = MsgFlags::empty();
        let mut bytes = 0usize;
        let mut dgram_cred: Option<Ucred> = None;
        let popped_ctrl;
        let peer;
        let peer_cred;
        let pass_cred;
        {
            let mut inner = self.inner.lock();
            match self.socket_type {
                SocketType::Stream => {
                    if let Some(ring) = inner.ring.as_mut() {
                        for buf in iov.iter_mut() {
                            if ring.is_empty() {
                                break;
                            }
                            bytes += ring.read(buf);
                        }
                    }
                }
                _ => {
                    if let Some(dgram) = inner.datagrams.pop_front() {
                        let mut offset = 0usize;
                        for buf in iov.iter_mut() {
                            if offset >= dgram.payload.len() {
                                break;
                            }
                            let n = (dgram.payload.len() - offset).min(buf.len());
                            buf[..n].copy_from_slice(&dgram.payload[offset..offset + n]);
                            offset += n;
                        }
                        if offset < dgram.payload.len() {
                            out_flags |= MsgFlags::TRUNC;
                        }
                        bytes = offset;
                        dgram_cred = Some(dgram.cred);
                    }
                }
            }
            // A recv that moved no payload returns no ancillary data either.
            popped_ctrl = if bytes > 0 {
                inner.ctrl.pop_front()
            } else {
                None
            };
            peer = inner.peer.clone();
            peer_cred = inner.peer_cred;
            pass_cred = inner.pass_cred;
        }

        let mut control_len = 0usize;
        if bytes > 0 {
            let mut writer = cmsg::ControlWriter::new(control);
            if let Some(mut fds) = popped_ctrl {
                let fit = cmsg::max_fds_for(writer.remaining()).min(fds.len());
                if fit < fds.len() {
                    out_flags |= MsgFlags::CTRUNC;
                    // Close the overflow so nothing leaks; last ones first,
                    // keeping the surviving prefix in send order.
                    while fds.len() > fit {
                        if let Some(fd) = fds.pop() {
                            let _ = vfs.close_locked(&mut shared, fd);
                        }
                    }
                }
                if !fds.is_empty() {
                    writer.push(cmsg::SOL_SOCKET, cmsg::SCM_RIGHTS, &cmsg::encode_fds(&fds));
                }
            }
            if pass_cred {
                let cred = match self.socket_type {
                    SocketType::Stream => peer_cred,
                    _ => dgram_cred.unwrap_or(peer_cred),
                };
                writer.push(cmsg::SOL_SOCKET, cmsg::SCM_CREDENTIALS, &cred.to_wire());
            }
            control_len = writer.finish();
        }

        if bytes > 0 {
            if peer.is_some() {
                // Readers freeing ring space may unblock the peer's writers.
                vfs.broadcast();
            }
            return Ok(RecvOutcome {
                bytes,
                control_len,
                flags: out_flags,
            });
        }
        if peer.is_none() && self.socket_type != SocketType::Datagram {
            // The other end is gone: EOF.
            return Ok(RecvOutcome::bytes(0));
        }
        Err(SocketError::WouldBlock)
    }

    // --- convenience wrappers (read/write/send/recv family) --------------

    pub fn send(&self, vfs: &Vfs, buf: &[u8], flags: MsgFlags) -> SockResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.send_msg(vfs, &[buf], &[], flags)
    }

    pub fn write(&self, vfs: &Vfs, buf: &[u8]) -> SockResult<usize> {
        self.send(vfs, buf, MsgFlags::empty())
    }

    /// sendto: local sockets reject explicit destination addresses.
    pub fn send_to(
        &self,
        vfs: &Vfs,
        buf: &[u8],
        flags: MsgFlags,
        dest: Option<&[u8]>,
    ) -> SockResult<usize> {
        if dest.is_some() {
            return Err(SocketError::InvalidArgument(
                "destination address on a connected local socket".into(),
            ));
        }
        self.send(vfs, buf, flags)
    }

    pub fn recv(&self, vfs: &Vfs, buf: &mut [u8], flags: MsgFlags) -> SockResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let outcome = self.recv_msg(vfs, &mut [buf], &mut [], flags)?;
        Ok(outcome.bytes)
    }

    pub fn read(&self, vfs: &Vfs, buf: &mut [u8]) -> SockResult<usize> {
        self.recv(vfs, buf, MsgFlags::empty())
    }

    /// recvfrom: local sockets never report a source address.
    pub fn recv_from(
        &self,
        vfs: &Vfs,
        buf: &mut [u8],
        flags: MsgFlags,
        addr_out: Option<&mut Vec<u8>>,
    ) -> SockResult<usize> {
        if addr_out.is_some() {
            return Err(SocketError::InvalidArgument(
                "source address requested on a local socket".into(),
            ));
        }
        self.recv(vfs, buf, flags)
    }

    /// Sockets do not seek.
    pub fn lseek(&self, _offset: i64, _whence: i32) -> SockResult<u64> {
        Err(SocketError::IllegalSeek)
    }

    // --- options, ioctl, polling ----------------------------------------

    pub fn set_option(&self, level: i32, name: i32, value: &[u8]) -> SockResult<()> {
        if level != SOL_SOCKET {
            return Err(SocketError::InvalidArgument(format!(
                "unsupported option level {}",
                level
            )));
        }
        match name {
            SO_PASSCRED => {
                let enabled = parse_int_opt(value)? != 0;
                self.set_pass_cred(enabled);
                Ok(())
            }
            SO_RCVTIMEO => {
                self.set_recv_timeout(parse_timeval_opt(value)?);
                Ok(())
            }
            _ => Err(SocketError::InvalidArgument(format!(
                "unsupported socket option {}",
                name
            ))),
        }
    }

    pub fn get_option(&self, level: i32, name: i32, value: &mut [u8]) -> SockResult<usize> {
        if level != SOL_SOCKET {
            return Err(SocketError::InvalidArgument(format!(
                "unsupported option level {}",
                level
            )));
        }
        match name {
            SO_PEERCRED => {
                if value.len() < Ucred::WIRE_LEN {
                    return Err(SocketError::InvalidArgument(
                        "short buffer for SO_PEERCRED".into(),
                    ));
                }
                value[..Ucred::WIRE_LEN].copy_from_slice(&self.peer_cred().to_wire());
                Ok(Ucred::WIRE_LEN)
            }
            SO_PASSCRED => write_int_opt(value, self.pass_cred() as i32),
            SO_RCVTIMEO => write_timeval_opt(value, self.recv_timeout()),
            SO_TYPE => write_int_opt(value, self.socket_type.as_raw()),
            SO_SNDBUF | SO_RCVBUF => {
                write_int_opt(value, self.buffer_capacity.min(i32::MAX as usize) as i32)
            }
            _ => Err(SocketError::InvalidArgument(format!(
                "unsupported socket option {}",
                name
            ))),
        }
    }

    pub fn ioctl(&self, request: u32) -> SockResult<i32> {
        match request {
            FIONREAD => {
                let inner = self.inner.lock();
                let available = match self.socket_type {
                    SocketType::Stream => inner.ring.as_ref().map(|r| r.len()).unwrap_or(0),
                    _ => inner
                        .datagrams
                        .front()
                        .map(|d| d.payload.len())
                        .unwrap_or(0),
                };
                Ok(available.min(i32::MAX as usize) as i32)
            }
            _ => Err(SocketError::InvalidArgument(format!(
                "unsupported ioctl 0x{:x}",
                request
            ))),
        }
    }

    /// Poll readiness, computed entirely from endpoint state.
    pub fn poll_events(&self, vfs: &Vfs) -> PollEvents {
        let _shared = vfs.lock_shared();
        let inner = self.inner.lock();
        match inner.state {
            EndpointState::New => PollEvents::OUT | PollEvents::HUP,
            EndpointState::Connecting => PollEvents::empty(),
            EndpointState::Listening => {
                if inner.pending.is_empty() {
                    PollEvents::OUT
                } else {
                    PollEvents::IN | PollEvents::OUT
                }
            }
            EndpointState::Connected => {
                let mut events = PollEvents::empty();
                match self.dir {
                    StreamDir::ReadOnly => {
                        if inner.has_data(self.socket_type) {
                            events |= PollEvents::IN;
                        }
                        if inner.peer.is_none() {
                            events |= PollEvents::HUP;
                        }
                    }
                    StreamDir::WriteOnly => match inner.peer.as_ref() {
                        None => events |= PollEvents::OUT | PollEvents::ERR,
                        Some(peer) => {
                            if peer.rx_space() > 0 {
                                events |= PollEvents::OUT;
                            }
                        }
                    },
                    StreamDir::ReadWrite => {
                        if Self::can_read(&inner, self.socket_type) {
                            events |= PollEvents::IN;
                        }
                        if Self::can_write(&inner, self.socket_type) {
                            events |= PollEvents::OUT;
                        }
                        if self.socket_type != SocketType::Datagram && inner.peer.is_none() {
                            events |= PollEvents::HUP;
                        }
                    }
                }
                events
            }
        }
    }

    /// select(2) read readiness: data queued, or EOF observable.
    pub fn is_read_ready(&self, vfs: &Vfs) -> bool {
        let _shared = vfs.lock_shared();
        let inner = self.inner.lock();
        Self::can_read(&inner, self.socket_type)
    }

    /// select(2) write readiness: the peer can absorb at least one byte.
    pub fn is_write_ready(&self, vfs: &Vfs) -> bool {
        let _shared = vfs.lock_shared();
        let inner = self.inner.lock();
        if !self.dir.can_write() {
            return false;
        }
        match inner.peer.as_ref() {
            None => false,
            Some(peer) => match self.socket_type {
                SocketType::Stream => peer.rx_space() > 0,
                _ => true,
            },
        }
    }

    /// select(2) exception readiness: the peer is gone.
    pub fn is_exception_ready(&self, vfs: &Vfs) -> bool {
        let _shared = vfs.lock_shared();
        self.inner.lock().peer.is_none()
    }

    fn can_read(inner: &EndpointInner, socket_type: SocketType) -> bool {
        if socket_type == SocketType::Datagram {
            inner.has_data(socket_type)
        } else {
            // A closed peer makes the EOF readable.
            inner.peer.is_none() || inner.has_data(socket_type)
        }
    }

    fn can_write(inner: &EndpointInner, socket_type: SocketType) -> bool {
        match inner.peer.as_ref() {
            // Writes will fail immediately, which counts as "won't block".
            None => true,
            Some(peer) => match socket_type {
                SocketType::Stream => peer.rx_space() > 0,
                _ => true,
            },
        }
    }

    /// Free space in this endpoint's receive ring.
    fn rx_space(&self) -> usize {
        self.inner
            .lock()
            .ring
            .as_ref()
            .map(|r| r.free())
            .unwrap_or(0)
    }

    // --- descriptor references and teardown ------------------------------

    pub(crate) fn add_fd_ref(&self) {
        self.inner.lock().fd_refs += 1;
    }

    /// Returns true when the last descriptor reference dropped.
    pub(crate) fn release_fd_ref(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.fd_refs = inner.fd_refs.saturating_sub(1);
        inner.fd_refs == 0
    }

    /// Last-descriptor teardown: sever the peer link on both sides, unbind
    /// names, fail waiting connectors, close undelivered SCM_RIGHTS
    /// descriptors and wake everything blocked on this endpoint.
    pub(crate) fn on_last_ref_locked(self: &Arc<Self>, vfs: &Vfs, shared: &mut VfsShared) {
        let (peer, bound, pending, ctrl) = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            (
                inner.peer.take(),
                inner.bound.take(),
                std::mem::take(&mut inner.pending),
                std::mem::take(&mut inner.ctrl),
            )
        };

        if let Some(peer) = peer {
            // Readers observing peer == None on a CONNECTED endpoint treat
            // it as EOF.
            peer.inner.lock().peer = None;
        }
        if let Some(addr) = bound {
            let _ = shared.registry_mut(&addr).bind(addr.name(), None);
        }
        for connector in pending {
            let mut inner = connector.inner.lock();
            if inner.state == EndpointState::Connecting {
                inner.state = EndpointState::New;
            }
        }
        for fds in ctrl {
            for fd in fds.into_iter().rev() {
                let _ = vfs.close_locked(shared, fd);
            }
        }
        vfs.broadcast();
        debug!("endpoint {} ({}) torn down", self.id, self.kind_name());
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Endpoint");
        s.field("id", &self.id)
            .field("kind", &self.kind_name());
        if let Some(inner) = self.inner.try_lock() {
            s.field("state", &inner.state)
                .field("fd_refs", &inner.fd_refs);
        }
        s.finish()
    }
}

fn parse_int_opt(value: &[u8]) -> SockResult<i32> {
    if value.len() < 4 {
        return Err(SocketError::InvalidArgument(
            "short socket option value".into(),
        ));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&value[..4]);
    Ok(i32::from_ne_bytes(raw))
}

fn write_int_opt(value: &mut [u8], v: i32) -> SockResult<usize> {
    if value.len() < 4 {
        return Err(SocketError::InvalidArgument(
            "short socket option buffer".into(),
        ));
    }
    value[..4].copy_from_slice(&v.to_ne_bytes());
    Ok(4)
}

/// 64-bit `struct timeval`: i64 seconds, i64 microseconds. A zero value
/// clears the timeout.
fn parse_timeval_opt(value: &[u8]) -> SockResult<Option<Duration>> {
    if value.len() < 16 {
        return Err(SocketError::InvalidArgument(
            "short timeval for SO_RCVTIMEO".into(),
        ));
    }
    let mut sec_raw = [0u8; 8];
    let mut usec_raw = [0u8; 8];
    sec_raw.copy_from_slice(&value[..8]);
    usec_raw.copy_from_slice(&value[8..16]);
    let sec = i64::from_ne_bytes(sec_raw);
    let usec = i64::from_ne_bytes(usec_raw);
    if sec < 0 || !(0..1_000_000).contains(&usec) {
        return Err(SocketError::InvalidArgument("invalid timeval".into()));
    }
    let total_us = (sec as u64)
        .saturating_mul(1_000_000)
        .saturating_add(usec as u64);
    if total_us == 0 {
        Ok(None)
    } else {
        Ok(Some(Duration::from_micros(total_us)))
    }
}

fn write_timeval_opt(value: &mut [u8], timeout: Option<Duration>) -> SockResult<usize> {
    if value.len() < 16 {
        return Err(SocketError::InvalidArgument(
            "short buffer for SO_RCVTIMEO".into(),
        ));
    }
    let us = timeout.map(|t| t.as_micros() as u64).unwrap_or(0);
    value[..8].copy_from_slice(&((us / 1_000_000) as i64).to_ne_bytes());
    value[8..16].copy_from_slice(&((us % 1_000_000) as i64).to_ne_bytes());
    Ok(16)
}
