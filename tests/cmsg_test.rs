/*!
 * Ancillary Data Tests
 * SCM_RIGHTS descriptor passing and SCM_CREDENTIALS delivery
 */

use pretty_assertions::assert_eq;
use sandbox_unix::socket::cmsg;
use sandbox_unix::socket::endpoint::{SOL_SOCKET, SO_PASSCRED, SO_PEERCRED};
use sandbox_unix::{MsgFlags, SocketType, StaticIdentity, Ucred, Vfs};
use std::sync::Arc;

#[test]
fn test_fd_passing_round_trip() {
    let vfs = Vfs::with_defaults();
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Stream).unwrap();
    let ((pipe_r_fd, _), (pipe_w_fd, pipe_w)) = vfs.pipe().unwrap();

    let control = cmsg::rights_message(&[pipe_r_fd, pipe_w_fd]);
    assert_eq!(
        a.send_msg(&vfs, &[b"x"], &control, MsgFlags::empty()).unwrap(),
        1
    );

    let mut payload = [0u8; 4];
    let mut ctrl_buf = vec![0u8; cmsg::space(8)];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut ctrl_buf, MsgFlags::empty())
        .unwrap();
    assert_eq!(outcome.bytes, 1);
    assert_eq!(payload[0], b'x');
    assert!(!outcome.flags.contains(MsgFlags::CTRUNC));

    let received = cmsg::rights_fds(&ctrl_buf[..outcome.control_len]);
    assert_eq!(received.len(), 2);
    // The received descriptors are fresh duplicates, not the originals.
    assert!(!received.contains(&pipe_r_fd));
    assert!(!received.contains(&pipe_w_fd));

    // And they actually work: write through the duplicate of the write end.
    let dup_w = vfs.resolve(received[1]).unwrap();
    assert!(Arc::ptr_eq(&dup_w, &pipe_w));
    dup_w.write(&vfs, b"via passed fd").unwrap();
}

#[test]
fn test_fd_passing_truncation_closes_overflow() {
    let vfs = Vfs::with_defaults();
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Stream).unwrap();
    let ((pipe_r_fd, _), (pipe_w_fd, _)) = vfs.pipe().unwrap();

    let before = vfs.open_descriptors();
    let control = cmsg::rights_message(&[pipe_r_fd, pipe_w_fd]);
    a.send_msg(&vfs, &[b"x"], &control, MsgFlags::empty()).unwrap();
    // Both descriptors were duplicated at send time.
    assert_eq!(vfs.open_descriptors(), before + 2);

    // Control room for exactly one descriptor.
    let mut payload = [0u8; 4];
    let mut ctrl_buf = vec![0u8; cmsg::length(4)];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut ctrl_buf, MsgFlags::empty())
        .unwrap();
    assert_eq!(outcome.bytes, 1);
    assert!(outcome.flags.contains(MsgFlags::CTRUNC));

    let received = cmsg::rights_fds(&ctrl_buf[..outcome.control_len]);
    assert_eq!(received.len(), 1);
    // The overflow descriptor was closed rather than leaked.
    assert_eq!(vfs.open_descriptors(), before + 1);
}

#[test]
fn test_fd_passing_no_room_at_all_drops_the_list() {
    let vfs = Vfs::with_defaults();
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Stream).unwrap();
    let ((pipe_r_fd, _), _) = vfs.pipe().unwrap();

    let before = vfs.open_descriptors();
    let control = cmsg::rights_message(&[pipe_r_fd]);
    a.send_msg(&vfs, &[b"x"], &control, MsgFlags::empty()).unwrap();
    assert_eq!(vfs.open_descriptors(), before + 1);

    // No control buffer on the receive side.
    let mut payload = [0u8; 4];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut [], MsgFlags::empty())
        .unwrap();
    assert_eq!(outcome.bytes, 1);
    assert!(outcome.flags.contains(MsgFlags::CTRUNC));
    assert_eq!(outcome.control_len, 0);
    // The whole list was dropped and closed.
    assert_eq!(vfs.open_descriptors(), before);
}

#[test]
fn test_empty_send_never_enqueues_control() {
    let vfs = Vfs::with_defaults();
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Stream).unwrap();
    let ((pipe_r_fd, _), _) = vfs.pipe().unwrap();

    let before = vfs.open_descriptors();
    let control = cmsg::rights_message(&[pipe_r_fd]);
    // Empty payload: nothing is delivered and no descriptors are duplicated.
    assert_eq!(
        a.send_msg(&vfs, &[], &control, MsgFlags::empty()).unwrap(),
        0
    );
    assert_eq!(vfs.open_descriptors(), before);

    // A later plain send arrives without ancillary data.
    a.write(&vfs, b"plain").unwrap();
    let mut payload = [0u8; 8];
    let mut ctrl_buf = vec![0u8; 64];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut ctrl_buf, MsgFlags::empty())
        .unwrap();
    assert_eq!(outcome.bytes, 5);
    assert_eq!(outcome.control_len, 0);
}

#[test]
fn test_rights_survive_over_datagram() {
    let vfs = Vfs::with_defaults();
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Datagram).unwrap();
    let ((pipe_r_fd, pipe_r), _) = vfs.pipe().unwrap();

    let control = cmsg::rights_message(&[pipe_r_fd]);
    a.send_msg(&vfs, &[b"datagram"], &control, MsgFlags::empty())
        .unwrap();

    let mut payload = [0u8; 16];
    let mut ctrl_buf = vec![0u8; 64];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut ctrl_buf, MsgFlags::empty())
        .unwrap();
    assert_eq!(outcome.bytes, 8);
    let received = cmsg::rights_fds(&ctrl_buf[..outcome.control_len]);
    assert_eq!(received.len(), 1);
    assert!(Arc::ptr_eq(&vfs.resolve(received[0]).unwrap(), &pipe_r));
}

#[test]
fn test_unknown_control_kinds_are_dropped_on_send() {
    let vfs = Vfs::with_defaults();
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Stream).unwrap();

    // SCM_CREDENTIALS on send is not a supported carry; only SCM_RIGHTS is.
    let control = cmsg::credentials_message(Ucred {
        pid: 99,
        uid: 99,
        gid: 99,
    });
    a.send_msg(&vfs, &[b"x"], &control, MsgFlags::empty()).unwrap();

    let mut payload = [0u8; 4];
    let mut ctrl_buf = vec![0u8; 64];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut ctrl_buf, MsgFlags::empty())
        .unwrap();
    assert_eq!(outcome.bytes, 1);
    assert_eq!(outcome.control_len, 0);
    assert!(!outcome.flags.contains(MsgFlags::CTRUNC));
}

#[test]
fn test_so_peercred_reflects_peer_identity() {
    let identity = StaticIdentity {
        pid: 42,
        uid: 1000,
        gid: 2000,
    };
    let vfs = Vfs::new(Default::default(), Arc::new(identity));
    let ((_, a), _) = vfs.socket_pair(SocketType::Stream).unwrap();

    let mut raw = [0u8; Ucred::WIRE_LEN];
    let len = a.get_option(SOL_SOCKET, SO_PEERCRED, &mut raw).unwrap();
    assert_eq!(len, Ucred::WIRE_LEN);
    let cred = Ucred::from_wire(&raw).unwrap();
    assert_eq!(
        cred,
        Ucred {
            pid: 42,
            uid: 1000,
            gid: 2000
        }
    );
}

#[test]
fn test_peercred_unset_before_connect() {
    let vfs = Vfs::with_defaults();
    let (_, sock) = vfs.socket(SocketType::Stream).unwrap();
    assert_eq!(sock.peer_cred(), Ucred::UNSET);

    let mut raw = [0u8; Ucred::WIRE_LEN];
    sock.get_option(SOL_SOCKET, SO_PEERCRED, &mut raw).unwrap();
    let cred = Ucred::from_wire(&raw).unwrap();
    assert_eq!(cred.pid, 0);
    assert_eq!(cred.uid, u32::MAX);
}

#[test]
fn test_passcred_attaches_credentials_on_recv() {
    let identity = StaticIdentity {
        pid: 7,
        uid: 70,
        gid: 700,
    };
    let vfs = Vfs::new(Default::default(), Arc::new(identity));
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Datagram).unwrap();

    // Receiver opts in via the option surface.
    b.set_option(SOL_SOCKET, SO_PASSCRED, &1i32.to_ne_bytes())
        .unwrap();

    a.write(&vfs, b"hello").unwrap();

    let mut payload = [0u8; 8];
    let mut ctrl_buf = vec![0u8; 64];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut ctrl_buf, MsgFlags::empty())
        .unwrap();
    assert_eq!(outcome.bytes, 5);

    let mut creds = None;
    for (level, ty, data) in cmsg::ControlMessages::new(&ctrl_buf[..outcome.control_len]) {
        if level == cmsg::SOL_SOCKET && ty == cmsg::SCM_CREDENTIALS {
            creds = Ucred::from_wire(data);
        }
    }
    assert_eq!(
        creds,
        Some(Ucred {
            pid: 7,
            uid: 70,
            gid: 700
        })
    );
}

#[test]
fn test_no_credentials_without_passcred() {
    let vfs = Vfs::with_defaults();
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Datagram).unwrap();

    a.write(&vfs, b"quiet").unwrap();
    let mut payload = [0u8; 8];
    let mut ctrl_buf = vec![0u8; 64];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut ctrl_buf, MsgFlags::empty())
        .unwrap();
    assert_eq!(outcome.control_len, 0);
}

#[test]
fn test_rights_and_credentials_together() {
    let vfs = Vfs::with_defaults();
    let ((_, a), (_, b)) = vfs.socket_pair(SocketType::Stream).unwrap();
    let ((pipe_r_fd, _), _) = vfs.pipe().unwrap();

    b.set_pass_cred(true);
    let control = cmsg::rights_message(&[pipe_r_fd]);
    a.send_msg(&vfs, &[b"x"], &control, MsgFlags::empty()).unwrap();

    let mut payload = [0u8; 4];
    let mut ctrl_buf = vec![0u8; 128];
    let outcome = b
        .recv_msg(&vfs, &mut [&mut payload], &mut ctrl_buf, MsgFlags::empty())
        .unwrap();

    let records: Vec<_> =
        cmsg::ControlMessages::new(&ctrl_buf[..outcome.control_len]).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].1, cmsg::SCM_RIGHTS);
    assert_eq!(records[1].1, cmsg::SCM_CREDENTIALS);
    // Stream credentials come from the cached peer credentials.
    let cred = Ucred::from_wire(records[1].2).unwrap();
    assert_eq!(cred.pid, 1);
}

#[test]
fn test_option_surface() {
    let vfs = Vfs::with_defaults();
    let ((_, a), _) = vfs.socket_pair(SocketType::SeqPacket).unwrap();

    // SO_TYPE round-trips the raw socket type.
    let mut raw = [0u8; 4];
    a.get_option(SOL_SOCKET, sandbox_unix::socket::endpoint::SO_TYPE, &mut raw)
        .unwrap();
    assert_eq!(i32::from_ne_bytes(raw), SocketType::SeqPacket.as_raw());

    // SO_PASSCRED round-trips as an int bool.
    a.set_option(SOL_SOCKET, SO_PASSCRED, &1i32.to_ne_bytes()).unwrap();
    a.get_option(SOL_SOCKET, SO_PASSCRED, &mut raw).unwrap();
    assert_eq!(i32::from_ne_bytes(raw), 1);

    // SO_RCVTIMEO round-trips through the timeval layout.
    let mut timeval = [0u8; 16];
    timeval[..8].copy_from_slice(&1i64.to_ne_bytes());
    timeval[8..].copy_from_slice(&500_000i64.to_ne_bytes());
    a.set_option(SOL_SOCKET, sandbox_unix::socket::endpoint::SO_RCVTIMEO, &timeval)
        .unwrap();
    assert_eq!(
        a.recv_timeout(),
        Some(std::time::Duration::from_micros(1_500_000))
    );
    let mut out = [0u8; 16];
    a.get_option(SOL_SOCKET, sandbox_unix::socket::endpoint::SO_RCVTIMEO, &mut out)
        .unwrap();
    assert_eq!(out, timeval);

    // Unknown options are EINVAL.
    let err = a.set_option(SOL_SOCKET, 9999, &raw).unwrap_err();
    assert_eq!(err.errno(), sandbox_unix::Errno::EINVAL);
}
