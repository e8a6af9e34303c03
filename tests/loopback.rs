//! End-to-end loopback: two sessions, real UDP sockets on localhost, driven
//! by the receiver/sender worker loops, exchanging several frames of input.
//!
//! Exercises the "manual two-peer loopback verification" touch point the
//! CLI demo binary is built for, without requiring a human at a terminal.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lockstep_arq::config::{PeerId, SessionConfig};
use lockstep_arq::frame::FrameInput;
use lockstep_arq::session::Session;
use lockstep_arq::worker::{bind_socket, receiver, sender};

fn bind_loopback() -> std::net::UdpSocket {
    // Bootstrap config just to reuse `bind_socket`'s read-timeout setup; its
    // peer fields are irrelevant to binding.
    let bootstrap = SessionConfig::new(PeerId(0), BTreeSet::new(), 0);
    bind_socket("127.0.0.1:0".parse().unwrap(), &bootstrap).expect("bind loopback socket")
}

fn session_config(local: u32, remote: u32, remote_addr: SocketAddr) -> SessionConfig {
    let mut config =
        SessionConfig::new(PeerId(local), BTreeSet::from([PeerId(remote)]), 0)
            .with_peer_addr(PeerId(remote), remote_addr);
    config.retransmission_timeout = Duration::from_millis(30);
    config.socket_read_timeout = Duration::from_millis(10);
    config
}

#[test]
fn two_peers_exchange_frames_reliably_over_udp() {
    const FRAME_COUNT: i64 = 5;

    let socket1 = bind_loopback();
    let socket2 = bind_loopback();
    let addr1 = socket1.local_addr().unwrap();
    let addr2 = socket2.local_addr().unwrap();

    let session1 = Arc::new(Session::new(session_config(1, 2, addr2)));
    let session2 = Arc::new(Session::new(session_config(2, 1, addr1)));

    let receiver1 = {
        let socket = socket1.try_clone().unwrap();
        let session = Arc::clone(&session1);
        std::thread::spawn(move || receiver::run(&socket, &session))
    };
    let receiver2 = {
        let socket = socket2.try_clone().unwrap();
        let session = Arc::clone(&session2);
        std::thread::spawn(move || receiver::run(&socket, &session))
    };
    let sender1 = {
        let socket = socket1.try_clone().unwrap();
        let session = Arc::clone(&session1);
        std::thread::spawn(move || sender::run(&socket, &session))
    };
    let sender2 = {
        let socket = socket2.try_clone().unwrap();
        let session = Arc::clone(&session2);
        std::thread::spawn(move || sender::run(&socket, &session))
    };

    let sim1 = {
        let session = Arc::clone(&session1);
        std::thread::spawn(move || {
            let mut delivered = Vec::new();
            for frame_number in 0..FRAME_COUNT {
                session
                    .transmission_queue(PeerId(2))
                    .unwrap()
                    .enqueue_local(FrameInput::new(frame_number, vec![1, frame_number as u8]))
                    .unwrap();
                let frames = session.tick().expect("tick should succeed");
                delivered.push(frames[&PeerId(2)].frame_number());
            }
            delivered
        })
    };

    let sim2 = {
        let session = Arc::clone(&session2);
        std::thread::spawn(move || {
            let mut delivered = Vec::new();
            for frame_number in 0..FRAME_COUNT {
                session
                    .transmission_queue(PeerId(1))
                    .unwrap()
                    .enqueue_local(FrameInput::new(frame_number, vec![2, frame_number as u8]))
                    .unwrap();
                let frames = session.tick().expect("tick should succeed");
                delivered.push(frames[&PeerId(1)].frame_number());
            }
            delivered
        })
    };

    let delivered1 = sim1.join().expect("session1 simulation thread panicked");
    let delivered2 = sim2.join().expect("session2 simulation thread panicked");

    assert_eq!(delivered1, (0..FRAME_COUNT).collect::<Vec<_>>());
    assert_eq!(delivered2, (0..FRAME_COUNT).collect::<Vec<_>>());

    session1.request_stop();
    session2.request_stop();
    for handle in [receiver1, receiver2, sender1, sender2] {
        handle.join().expect("worker thread panicked");
    }
}
