//! Receiver worker: drains the socket, demultiplexes by sender, routes input
//! messages to the matching [`ReceivingQueue`](crate::receiving_queue::ReceivingQueue)
//! and ACK messages to the matching
//! [`TransmissionQueue`](crate::transmission_queue::TransmissionQueue).

use std::net::UdpSocket;

use tracing::{debug, instrument, trace, warn};

use crate::session::Session;
use crate::wire::WireMessage;

use super::is_timeout;

/// Runs the receive loop until `session.is_stopped()`.
///
/// Each iteration blocks on `socket.recv_from` (bounded by the socket's read
/// timeout, see [`super::bind_socket`]) so the stop flag is re-checked
/// promptly rather than blocking forever: the worker exits its loop at the
/// next socket timeout after the session is stopped.
#[instrument(skip(socket, session))]
pub fn run(socket: &UdpSocket, session: &Session) {
    let mut buf = vec![0u8; session.config().max_datagram_size.max(1500)];

    while !session.is_stopped() {
        let (len, addr) = match socket.recv_from(&mut buf) {
            Ok(result) => result,
            Err(err) if is_timeout(&err) => continue,
            Err(err) => {
                warn!(error = %err, "receiver socket error");
                continue;
            }
        };

        let Some(from) = session.config().peer_for_addr(&addr) else {
            warn!(%addr, "datagram from unregistered peer address, dropping");
            continue;
        };

        match WireMessage::decode_compressed(&buf[..len])
            .or_else(|_| WireMessage::decode(&buf[..len]))
        {
            Ok(message) => handle_message(session, from, message),
            Err(err) => {
                warn!(%from, error = %err, "malformed datagram, dropping");
            }
        }
    }

    debug!("receiver worker stopped");
}

fn handle_message(session: &Session, from: crate::config::PeerId, message: WireMessage) {
    match message {
        WireMessage::Input(input) => {
            if input.sender_id != from {
                warn!(claimed = ?input.sender_id, actual = ?from, "sender_id mismatch, dropping as malformed");
                return;
            }
            route_frames(session, from, [input.frame]);
        }
        WireMessage::InputBatch(batch) => {
            if batch.sender_id != from {
                warn!(claimed = ?batch.sender_id, actual = ?from, "sender_id mismatch, dropping as malformed");
                return;
            }
            route_frames(session, from, batch.frames);
        }
        WireMessage::Ack(ack) => {
            if ack.sender_id() != session.config().local_peer_id {
                warn!(
                    claimed = ?ack.sender_id(),
                    local = ?session.config().local_peer_id,
                    "ack sender_id does not name us, dropping as malformed"
                );
                return;
            }
            match session.transmission_queue(from) {
                Some(queue) => queue.process_ack(&ack),
                None => warn!(%from, "ack from unconfigured peer, dropping"),
            }
        }
        WireMessage::KeepAlive => {
            trace!(%from, "keep-alive received");
        }
    }
}

fn route_frames(
    session: &Session,
    from: crate::config::PeerId,
    frames: impl IntoIterator<Item = crate::frame::FrameInput>,
) {
    match session.receiving_queue(from) {
        Some(queue) => {
            let ack = queue.push(frames);
            session.post_ack(ack);
        }
        None => warn!(%from, "input from unconfigured peer, dropping"),
    }
}
