//! Sender worker: drains each peer's transmission queue for frames due for
//! (re)transmission, drains the session's ACK coalescing buffer, and emits
//! datagrams for both.

use std::net::UdpSocket;
use std::time::Instant;

use tracing::{debug, instrument, trace, warn};

use crate::session::Session;
use crate::wire::{InputMessageArray, WireMessage};

use super::default_retry_sleep;

/// Runs the send loop until `session.is_stopped()`, sleeping
/// [`default_retry_sleep`] between passes.
///
/// One pass: for every peer, batch whatever frames `due_for_send` returns
/// into a single `InputMessageArray` datagram (order within the batch
/// carries no meaning), then drain the ACK buffer and emit one `FrameAck`
/// datagram per peer with a pending ACK.
#[instrument(skip(socket, session))]
pub fn run(socket: &UdpSocket, session: &Session) {
    while !session.is_stopped() {
        send_due_frames(socket, session);
        send_pending_acks(socket, session);
        std::thread::sleep(default_retry_sleep());
    }

    debug!("sender worker stopped");
}

fn send_due_frames(socket: &UdpSocket, session: &Session) {
    let now = Instant::now();
    let rto = session.config().retransmission_timeout;

    for peer in session.peer_ids() {
        let Some(queue) = session.transmission_queue(peer) else {
            continue;
        };
        let due = queue.due_for_send(now, rto);
        if due.is_empty() {
            continue;
        }

        let message = WireMessage::InputBatch(InputMessageArray {
            sender_id: session.config().local_peer_id,
            frames: due,
        });
        send_to_peer(socket, session, peer, &message);
    }
}

fn send_pending_acks(socket: &UdpSocket, session: &Session) {
    for ack in session.drain_acks() {
        let peer = ack.sender_id();
        let message = WireMessage::Ack(ack);
        send_to_peer(socket, session, peer, &message);
    }
}

fn send_to_peer(
    socket: &UdpSocket,
    session: &Session,
    peer: crate::config::PeerId,
    message: &WireMessage,
) {
    let Some(addr) = session.config().peer_addrs.get(&peer).copied() else {
        warn!(%peer, "no socket address registered for peer, dropping outbound message");
        return;
    };

    let bytes = match message.encode_compressed() {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%peer, error = %err, "failed to encode outbound message");
            return;
        }
    };

    if bytes.len() > session.config().max_datagram_size {
        warn!(
            %peer,
            size = bytes.len(),
            max = session.config().max_datagram_size,
            "outbound datagram exceeds configured max size, sending anyway"
        );
    }

    match socket.send_to(&bytes, addr) {
        Ok(_) => trace!(%peer, %addr, bytes = bytes.len(), "datagram sent"),
        Err(err) => warn!(%peer, %addr, error = %err, "failed to send datagram"),
    }
}
