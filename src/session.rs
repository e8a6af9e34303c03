//! Session: owns the per-peer queue maps, the shared barrier, and the ACK
//! coalescing buffer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::ack::FrameAck;
use crate::barrier::CyclicBarrier;
use crate::config::{PeerId, SessionConfig};
use crate::error::{LockstepError, Result};
use crate::frame::FrameInput;
use crate::receiving_queue::ReceivingQueue;
use crate::transmission_queue::TransmissionQueue;

/// Owns every per-peer queue, the shared barrier, and the outgoing ACK
/// coalescing buffer for one lockstep session.
///
/// One [`ReceivingQueue`] and one [`TransmissionQueue`] per remote peer, all
/// sharing one [`CyclicBarrier`] sized to the peer count, so the session is
/// the N-peer star that one link is a degenerate case of.
pub struct Session {
    config: SessionConfig,
    barrier: Arc<CyclicBarrier>,
    receiving: BTreeMap<PeerId, Arc<ReceivingQueue>>,
    transmission: BTreeMap<PeerId, Arc<TransmissionQueue>>,
    /// Session-level ACK buffer: the receiver worker posts here, the sender
    /// worker drains it. Coalescing keeps, per peer, only the ACK with the
    /// highest `cumulative_ack` seen so far, so the most recently produced
    /// ACK per peer is what eventually reaches the remote transmission queue.
    ack_buffer: DashMap<PeerId, FrameAck>,
    stopped: AtomicBool,
}

impl Session {
    /// Builds a session for `config`, constructing one receiving and one
    /// transmission queue per configured remote peer, all sharing a single
    /// barrier sized to the peer count.
    pub fn new(config: SessionConfig) -> Self {
        let peer_count = config.peer_ids.len().max(1);
        let barrier = Arc::new(CyclicBarrier::new(peer_count));

        let mut receiving = BTreeMap::new();
        let mut transmission = BTreeMap::new();

        for &peer in &config.peer_ids {
            receiving.insert(
                peer,
                Arc::new(ReceivingQueue::new(peer, config.initial_frame, Arc::clone(&barrier))),
            );
            transmission.insert(peer, Arc::new(TransmissionQueue::new(config.initial_frame)));
        }

        Self {
            config,
            barrier,
            receiving,
            transmission,
            ack_buffer: DashMap::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// The session's fixed configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The shared cyclic barrier the simulation thread waits on.
    pub fn barrier(&self) -> &Arc<CyclicBarrier> {
        &self.barrier
    }

    /// The reorder buffer for `peer`'s incoming frame stream, if `peer` is a
    /// configured member of this session.
    pub fn receiving_queue(&self, peer: PeerId) -> Option<&Arc<ReceivingQueue>> {
        self.receiving.get(&peer)
    }

    /// The unacknowledged-frame retention store for frames sent to `peer`, if
    /// `peer` is a configured member of this session.
    pub fn transmission_queue(&self, peer: PeerId) -> Option<&Arc<TransmissionQueue>> {
        self.transmission.get(&peer)
    }

    /// Every configured remote peer id, in fixed ascending order. This is the
    /// order the simulation thread pops queues in once the barrier releases.
    pub fn peer_ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.receiving.keys().copied()
    }

    /// Posts `ack` to the coalescing buffer, keeping only the
    /// highest-`cumulative_ack` ACK seen per peer since the last drain.
    pub fn post_ack(&self, ack: FrameAck) {
        self.ack_buffer
            .entry(ack.sender_id())
            .and_modify(|existing| {
                if ack.cumulative_ack() >= existing.cumulative_ack() {
                    *existing = ack.clone();
                }
            })
            .or_insert(ack);
    }

    /// Drains and returns every coalesced ACK currently buffered, clearing
    /// the buffer. Called by the sender worker each pass.
    pub fn drain_acks(&self) -> Vec<FrameAck> {
        let keys: Vec<PeerId> = self.ack_buffer.iter().map(|e| *e.key()).collect();
        keys.into_iter()
            .filter_map(|k| self.ack_buffer.remove(&k).map(|(_, v)| v))
            .collect()
    }

    /// Blocks until every peer has contributed a frame for the current tick,
    /// then pops exactly one frame per peer in fixed peer order.
    ///
    /// # Errors
    /// Returns [`LockstepError::Interrupted`] if the session is cancelled
    /// while waiting. Returns [`LockstepError::Invariant`] if the barrier
    /// released but a peer's queue had nothing to pop. The barrier's
    /// per-peer single-countdown guarantee means this should never happen in
    /// a correctly driven session.
    pub fn tick(&self) -> Result<BTreeMap<PeerId, FrameInput>> {
        self.barrier.await_all()?;

        let mut frames = BTreeMap::new();
        for peer in self.peer_ids() {
            let queue = self
                .receiving
                .get(&peer)
                .expect("peer_ids() only yields keys present in `receiving`");
            match queue.pop() {
                Some(frame) => {
                    frames.insert(peer, frame);
                }
                None => {
                    return Err(LockstepError::Invariant(format!(
                        "barrier released but peer {peer} had no frame ready"
                    )));
                }
            }
        }

        debug!(tick_peers = frames.len(), "tick advanced");
        Ok(frames)
    }

    /// Signals every worker and the simulation thread to stop: sets the
    /// session-level stop flag and cancels the barrier so a blocked
    /// `tick`/`await_all` call returns immediately instead of waiting for a
    /// peer that will never send another frame.
    pub fn request_stop(&self) {
        warn!("session stop requested");
        self.stopped.store(true, Ordering::SeqCst);
        self.barrier.cancel();
    }

    /// Whether [`Self::request_stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn session(peers: &[u32]) -> Session {
        let ids: BTreeSet<PeerId> = peers.iter().copied().map(PeerId).collect();
        Session::new(SessionConfig::new(PeerId(0), ids, 0))
    }

    #[test]
    fn tick_waits_for_every_peer_then_pops_in_order() {
        let session = session(&[1, 2]);
        session
            .receiving_queue(PeerId(1))
            .unwrap()
            .push([FrameInput::new(0, vec![1])]);
        session
            .receiving_queue(PeerId(2))
            .unwrap()
            .push([FrameInput::new(0, vec![2])]);

        let frames = session.tick().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[&PeerId(1)].payload(), &[1]);
        assert_eq!(frames[&PeerId(2)].payload(), &[2]);
    }

    #[test]
    fn ack_buffer_coalesces_to_highest_cumulative_ack() {
        let session = session(&[1]);
        session.post_ack(FrameAck::new(PeerId(1), 2, vec![5]));
        session.post_ack(FrameAck::new(PeerId(1), 4, vec![]));

        let acks = session.drain_acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].cumulative_ack(), 4);
        assert!(session.drain_acks().is_empty());
    }

    #[test]
    fn request_stop_unblocks_tick() {
        let session = session(&[1]);
        session.request_stop();
        assert!(matches!(session.tick(), Err(LockstepError::Interrupted)));
        assert!(session.is_stopped());
    }
}
