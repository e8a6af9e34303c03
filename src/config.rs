//! Peer identity and session configuration.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum serialized datagram size assumed when a [`SessionConfig`] is built
/// with [`SessionConfig::new`], sized for a small post-compression payload.
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 300;

/// Stable integer identity of a session participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Session-wide configuration, fixed for the lifetime of a [`crate::session::Session`].
///
/// A session cannot address real datagrams to a peer without knowing its
/// socket address, so `peer_addrs` holds that mapping. The receiver worker
/// uses this table, not a wire message's self-reported `sender_id`, to
/// determine which remote physically sent a given datagram.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The frame number at which every peer's stream begins.
    pub initial_frame: i64,
    /// This process's own peer id.
    pub local_peer_id: PeerId,
    /// The fixed set of remote peers in this session (excludes `local_peer_id`).
    pub peer_ids: BTreeSet<PeerId>,
    /// Socket address to reach each remote peer at.
    pub peer_addrs: std::collections::BTreeMap<PeerId, SocketAddr>,
    /// Advisory sizing hint for the reorder buffer; never a hard ceiling.
    pub buffer_size_hint: usize,
    /// Simulation tick rate, informational (affects only host-side pacing).
    pub tick_rate_hz: u32,
    /// Duration after which an unacknowledged frame is eligible for retransmission.
    pub retransmission_timeout: Duration,
    /// Read timeout applied to the receiver worker's socket, bounding how long a
    /// stop-flag check can be delayed.
    pub socket_read_timeout: Duration,
    /// Maximum serialized (post-compression) datagram size.
    pub max_datagram_size: usize,
}

impl SessionConfig {
    /// Builds a config for `local_peer_id` participating alongside `peer_ids`,
    /// starting at `initial_frame`, with the remaining fields at sensible defaults.
    pub fn new(
        local_peer_id: PeerId,
        peer_ids: BTreeSet<PeerId>,
        initial_frame: i64,
    ) -> Self {
        Self {
            initial_frame,
            local_peer_id,
            peer_ids,
            peer_addrs: std::collections::BTreeMap::new(),
            buffer_size_hint: 1024,
            tick_rate_hz: 60,
            retransmission_timeout: Duration::from_millis(100),
            socket_read_timeout: Duration::from_millis(50),
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }

    /// Registers the socket address used to reach `peer`.
    pub fn with_peer_addr(mut self, peer: PeerId, addr: SocketAddr) -> Self {
        self.peer_addrs.insert(peer, addr);
        self
    }

    /// Resolves the [`PeerId`] that owns `addr`, if any is registered.
    pub fn peer_for_addr(&self, addr: &SocketAddr) -> Option<PeerId> {
        self.peer_addrs
            .iter()
            .find(|(_, a)| *a == addr)
            .map(|(id, _)| *id)
    }
}
