//! ACK message.

use serde::{Deserialize, Serialize};

use crate::config::PeerId;

/// Cumulative + selective acknowledgment for one peer's frame stream.
///
/// `selective_acks` is always sorted ascending and contains no value
/// `<= cumulative_ack`; the constructor enforces this defensively (filtering and
/// sorting) rather than panicking, since a wire-deserialized value might not
/// satisfy it and a degraded-but-valid ACK is preferable to rejecting the datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameAck {
    sender_id: PeerId,
    cumulative_ack: i64,
    selective_acks: Vec<i64>,
}

impl FrameAck {
    /// Builds an ACK about `sender_id`'s frame stream.
    ///
    /// `selective_acks` may be given in any order and with duplicates; the result
    /// is sorted, deduplicated, and filtered to values strictly greater than
    /// `cumulative_ack`.
    pub fn new(
        sender_id: PeerId,
        cumulative_ack: i64,
        selective_acks: impl IntoIterator<Item = i64>,
    ) -> Self {
        let mut acks: Vec<i64> = selective_acks
            .into_iter()
            .filter(|&f| f > cumulative_ack)
            .collect();
        acks.sort_unstable();
        acks.dedup();

        Self {
            sender_id,
            cumulative_ack,
            selective_acks: acks,
        }
    }

    /// The peer whose frame stream this ACK concerns.
    pub fn sender_id(&self) -> PeerId {
        self.sender_id
    }

    /// Highest frame number such that it and every prior frame are known received.
    pub fn cumulative_ack(&self) -> i64 {
        self.cumulative_ack
    }

    /// Frame numbers above `cumulative_ack` that have nonetheless been received.
    pub fn selective_acks(&self) -> &[i64] {
        &self.selective_acks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_sorts_dedups_and_filters() {
        let ack = FrameAck::new(PeerId(1), 5, vec![8, 5, 8, 3, 9, 6]);
        assert_eq!(ack.cumulative_ack(), 5);
        assert_eq!(ack.selective_acks(), &[6, 8, 9]);
    }

    #[test]
    fn empty_selective_acks_is_valid() {
        let ack = FrameAck::new(PeerId(0), -1, Vec::<i64>::new());
        assert!(ack.selective_acks().is_empty());
    }
}
