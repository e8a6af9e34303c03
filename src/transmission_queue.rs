//! Per-receiver unacknowledged-frame retention store.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::ack::FrameAck;
use crate::error::{LockstepError, Result};
use crate::frame::FrameInput;

struct Entry {
    input: FrameInput,
    last_send_time: Option<Instant>,
}

struct State {
    next_frame_to_send: i64,
    unacked: BTreeMap<i64, Entry>,
    highest_cumulative_ack_seen: i64,
}

/// Retention store for frames sent to one remote peer, driven by the ACKs that
/// peer returns. Mutated from three call sites (`enqueue_local` on the
/// simulation thread, `process_ack` on the receiver worker, `due_for_send` on
/// the sender worker) and so serializes all operations behind one mutex.
pub struct TransmissionQueue {
    state: Mutex<State>,
}

impl TransmissionQueue {
    /// Builds a queue whose first locally produced frame will be numbered
    /// `initial_frame`.
    pub fn new(initial_frame: i64) -> Self {
        Self {
            state: Mutex::new(State {
                next_frame_to_send: initial_frame,
                unacked: BTreeMap::new(),
                highest_cumulative_ack_seen: initial_frame - 1,
            }),
        }
    }

    /// Appends a newly produced local input. `input.frame_number()` must equal
    /// the next expected send number; its send time is forced to "never sent"
    /// so it is immediately eligible on the next `due_for_send` poll.
    ///
    /// # Errors
    /// Returns [`LockstepError::Invariant`] if `input.frame_number()` does not
    /// equal the queue's `next_frame_to_send`. The simulation thread is the
    /// sole producer of local frame numbers, so this means the caller's own
    /// bookkeeping has drifted and the session must be torn down.
    pub fn enqueue_local(&self, input: FrameInput) -> Result<()> {
        let mut state = self.state.lock();
        if input.frame_number() != state.next_frame_to_send {
            return Err(LockstepError::Invariant(format!(
                "enqueue_local called with frame {} but next_frame_to_send is {}",
                input.frame_number(),
                state.next_frame_to_send
            )));
        }
        state.next_frame_to_send += 1;
        let frame_number = input.frame_number();
        state.unacked.insert(
            frame_number,
            Entry {
                input,
                last_send_time: None,
            },
        );
        Ok(())
    }

    /// Applies an acknowledgment: the cumulative field purges monotonically
    /// (a stale reordered ACK can never resurrect an already-acknowledged
    /// frame), the selective list purges unconditionally.
    pub fn process_ack(&self, ack: &FrameAck) {
        let mut state = self.state.lock();
        state.highest_cumulative_ack_seen =
            state.highest_cumulative_ack_seen.max(ack.cumulative_ack());

        let cumulative = state.highest_cumulative_ack_seen;
        state.unacked.retain(|&frame_number, _| frame_number > cumulative);

        for &frame_number in ack.selective_acks() {
            state.unacked.remove(&frame_number);
        }

        trace!(
            cumulative_ack = ack.cumulative_ack(),
            selective = ?ack.selective_acks(),
            remaining = state.unacked.len(),
            "applied ack"
        );
    }

    /// Returns every unacknowledged frame whose retransmission timeout has
    /// elapsed (`last_send_time + rto <= now`, or never sent), in ascending
    /// frame-number order, stamping each returned entry's send time to `now`.
    pub fn due_for_send(&self, now: Instant, rto: Duration) -> Vec<FrameInput> {
        let mut state = self.state.lock();
        let mut due = Vec::new();

        for (_, entry) in state.unacked.iter_mut() {
            let is_due = match entry.last_send_time {
                None => true,
                Some(sent) => now.saturating_duration_since(sent) >= rto,
            };
            if is_due {
                entry.last_send_time = Some(now);
                due.push(entry.input.clone());
            }
        }

        due
    }

    /// Number of frames currently awaiting acknowledgment, for diagnostics
    /// and tests.
    pub fn unacked_len(&self) -> usize {
        self.state.lock().unacked.len()
    }

    /// Frame numbers currently awaiting acknowledgment, for diagnostics and
    /// tests.
    pub fn unacked_frame_numbers(&self) -> Vec<i64> {
        self.state.lock().unacked.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerId;
    use std::time::Duration;

    fn input(n: i64) -> FrameInput {
        FrameInput::new(n, vec![])
    }

    #[test]
    fn ack_collapses_unacked_entries_up_to_cumulative() {
        let q = TransmissionQueue::new(3);
        for n in [3, 4, 5, 7, 8] {
            q.enqueue_local(input(n)).unwrap();
        }
        assert_eq!(q.unacked_len(), 5);

        let ack = FrameAck::new(PeerId(0), 5, vec![8]);
        q.process_ack(&ack);

        let mut remaining = q.unacked_frame_numbers();
        remaining.sort();
        assert_eq!(remaining, vec![7]);
    }

    #[test]
    fn stale_reordered_cumulative_ack_cannot_resurrect_frames() {
        let q = TransmissionQueue::new(0);
        for n in 0..5 {
            q.enqueue_local(input(n)).unwrap();
        }

        q.process_ack(&FrameAck::new(PeerId(0), 3, vec![]));
        assert_eq!(q.unacked_frame_numbers(), vec![4]);

        // A stale ACK claiming only up to frame 1 arrives late; it must not
        // resurrect frames 0..=3 which are already known acknowledged.
        q.process_ack(&FrameAck::new(PeerId(0), 1, vec![]));
        assert_eq!(q.unacked_frame_numbers(), vec![4]);
    }

    #[test]
    fn retransmission_timing_honors_rto() {
        let q = TransmissionQueue::new(4);
        q.enqueue_local(input(4)).unwrap();

        let t0 = Instant::now();
        let rto = Duration::from_millis(50);

        // First poll, frame never sent: due immediately.
        let due = q.due_for_send(t0, rto);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].frame_number(), 4);

        // Immediately after, not yet due again.
        let due = q.due_for_send(t0 + Duration::from_millis(1), rto);
        assert!(due.is_empty());

        // At t0 + rto, due for retransmission again.
        let due = q.due_for_send(t0 + rto, rto);
        assert_eq!(due.len(), 1);

        // Right after, not due.
        let due = q.due_for_send(t0 + rto + Duration::from_millis(1), rto);
        assert!(due.is_empty());

        // At t0 + 2*rto, due once more.
        let due = q.due_for_send(t0 + rto * 2, rto);
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn enqueue_local_out_of_order_returns_invariant_error() {
        let q = TransmissionQueue::new(0);
        assert!(matches!(
            q.enqueue_local(input(1)),
            Err(LockstepError::Invariant(_))
        ));
    }

    #[test]
    fn selective_ack_removes_entries_above_cumulative() {
        let q = TransmissionQueue::new(0);
        for n in 0..4 {
            q.enqueue_local(input(n)).unwrap();
        }
        q.process_ack(&FrameAck::new(PeerId(0), -1, vec![2]));
        let mut remaining = q.unacked_frame_numbers();
        remaining.sort();
        assert_eq!(remaining, vec![0, 1, 3]);
    }
}
