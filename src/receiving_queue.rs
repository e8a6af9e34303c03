//! Per-sender reorder buffer and selective-ACK bookkeeping.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::trace;

use crate::ack::FrameAck;
use crate::barrier::CyclicBarrier;
use crate::config::PeerId;
use crate::frame::FrameInput;

/// Fields mutated only by the push side (the receiver worker), grouped under
/// one lock since `last_in_order` and `selective_acks` are written only there.
/// `buffer_head`/`pending` live outside it so `pop` never contends with `push`.
struct PushSideState {
    last_in_order: i64,
    selective_acks: BTreeSet<i64>,
    /// Tracks whether a countdown has already been issued for the current
    /// `buffer_head`. Guarantees exactly one countdown per peer per tick
    /// regardless of whether the slot becomes available via arrival in
    /// `push` or via advancement in `pop`; reset whenever `pop` advances
    /// `buffer_head`.
    countdown_issued: bool,
}

/// Reorder buffer for one remote peer's frame stream.
///
/// `push` (called by the receiver worker) and `pop`/`head` (called only by the
/// simulation thread) are safe to call concurrently: in steady state `push`
/// only ever inserts keys `>= buffer_head` and `pop` only ever removes the key
/// at `buffer_head`, so the atomic `buffer_head` plus the concurrent `pending`
/// map keep the two sides out of each other's way without a shared lock.
pub struct ReceivingQueue {
    sender: PeerId,
    buffer_head: AtomicI64,
    pending: DashMap<i64, FrameInput>,
    push_side: Mutex<PushSideState>,
    barrier: Arc<CyclicBarrier>,
}

impl ReceivingQueue {
    /// Builds a queue expecting `sender`'s stream to begin at `initial_frame`,
    /// sharing `barrier` with every other peer's queue in the session.
    pub fn new(sender: PeerId, initial_frame: i64, barrier: Arc<CyclicBarrier>) -> Self {
        Self {
            sender,
            buffer_head: AtomicI64::new(initial_frame),
            pending: DashMap::new(),
            push_side: Mutex::new(PushSideState {
                last_in_order: initial_frame - 1,
                selective_acks: BTreeSet::new(),
                countdown_issued: false,
            }),
            barrier,
        }
    }

    /// The peer this queue reorders input for.
    pub fn sender(&self) -> PeerId {
        self.sender
    }

    /// Ingests one or more frames, possibly out of order, possibly duplicates,
    /// from `sender`'s stream. Returns the ACK to transmit back.
    ///
    /// Safe to call concurrently with `pop`/`head`, but not with another
    /// `push` on the same queue: the receiver worker is the sole writer for
    /// any given peer, since all of that peer's frames arrive through the
    /// same socket demultiplex path.
    pub fn push(&self, frames: impl IntoIterator<Item = FrameInput>) -> FrameAck {
        let mut state = self.push_side.lock().unwrap_or_else(|e| e.into_inner());

        for frame in frames {
            self.push_one(&mut state, frame);
        }

        FrameAck::new(
            self.sender,
            state.last_in_order,
            state.selective_acks.iter().copied(),
        )
    }

    fn push_one(&self, state: &mut PushSideState, frame: FrameInput) {
        let buffer_head = self.buffer_head.load(Ordering::Acquire);
        let frame_number = frame.frame_number();

        if frame_number < buffer_head {
            trace!(frame_number, buffer_head, sender = ?self.sender, "dropping out-of-window frame");
            return;
        }

        if self.pending.insert(frame_number, frame).is_some() {
            trace!(frame_number, sender = ?self.sender, "dropping duplicate frame");
            return;
        }

        if frame_number == state.last_in_order + 1 {
            state.last_in_order += 1;
            while state
                .selective_acks
                .first()
                .is_some_and(|&f| f == state.last_in_order + 1)
            {
                state.selective_acks.pop_first();
                state.last_in_order += 1;
            }

            if frame_number == buffer_head && !state.countdown_issued {
                state.countdown_issued = true;
                self.barrier.count_down();
            }
        } else {
            state.selective_acks.insert(frame_number);
        }
    }

    /// Returns and removes the frame at `buffer_head`, advancing it by one.
    /// Returns `None` if that slot has not yet arrived.
    ///
    /// Called only by the simulation thread.
    pub fn pop(&self) -> Option<FrameInput> {
        let buffer_head = self.buffer_head.load(Ordering::Acquire);
        let (_, frame) = self.pending.remove(&buffer_head)?;
        let next = buffer_head + 1;
        self.buffer_head.store(next, Ordering::Release);

        // A countdown for `next` may already have fired while `next` was still
        // ahead of the (pre-advance) buffer_head, e.g. a contiguous run that
        // arrived before this pop. Reset the flag for the new buffer_head and
        // re-check: if `next` is already pending, the slot's availability was
        // never actually announced under the new buffer_head's identity.
        {
            let mut state = self.push_side.lock().unwrap_or_else(|e| e.into_inner());
            state.countdown_issued = false;
            if self.pending.contains_key(&next) {
                state.countdown_issued = true;
                self.barrier.count_down();
            }
        }

        Some(frame)
    }

    /// Non-mutating peek at the frame waiting at `buffer_head`, if any.
    pub fn head(&self) -> Option<FrameInput> {
        let buffer_head = self.buffer_head.load(Ordering::Acquire);
        self.pending.get(&buffer_head).map(|r| r.value().clone())
    }

    /// The frame number the simulation will next consume.
    pub fn buffer_head(&self) -> i64 {
        self.buffer_head.load(Ordering::Acquire)
    }

    /// Highest frame number such that every frame in `[initial_frame, n]` has
    /// been received, for diagnostics/tests.
    pub fn last_in_order(&self) -> i64 {
        self.push_side
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_in_order
    }
}
