//! Cyclic N-way rendezvous barrier.

use std::sync::{Condvar, Mutex};

use tracing::trace;

use crate::error::{LockstepError, Result};

struct State {
    remaining: usize,
    /// Bumped every time `remaining` hits zero and is reset. Lets a waiter tell
    /// "the cycle I was waiting on released" apart from "someone else's cycle
    /// released while I was asleep," so a countdown that lands between a
    /// waiter checking `remaining` and actually sleeping is never lost.
    generation: u64,
    cancelled: bool,
}

/// A reusable N-way rendezvous: `count_down` N times releases every `await_all`
/// waiter, then the countdown resets to `count` for the next cycle.
///
/// Unlike `std::sync::Barrier` (single release, must be rebuilt to reuse), this
/// stays allocated for the whole session and cycles indefinitely, which is the
/// point: a per-tick rendezvous needs to run thousands of times without
/// reallocating.
pub struct CyclicBarrier {
    count: usize,
    state: Mutex<State>,
    condvar: Condvar,
}

impl CyclicBarrier {
    /// Builds a barrier that releases once `count` distinct countdowns have
    /// landed since the last release (or since construction).
    ///
    /// # Panics
    /// Panics if `count` is zero; a zero-peer barrier is meaningless.
    pub fn new(count: usize) -> Self {
        assert!(count > 0, "CyclicBarrier count must be positive");
        Self {
            count,
            state: Mutex::new(State {
                remaining: count,
                generation: 0,
                cancelled: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until `remaining` reaches zero, then returns once `remaining` has
    /// already been reset to `count` for the next cycle.
    ///
    /// # Errors
    /// Returns [`LockstepError::Interrupted`] if [`Self::cancel`] is called
    /// while waiting, or was called before this call began.
    pub fn await_all(&self) -> Result<()> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let starting_generation = guard.generation;

        loop {
            if guard.cancelled {
                return Err(LockstepError::Interrupted);
            }
            if guard.generation != starting_generation {
                return Ok(());
            }
            guard = self
                .condvar
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Decrements `remaining` if positive; once it reaches zero, resets it to
    /// `count` and wakes every `await_all` waiter. Calls once `remaining` is
    /// already zero within the same cycle are no-ops.
    pub fn count_down(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if guard.remaining == 0 {
            return;
        }
        guard.remaining -= 1;
        trace!(remaining = guard.remaining, count = self.count, "barrier countdown");
        if guard.remaining == 0 {
            guard.remaining = self.count;
            guard.generation = guard.generation.wrapping_add(1);
            self.condvar.notify_all();
        }
    }

    /// Force-resets `remaining` to `count` without bumping the generation
    /// counter for waiters to observe as a release. Used on session teardown
    /// or desync recovery, where the countdown should restart but an
    /// in-flight `await_all` caller must not wake as if a normal tick landed.
    pub fn reset(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.remaining = self.count;
    }

    /// Current countdown remaining. Advisory only; may be stale the instant
    /// after it's read.
    pub fn get_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).remaining
    }

    /// Marks the barrier cancelled: every current and future `await_all` call
    /// returns [`LockstepError::Interrupted`] immediately. Used for session
    /// shutdown so the simulation thread doesn't block forever waiting on a
    /// peer that will never send another frame.
    pub fn cancel(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.cancelled = true;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn releases_after_count_countdowns_and_resets() {
        let barrier = Arc::new(CyclicBarrier::new(2));
        assert_eq!(barrier.get_count(), 2);

        barrier.count_down();
        assert_eq!(barrier.get_count(), 1);
        barrier.count_down();
        assert_eq!(barrier.get_count(), 2);
    }

    #[test_log::test]
    fn reuse_across_multiple_cycles() {
        // Two full cycles back to back; remaining should read 2,1,0,2,1,0.
        let barrier = Arc::new(CyclicBarrier::new(2));
        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.await_all().unwrap();
                barrier.await_all().unwrap();
            })
        };

        thread::sleep(Duration::from_millis(20));
        barrier.count_down();
        barrier.count_down();
        thread::sleep(Duration::from_millis(20));
        barrier.count_down();
        barrier.count_down();

        waiter.join().unwrap();
    }

    #[test]
    fn extra_countdowns_within_a_cycle_are_no_ops() {
        let barrier = CyclicBarrier::new(1);
        barrier.count_down();
        assert_eq!(barrier.get_count(), 1);
        barrier.count_down();
        assert_eq!(barrier.get_count(), 1);
    }

    #[test]
    fn cancel_wakes_waiters_with_interrupted() {
        let barrier = Arc::new(CyclicBarrier::new(2));
        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.await_all())
        };
        thread::sleep(Duration::from_millis(20));
        barrier.cancel();
        assert!(matches!(waiter.join().unwrap(), Err(LockstepError::Interrupted)));
    }

    #[test]
    fn reset_does_not_release_waiters() {
        let barrier = Arc::new(CyclicBarrier::new(2));
        barrier.count_down();
        barrier.reset();
        assert_eq!(barrier.get_count(), 2);
    }
}
