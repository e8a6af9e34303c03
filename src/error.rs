//! Error taxonomy shared across the crate.
//!
//! `Duplicate` and `OutOfWindow` never escape [`crate::receiving_queue::ReceivingQueue`]
//! as `Err` values. They're policy decisions the queue makes silently, traced rather
//! than propagated, but still named here as the kind of error they represent; tests
//! assert the silent-drop behavior directly.

use crate::config::PeerId;

/// Errors produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum LockstepError {
    /// A frame that had already been delivered to `pending` was pushed again.
    #[error("frame {0} is a duplicate of an already-buffered frame")]
    Duplicate(i64),

    /// A frame older than the consumer's current `bufferHead` was pushed.
    #[error("frame {0} is out of window (already consumed)")]
    OutOfWindow(i64),

    /// A datagram failed to decode, or failed a routing consistency check.
    #[error("malformed datagram: {0}")]
    Malformed(String),

    /// The transport reported the peer as unreachable.
    #[error("peer {0:?} is unreachable")]
    Unreachable(PeerId),

    /// A blocking wait (the cyclic barrier) was cancelled.
    #[error("blocking wait was interrupted")]
    Interrupted,

    /// An impossible state was observed; the session must be torn down.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Convenience alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, LockstepError>;
