//! Reliable, in-order, per-frame input delivery for peer-to-peer lockstep simulations.
//!
//! A lockstep simulation advances one *frame* at a time and requires every peer's
//! input for frame *N* before frame *N* may run. This crate provides the three
//! pieces that make that possible over an unreliable, unordered datagram transport:
//! a per-sender [`receiving_queue::ReceivingQueue`] (reorder buffer + selective ACK),
//! a per-receiver [`transmission_queue::TransmissionQueue`] (unacked retention +
//! retransmission), and a [`barrier::CyclicBarrier`] that releases the simulation
//! thread once every peer has contributed a frame.

#![warn(clippy::all, missing_docs)]

/// Frame input record.
pub mod frame;

/// ACK message.
pub mod ack;

/// Cyclic N-way rendezvous barrier.
pub mod barrier;

/// Per-sender reorder buffer and selective-ACK bookkeeping.
pub mod receiving_queue;

/// Per-receiver unacknowledged-frame retention store.
pub mod transmission_queue;

/// Error taxonomy shared across the crate.
pub mod error;

/// Peer identity and session configuration.
pub mod config;

/// Tagged wire messages and their codec.
pub mod wire;

/// Session: owns the per-peer queue maps, the shared barrier, and the ACK buffer.
pub mod session;

/// Receiver/sender worker loops driving the core against a real socket.
pub mod worker;

pub use ack::FrameAck;
pub use barrier::CyclicBarrier;
pub use config::{PeerId, SessionConfig};
pub use error::LockstepError;
pub use frame::FrameInput;
pub use receiving_queue::ReceivingQueue;
pub use session::Session;
pub use transmission_queue::TransmissionQueue;
