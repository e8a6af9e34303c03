//! Frame input record.

use serde::{Deserialize, Serialize};

/// One peer's input for a single simulation frame.
///
/// Immutable once constructed: there are no setters, only the constructor and
/// accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInput {
    frame_number: i64,
    payload: Vec<u8>,
}

impl FrameInput {
    /// Builds a new frame input tagged with `frame_number`.
    pub fn new(frame_number: i64, payload: Vec<u8>) -> Self {
        Self {
            frame_number,
            payload,
        }
    }

    /// The frame this input belongs to.
    pub fn frame_number(&self) -> i64 {
        self.frame_number
    }

    /// The opaque input payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes `self`, returning the owned payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_reflect_constructed_values() {
        let input = FrameInput::new(42, vec![1, 2, 3]);
        assert_eq!(input.frame_number(), 42);
        assert_eq!(input.payload(), &[1, 2, 3]);
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(FrameInput::new(1, vec![9]), FrameInput::new(1, vec![9]));
        assert_ne!(FrameInput::new(1, vec![9]), FrameInput::new(2, vec![9]));
    }
}
