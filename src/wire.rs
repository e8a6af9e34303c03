//! Tagged wire messages and their codec.
//!
//! The wire message is a single tagged enum with an explicit discriminant
//! baked in by `serde`/`bincode`, so dispatch on receipt is a total `match`
//! the compiler checks for us rather than runtime type inspection.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::ack::FrameAck;
use crate::config::PeerId;
use crate::error::{LockstepError, Result};
use crate::frame::FrameInput;

/// One frame from one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessage {
    /// The peer that produced `frame`.
    pub sender_id: PeerId,
    /// The frame input itself.
    pub frame: FrameInput,
}

/// A batch of frames from one peer; order within the batch carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessageArray {
    /// The peer that produced every frame in `frames`.
    pub sender_id: PeerId,
    /// The batched frame inputs.
    pub frames: Vec<FrameInput>,
}

/// Every message kind that can cross the wire.
///
/// An explicit discriminant, not runtime type inspection: decoding a datagram
/// yields exactly one of these variants or a [`LockstepError::Malformed`],
/// with no possibility of an unrecognized-but-silently-ignored type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// A single frame from one peer.
    Input(InputMessage),
    /// A batch of frames from one peer.
    InputBatch(InputMessageArray),
    /// Cumulative + selective acknowledgment for one peer's stream.
    Ack(FrameAck),
    /// Empty message that only resets the remote's idle timer.
    KeepAlive,
}

impl WireMessage {
    /// Encodes this message with `bincode`, uncompressed.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| LockstepError::Malformed(e.to_string()))
    }

    /// Decodes a message previously produced by [`Self::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| LockstepError::Malformed(e.to_string()))
    }

    /// Encodes this message with `bincode`, then zlib-compresses the result.
    ///
    /// Exposed so a host can opt into a compressed transport, but not
    /// required by the core: the receiving and transmission queues operate
    /// purely on decoded [`WireMessage`] values and never see the wire bytes
    /// directly.
    pub fn encode_compressed(&self) -> Result<Vec<u8>> {
        let raw = self.encode()?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .and_then(|_| encoder.finish())
            .map_err(|e: io::Error| LockstepError::Malformed(e.to_string()))
    }

    /// Decompresses and decodes a datagram produced by
    /// [`Self::encode_compressed`].
    pub fn decode_compressed(bytes: &[u8]) -> Result<Self> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| LockstepError::Malformed(e.to_string()))?;
        Self::decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_message_round_trips() {
        let msg = WireMessage::Input(InputMessage {
            sender_id: PeerId(3),
            frame: FrameInput::new(7, vec![1, 2, 3]),
        });
        let bytes = msg.encode().unwrap();
        assert_eq!(WireMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn input_batch_round_trips() {
        let msg = WireMessage::InputBatch(InputMessageArray {
            sender_id: PeerId(1),
            frames: vec![FrameInput::new(0, vec![]), FrameInput::new(1, vec![9])],
        });
        let bytes = msg.encode().unwrap();
        assert_eq!(WireMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn ack_round_trips() {
        let msg = WireMessage::Ack(FrameAck::new(PeerId(2), 5, vec![7, 9]));
        let bytes = msg.encode().unwrap();
        assert_eq!(WireMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn keep_alive_round_trips() {
        let msg = WireMessage::KeepAlive;
        let bytes = msg.encode().unwrap();
        assert_eq!(WireMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn compressed_round_trip_matches_uncompressed_decode() {
        let msg = WireMessage::Input(InputMessage {
            sender_id: PeerId(0),
            frame: FrameInput::new(0, vec![0; 64]),
        });
        let bytes = msg.encode_compressed().unwrap();
        assert_eq!(WireMessage::decode_compressed(&bytes).unwrap(), msg);
    }

    #[test]
    fn malformed_bytes_yield_malformed_error() {
        let err = WireMessage::decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, LockstepError::Malformed(_)));
    }
}
