#![doc = include_str!("../README.md")]

pub mod datagram;
mod error_code;
mod frame;
pub mod messages;
mod opcode;

pub use datagram::{Datagram, DatagramError, SessionToken, DATAGRAM_MAX_LEN, DATAGRAM_MIN_LEN};
pub use error_code::ErrorCode;
pub use frame::{Frame, FrameDecoder, FrameEncoder, FrameError};
pub use opcode::Opcode;
use prost::Message;

/// Maximum encoded size of a TCP frame body (opcode + payload), excluding the
/// four-byte length prefix.
pub const MAX_FRAME_LEN: usize = 65535;

/// Size of the TCP length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Decodes a protobuf payload, mapping failures to a single typed error so
/// handlers can uniformly report `MalformedPayload`.
pub fn decode_payload<M: Message + Default>(payload: &[u8]) -> Result<M, FrameError> {
    M::decode(payload).map_err(|_| FrameError::MalformedPayload)
}

/// Encodes a protobuf payload into a fresh buffer.
pub fn encode_payload<M: Message>(msg: &M) -> Vec<u8> {
    msg.encode_to_vec()
}
