//! Control payloads: heartbeat, operator messages, error envelope.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct Heartbeat {
    /// Echoed verbatim so the client can measure round-trip time.
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ServerMessage {
    #[prost(string, tag = "1")]
    pub text: String,
}

/// The client-visible error envelope.
///
/// `opcode` names the request that failed, `code` is from the stable numeric
/// taxonomy, `message` is a short tag safe to show operators. Internal
/// detail never travels here.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorResponse {
    #[prost(uint32, tag = "1")]
    pub opcode: u32,
    #[prost(uint32, tag = "2")]
    pub code: u32,
    #[prost(string, tag = "3")]
    pub message: String,
}
