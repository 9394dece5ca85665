//! Chat payloads.

use prost::Message;

/// Maximum accepted chat message length in characters.
pub const MAX_CHAT_LEN: usize = 255;

#[derive(Clone, PartialEq, Message)]
pub struct ChatSend {
    #[prost(string, tag = "1")]
    pub text: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChatBroadcast {
    #[prost(uint64, tag = "1")]
    pub entity_id: u64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub text: String,
}
