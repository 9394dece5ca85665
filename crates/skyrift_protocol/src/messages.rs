//! Protobuf payload types, one module per opcode group.
//!
//! Messages are hand-derived `prost::Message` structs; the wire schema is
//! the struct definition itself, so the client and server must agree on this
//! crate version. Field tags are stable: never reuse a retired tag.

pub mod auth;
pub mod chat;
pub mod combat;
pub mod entity;
pub mod inventory;
pub mod movement;
pub mod system;
pub mod zone;
