//! Auth-lifecycle payloads handled by the world service.
//!
//! Login, registration and character CRUD belong to the login service; only
//! the EnterWorld exchange terminates here.

use prost::Message;

use super::entity::EntitySpawn;

/// Client request to enter the world with a selected character.
#[derive(Clone, PartialEq, Message)]
pub struct EnterWorld {
    #[prost(uint64, tag = "1")]
    pub character_id: u64,
    /// The 8-byte session token issued at login, echoed back for binding.
    #[prost(bytes = "vec", tag = "2")]
    pub session_token: Vec<u8>,
    #[prost(string, tag = "3")]
    pub jwt: String,
}

/// The authoritative view of the entering player's own character.
#[derive(Clone, PartialEq, Message)]
pub struct PlayerSelf {
    #[prost(uint64, tag = "1")]
    pub entity_id: u64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(uint32, tag = "3")]
    pub class_id: u32,
    #[prost(uint32, tag = "4")]
    pub level: u32,
    #[prost(uint64, tag = "5")]
    pub xp: u64,
    #[prost(uint32, tag = "6")]
    pub hp: u32,
    #[prost(uint32, tag = "7")]
    pub max_hp: u32,
    #[prost(uint32, tag = "8")]
    pub mp: u32,
    #[prost(uint32, tag = "9")]
    pub max_mp: u32,
    #[prost(uint32, tag = "10")]
    pub strength: u32,
    #[prost(uint32, tag = "11")]
    pub stamina: u32,
    #[prost(uint32, tag = "12")]
    pub dexterity: u32,
    #[prost(uint32, tag = "13")]
    pub intellect: u32,
    #[prost(uint32, tag = "14")]
    pub unspent_points: u32,
    #[prost(uint64, tag = "15")]
    pub gold: u64,
    #[prost(float, tag = "16")]
    pub x: f32,
    #[prost(float, tag = "17")]
    pub y: f32,
    #[prost(float, tag = "18")]
    pub z: f32,
    #[prost(float, tag = "19")]
    pub rotation: f32,
}

/// Initial world state sent on EnterWorld and after a zone change.
#[derive(Clone, PartialEq, Message)]
pub struct WorldSnapshot {
    #[prost(uint32, tag = "1")]
    pub zone_id: u32,
    #[prost(uint32, tag = "2")]
    pub channel_id: u32,
    #[prost(message, optional, tag = "3")]
    pub player: Option<PlayerSelf>,
    /// Entities inside the player's initial interest set.
    #[prost(message, repeated, tag = "4")]
    pub entities: Vec<EntitySpawn>,
}
