//! Entity lifecycle payloads.

use prost::Message;

/// Entity kind discriminator carried in spawn packets.
///
/// Mirrors the server's ID-space split; clients use it only for rendering.
pub mod entity_kind {
    pub const PLAYER: u32 = 0;
    pub const MONSTER: u32 = 1;
    pub const LOOT: u32 = 2;
}

#[derive(Clone, PartialEq, Message)]
pub struct EntitySpawn {
    #[prost(uint64, tag = "1")]
    pub entity_id: u64,
    #[prost(uint32, tag = "2")]
    pub kind: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    /// Monster or item definition; zero for players.
    #[prost(uint32, tag = "4")]
    pub definition_id: u32,
    #[prost(float, tag = "5")]
    pub x: f32,
    #[prost(float, tag = "6")]
    pub y: f32,
    #[prost(float, tag = "7")]
    pub z: f32,
    #[prost(float, tag = "8")]
    pub rotation: f32,
    #[prost(uint32, tag = "9")]
    pub hp: u32,
    #[prost(uint32, tag = "10")]
    pub max_hp: u32,
    #[prost(uint32, tag = "11")]
    pub level: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct EntityDespawn {
    #[prost(uint64, tag = "1")]
    pub entity_id: u64,
}

/// Vital-stat refresh for one entity.
#[derive(Clone, PartialEq, Message)]
pub struct EntityStatsUpdate {
    #[prost(uint64, tag = "1")]
    pub entity_id: u64,
    #[prost(uint32, tag = "2")]
    pub hp: u32,
    #[prost(uint32, tag = "3")]
    pub max_hp: u32,
    #[prost(uint32, tag = "4")]
    pub mp: u32,
    #[prost(uint32, tag = "5")]
    pub max_mp: u32,
}

/// Client request to spend unspent stat points.
///
/// The increments must sum to the points actually spent; anything else is a
/// stat-overdraw violation.
#[derive(Clone, PartialEq, Message)]
pub struct StatAllocate {
    #[prost(uint32, tag = "1")]
    pub strength: u32,
    #[prost(uint32, tag = "2")]
    pub stamina: u32,
    #[prost(uint32, tag = "3")]
    pub dexterity: u32,
    #[prost(uint32, tag = "4")]
    pub intellect: u32,
}
