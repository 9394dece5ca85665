//! Entity records owned by channels.
//!
//! "Entity" is a tagged variant with three cases discriminated by the ID
//! space: players, monsters and loot drops. Each lives in its own table on
//! the owning channel; everything that refers to an entity does so by ID.

mod inventory;
mod loot;
mod monster;
mod player;

pub use inventory::{Inventory, ItemStack, EQUIP_MAX_ENHANCEMENT, INVENTORY_SLOTS};
pub use loot::{LootDrop, LOOT_DESPAWN_MS};
pub use monster::{AiState, Monster, LEASH_DISTANCE};
pub use player::{
    Player, PlayerUdp, FLIGHT_SPEED, GROUND_SPEED, PLAYER_CRIT_CHANCE, POINTS_PER_LEVEL,
};

/// Base stat block shared by character records and live players.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug, serde::Serialize, serde::Deserialize)]
pub struct StatBlock {
    pub strength: u32,
    pub stamina: u32,
    pub dexterity: u32,
    pub intellect: u32,
    pub unspent_points: u32,
}
