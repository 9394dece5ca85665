//! Plain definition records as they appear in the data files.

use serde::{Deserialize, Serialize};

/// Where an item may be equipped. Slot types also key the equipment map on
/// a character.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlotType {
    Weapon,
    Head,
    Body,
    Hands,
    Feet,
}

impl EquipSlotType {
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Weapon => 0,
            Self::Head => 1,
            Self::Body => 2,
            Self::Hands => 3,
            Self::Feet => 4,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Weapon,
            1 => Self::Head,
            2 => Self::Body,
            3 => Self::Hands,
            4 => Self::Feet,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: u32,
    pub name: String,
    /// Present only for equippable items.
    #[serde(default)]
    pub equip_slot: Option<EquipSlotType>,
    #[serde(default)]
    pub attack: u32,
    #[serde(default)]
    pub defense: u32,
    #[serde(default)]
    pub buy_price: u64,
    #[serde(default)]
    pub sell_price: u64,
    #[serde(default = "default_max_stack")]
    pub max_stack: u32,
    #[serde(default)]
    pub required_level: u32,
}

fn default_max_stack() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkillDef {
    pub id: u32,
    pub name: String,
    /// Class restriction; zero means any class.
    #[serde(default)]
    pub class_id: u32,
    pub mp_cost: u32,
    pub cooldown_ms: u64,
    pub range: f32,
    pub base_damage: u32,
    pub damage_per_level: u32,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
}

fn default_max_level() -> u32 {
    10
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LootEntry {
    pub item_def_id: u32,
    #[serde(default = "default_amount")]
    pub amount_min: u32,
    #[serde(default = "default_amount")]
    pub amount_max: u32,
    /// Probability in `[0, 1]` rolled independently per kill.
    pub drop_chance: f32,
}

fn default_amount() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonsterDef {
    pub id: u32,
    pub name: String,
    pub level: u32,
    pub max_hp: u32,
    pub attack: u32,
    pub defense: u32,
    pub xp_reward: u64,
    pub aggro_range: f32,
    pub attack_range: f32,
    pub attack_speed_ms: u64,
    pub move_speed: f32,
    pub respawn_ms: u64,
    #[serde(default)]
    pub loot: Vec<LootEntry>,
}

/// A monster spawn point inside a zone. Each channel materialises `count`
/// monsters from it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpawnDef {
    pub zone_id: u32,
    pub monster_def_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Respawned monsters scatter uniformly within this radius.
    #[serde(default)]
    pub radius: f32,
    #[serde(default = "default_spawn_count")]
    pub count: u32,
}

fn default_spawn_count() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NpcDef {
    pub id: u64,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Item definition ids this NPC sells; empty for non-vendors.
    #[serde(default)]
    pub sells: Vec<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneDef {
    pub id: u32,
    pub name: String,
    pub spawn_x: f32,
    pub spawn_y: f32,
    pub spawn_z: f32,
    /// Half-extent of the square playable area around the origin.
    pub half_extent: f32,
    #[serde(default)]
    pub npcs: Vec<NpcDef>,
}
