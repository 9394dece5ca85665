use std::net::SocketAddr;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use skyrift_math::{vec3, Vec3};
use skyrift_protocol::messages::auth::PlayerSelf;
use skyrift_protocol::messages::entity::{entity_kind, EntitySpawn};
use skyrift_protocol::messages::movement::MovementInput;
use skyrift_protocol::SessionToken;
use skyrift_registry::{EquipSlotType, GameDefs};

use super::{Inventory, ItemStack, StatBlock};
use crate::id::{AccountId, ChannelId, CharacterId, ConnId, EntityId, ZoneId};
use crate::persist::{BelongingsSnapshot, CharacterRecord, CharacterState, EquipRecord, SlotRecord};
use crate::session::UdpSession;

/// Ground movement speed, world units per second.
pub const GROUND_SPEED: f32 = 6.0;

/// Flight movement speed, world units per second.
pub const FLIGHT_SPEED: f32 = 10.0;

/// Player critical-hit chance.
pub const PLAYER_CRIT_CHANCE: f64 = 0.05;

/// Stat points granted per level-up.
pub const POINTS_PER_LEVEL: u32 = 5;

/// Real-time channel binding for one player.
pub struct PlayerUdp {
    pub token: SessionToken,
    pub session: Arc<UdpSession>,
    /// Learned from the first authenticated inbound datagram.
    pub addr: Option<SocketAddr>,
    /// Outbound datagram sequence, monotonically increasing.
    pub out_seq: u32,
}

/// A live player entity. Created at EnterWorld, destroyed on disconnect
/// after the force-flush.
pub struct Player {
    pub entity_id: EntityId,
    pub character_id: CharacterId,
    pub account_id: AccountId,
    pub conn_id: ConnId,
    pub name: String,
    pub class_id: u32,

    pub position: Vec3,
    pub rotation: f32,
    pub move_dir: Vec3,
    pub is_moving: bool,
    pub is_flying: bool,

    pub hp: u32,
    pub mp: u32,
    pub stats: StatBlock,
    pub level: u32,
    pub xp: u64,
    pub gold: u64,

    /// skill id → learned level. Zero levels are never stored.
    pub skills: FxHashMap<u32, u32>,
    /// skill id → absolute expiry in loop-milliseconds.
    pub skill_cooldowns: FxHashMap<u32, u64>,
    pub inventory: Inventory,
    /// Equip slot type → inventory slot currently worn there.
    pub equipment: FxHashMap<EquipSlotType, u32>,

    pub zone_id: ZoneId,
    pub channel_id: ChannelId,
    pub last_zone_change_ms: u64,
    pub last_channel_switch_ms: u64,

    pub target_id: EntityId,
    pub auto_attack: bool,
    pub last_attack_ms: u64,
    /// The entity that most recently damaged this player.
    pub last_attacker: EntityId,

    /// Latest movement claim this tick, realised by the movement phase.
    pub pending_move: Option<MovementInput>,
    pub udp: Option<PlayerUdp>,
    pub playtime_ms: u64,

    /// Set by any mutation of persisted fields; cleared by the tier-1
    /// flush.
    pub dirty: bool,
}

impl Player {
    /// Materialises a live player from its persisted record.
    ///
    /// The entity ID is the character ID; character rows live far below the
    /// monster ID partition.
    pub fn from_record(record: CharacterRecord, conn_id: ConnId) -> Self {
        let position = vec3(record.position[0], record.position[1], record.position[2]);

        let mut player = Self {
            entity_id: record.character_id as EntityId,
            character_id: record.character_id,
            account_id: record.account_id,
            conn_id,
            name: record.name,
            class_id: record.class_id,
            position,
            rotation: record.rotation,
            move_dir: Vec3::ZERO,
            is_moving: false,
            is_flying: false,
            hp: record.hp,
            mp: record.mp,
            stats: record.stats,
            level: record.level.max(1),
            xp: record.xp,
            gold: record.gold,
            skills: record
                .skills
                .into_iter()
                .filter(|&(_, level)| level > 0)
                .collect(),
            skill_cooldowns: FxHashMap::default(),
            inventory: Inventory::from_slots(record.inventory.into_iter().map(|s| {
                (
                    s.slot,
                    ItemStack {
                        item_def_id: s.item_def_id,
                        amount: s.amount,
                        enhancement: s.enhancement,
                    },
                )
            })),
            equipment: record
                .equipment
                .into_iter()
                .filter_map(|e| EquipSlotType::from_raw(e.slot_type).map(|t| (t, e.inventory_slot)))
                .collect(),
            zone_id: record.zone_id,
            channel_id: 0,
            last_zone_change_ms: 0,
            last_channel_switch_ms: 0,
            target_id: 0,
            auto_attack: false,
            last_attack_ms: 0,
            last_attacker: 0,
            pending_move: None,
            udp: None,
            playtime_ms: record.playtime_ms,
            dirty: false,
        };

        player.hp = player.hp.clamp(1, player.max_hp());
        player.mp = player.mp.min(player.max_mp());
        player
    }

    /// The mutable field set for the write-back tiers.
    pub fn state_snapshot(&self) -> CharacterState {
        CharacterState {
            character_id: self.character_id,
            account_id: self.account_id,
            level: self.level,
            xp: self.xp,
            hp: self.hp,
            mp: self.mp,
            stats: self.stats,
            position: [self.position.x, self.position.y, self.position.z],
            rotation: self.rotation,
            zone_id: self.zone_id,
            gold: self.gold,
            playtime_ms: self.playtime_ms,
        }
    }

    /// Inventory, equipment and gold for the direct transactional path.
    pub fn belongings_snapshot(&self) -> BelongingsSnapshot {
        let mut inventory: Vec<SlotRecord> = self
            .inventory
            .iter()
            .map(|(slot, stack)| SlotRecord {
                slot,
                item_def_id: stack.item_def_id,
                amount: stack.amount,
                enhancement: stack.enhancement,
            })
            .collect();
        inventory.sort_unstable_by_key(|s| s.slot);

        let mut equipment: Vec<EquipRecord> = self
            .equipment
            .iter()
            .map(|(&slot_type, &inventory_slot)| EquipRecord {
                slot_type: slot_type.to_raw(),
                inventory_slot,
            })
            .collect();
        equipment.sort_unstable_by_key(|e| e.slot_type);

        BelongingsSnapshot {
            character_id: self.character_id,
            gold: self.gold,
            inventory,
            equipment,
        }
    }

    pub fn max_hp(&self) -> u32 {
        100 + self.stats.stamina * 10 + (self.level.saturating_sub(1)) * 10
    }

    pub fn max_mp(&self) -> u32 {
        50 + self.stats.intellect * 10 + (self.level.saturating_sub(1)) * 5
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Current movement speed limit, per second.
    pub fn max_speed(&self) -> f32 {
        if self.is_flying {
            FLIGHT_SPEED
        } else {
            GROUND_SPEED
        }
    }

    /// Base attack of the equipped weapon, zero when unarmed.
    pub fn weapon_attack(&self, defs: &GameDefs) -> u32 {
        self.equipment
            .get(&EquipSlotType::Weapon)
            .and_then(|&slot| self.inventory.get(slot))
            .and_then(|stack| defs.item(stack.item_def_id))
            .map_or(0, |item| item.attack)
    }

    /// Total defense contributed by worn equipment.
    pub fn equip_defense(&self, defs: &GameDefs) -> u32 {
        self.equipment
            .values()
            .filter_map(|&slot| self.inventory.get(slot))
            .filter_map(|stack| defs.item(stack.item_def_id))
            .map(|item| item.defense)
            .sum()
    }

    /// Attack power feeding the damage formula.
    pub fn attack_power(&self, defs: &GameDefs) -> u32 {
        self.weapon_attack(defs) + self.stats.strength + self.level
    }

    /// XP needed to go from the current level to the next.
    pub fn xp_to_next_level(&self) -> u64 {
        u64::from(self.level) * 100
    }

    /// Awards XP, applying any number of level-ups. Level-ups grant stat
    /// points and restore HP/MP to the (new) maxima. Returns the number of
    /// levels gained.
    pub fn award_xp(&mut self, amount: u64) -> u32 {
        self.xp += amount;
        let mut gained = 0;

        while self.xp >= self.xp_to_next_level() {
            self.xp -= self.xp_to_next_level();
            self.level += 1;
            self.stats.unspent_points += POINTS_PER_LEVEL;
            gained += 1;
        }

        if gained > 0 {
            self.hp = self.max_hp();
            self.mp = self.max_mp();
        }

        self.mark_dirty();
        gained
    }

    /// Whether the skill is off cooldown at `now_ms`.
    pub fn cooldown_ready(&self, skill_id: u32, now_ms: u64) -> bool {
        self.skill_cooldowns
            .get(&skill_id)
            .map_or(true, |&expires| now_ms >= expires)
    }

    pub fn spawn_packet(&self) -> EntitySpawn {
        EntitySpawn {
            entity_id: self.entity_id,
            kind: entity_kind::PLAYER,
            name: self.name.clone(),
            definition_id: 0,
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            rotation: self.rotation,
            hp: self.hp,
            max_hp: self.max_hp(),
            level: self.level,
        }
    }

    pub fn self_packet(&self) -> PlayerSelf {
        PlayerSelf {
            entity_id: self.entity_id,
            name: self.name.clone(),
            class_id: self.class_id,
            level: self.level,
            xp: self.xp,
            hp: self.hp,
            max_hp: self.max_hp(),
            mp: self.mp,
            max_mp: self.max_mp(),
            strength: self.stats.strength,
            stamina: self.stats.stamina,
            dexterity: self.stats.dexterity,
            intellect: self.stats.intellect,
            unspent_points: self.stats.unspent_points,
            gold: self.gold,
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            rotation: self.rotation,
        }
    }
}
