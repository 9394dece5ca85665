//! Zones, channels and the world map.
//!
//! A zone is static metadata plus an ordered list of channels; a channel is
//! a capacity-bounded shard owning its player, monster and loot tables and
//! one spatial grid. All of it is owned by the tick thread; nothing here is
//! locked.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use skyrift_math::{vec3, Aabb, Vec3};
use skyrift_protocol::messages::zone::ChannelInfo;
use skyrift_registry::GameDefs;
use skyrift_spatial::SpatialGrid;
use tracing::info;

use crate::config::ServerConfig;
use crate::entity::{LootDrop, Monster, Player};
use crate::id::{
    ChannelId, EntityId, EntityKind, IdAllocator, ZoneId, LOOT_ID_BASE, MONSTER_ID_BASE,
};

pub struct Channel {
    pub zone_id: ZoneId,
    pub id: ChannelId,
    capacity: usize,
    pub players: FxHashMap<EntityId, Player>,
    pub monsters: FxHashMap<EntityId, Monster>,
    pub loot: FxHashMap<EntityId, LootDrop>,
    pub grid: SpatialGrid<EntityId>,
}

impl Channel {
    fn new(zone_id: ZoneId, id: ChannelId, capacity: usize, cell_size: f32) -> Self {
        Self {
            zone_id,
            id,
            capacity,
            players: FxHashMap::default(),
            monsters: FxHashMap::default(),
            loot: FxHashMap::default(),
            grid: SpatialGrid::new(cell_size),
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.players.len() < self.capacity
    }

    pub fn insert_player(&mut self, player: Player) {
        debug_assert!(self.has_capacity(), "caller must check capacity");
        self.grid
            .update(player.entity_id, player.position.x, player.position.z);
        self.players.insert(player.entity_id, player);
    }

    pub fn remove_player(&mut self, entity_id: EntityId) -> Option<Player> {
        let player = self.players.remove(&entity_id)?;
        self.grid.remove(entity_id);
        Some(player)
    }

    pub fn insert_monster(&mut self, monster: Monster) {
        self.grid
            .update(monster.entity_id, monster.position.x, monster.position.z);
        self.monsters.insert(monster.entity_id, monster);
    }

    pub fn insert_loot(&mut self, drop: LootDrop) {
        self.grid
            .update(drop.entity_id, drop.position.x, drop.position.z);
        self.loot.insert(drop.entity_id, drop);
    }

    pub fn remove_loot(&mut self, entity_id: EntityId) -> Option<LootDrop> {
        let drop = self.loot.remove(&entity_id)?;
        self.grid.remove(entity_id);
        Some(drop)
    }

    /// Position of any entity in this channel, regardless of kind.
    pub fn entity_position(&self, entity_id: EntityId) -> Option<Vec3> {
        match EntityKind::of(entity_id) {
            EntityKind::Player => self.players.get(&entity_id).map(|p| p.position),
            EntityKind::Monster => self.monsters.get(&entity_id).map(|m| m.position),
            EntityKind::Loot => self.loot.get(&entity_id).map(|l| l.position),
        }
    }

    /// Liveness of a combat-relevant entity. Loot is never "alive".
    pub fn entity_alive(&self, entity_id: EntityId) -> Option<bool> {
        match EntityKind::of(entity_id) {
            EntityKind::Player => self.players.get(&entity_id).map(Player::is_alive),
            EntityKind::Monster => self.monsters.get(&entity_id).map(Monster::is_alive),
            EntityKind::Loot => None,
        }
    }

    /// Spawn packet for any entity in this channel.
    pub fn spawn_packet_for(
        &self,
        entity_id: EntityId,
    ) -> Option<skyrift_protocol::messages::entity::EntitySpawn> {
        match EntityKind::of(entity_id) {
            EntityKind::Player => self.players.get(&entity_id).map(Player::spawn_packet),
            EntityKind::Monster => self.monsters.get(&entity_id).map(Monster::spawn_packet),
            EntityKind::Loot => self.loot.get(&entity_id).map(LootDrop::spawn_packet),
        }
    }

    /// Player entity ids inside the interest set around (`x`, `z`).
    pub fn nearby_players(&self, x: f32, z: f32) -> Vec<EntityId> {
        self.grid
            .nearby_entities(x, z)
            .into_iter()
            .filter(|&id| EntityKind::of(id) == EntityKind::Player)
            .collect()
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            channel_id: self.id,
            population: self.players.len() as u32,
            capacity: self.capacity as u32,
        }
    }
}

pub struct Zone {
    pub def: skyrift_registry::ZoneDef,
    pub bounds: Aabb,
    pub channels: Vec<Channel>,
}

impl Zone {
    pub fn spawn_point(&self) -> Vec3 {
        vec3(self.def.spawn_x, self.def.spawn_y, self.def.spawn_z)
    }
}

/// The process-wide world state: every zone and its channels.
///
/// Injected as a single service; the tick receives it by parameter.
pub struct WorldMap {
    defs: Arc<GameDefs>,
    zones: IndexMap<ZoneId, Zone>,
    channel_capacity: usize,
    cell_size: f32,
    monster_ids: IdAllocator,
    loot_ids: IdAllocator,
    /// entity id → owning (zone, channel). Maintained by every placement
    /// and removal; the sole way cross-channel code finds a player.
    player_index: FxHashMap<EntityId, (ZoneId, ChannelId)>,
}

impl WorldMap {
    /// Builds every configured zone with one starting channel each,
    /// populated with monsters from the spawn table.
    pub fn new(defs: Arc<GameDefs>, config: &ServerConfig) -> Self {
        let mut world = Self {
            defs: defs.clone(),
            zones: IndexMap::new(),
            channel_capacity: config.channel_capacity,
            cell_size: config.spatial_cell_size,
            monster_ids: IdAllocator::starting_at(MONSTER_ID_BASE),
            loot_ids: IdAllocator::starting_at(LOOT_ID_BASE),
            player_index: FxHashMap::default(),
        };

        for zone_def in defs.zones() {
            let half = zone_def.half_extent;
            let bounds = Aabb::new(
                vec3(-half, -1000.0, -half),
                vec3(half, 1000.0, half),
            );

            world.zones.insert(
                zone_def.id,
                Zone {
                    def: zone_def.clone(),
                    bounds,
                    channels: Vec::new(),
                },
            );
            let channel_id = world.append_channel(zone_def.id);

            info!(
                zone = zone_def.id,
                channel = channel_id,
                "initialised zone"
            );
        }

        world
    }

    pub fn zone(&self, zone_id: ZoneId) -> Option<&Zone> {
        self.zones.get(&zone_id)
    }

    pub fn channel(&self, zone_id: ZoneId, channel_id: ChannelId) -> Option<&Channel> {
        self.zones
            .get(&zone_id)?
            .channels
            .get(channel_id.checked_sub(1)? as usize)
    }

    pub fn channel_mut(&mut self, zone_id: ZoneId, channel_id: ChannelId) -> Option<&mut Channel> {
        self.zones
            .get_mut(&zone_id)?
            .channels
            .get_mut(channel_id.checked_sub(1)? as usize)
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.zones.values_mut().flat_map(|z| z.channels.iter_mut())
    }

    /// Appends a fresh channel to the zone, spawning its monster
    /// population. Returns the new channel id.
    fn append_channel(&mut self, zone_id: ZoneId) -> ChannelId {
        let defs = self.defs.clone();
        let channel_id = {
            let zone = self.zones.get(&zone_id).expect("zone exists");
            zone.channels.len() as ChannelId + 1
        };

        let mut channel = Channel::new(zone_id, channel_id, self.channel_capacity, self.cell_size);

        for spawn in defs.spawns_in_zone(zone_id) {
            let def = defs
                .monster(spawn.monster_def_id)
                .expect("validated at registry load");
            for _ in 0..spawn.count {
                let entity_id = self.monster_ids.allocate();
                channel.insert_monster(Monster::from_def(
                    entity_id,
                    def,
                    vec3(spawn.x, spawn.y, spawn.z),
                    spawn.radius,
                ));
            }
        }

        self.zones
            .get_mut(&zone_id)
            .expect("zone exists")
            .channels
            .push(channel);
        channel_id
    }

    /// The first channel with capacity, appending a new one when every
    /// existing channel is full.
    pub fn best_channel_id(&mut self, zone_id: ZoneId) -> Option<ChannelId> {
        let zone = self.zones.get(&zone_id)?;

        if let Some(channel) = zone.channels.iter().find(|c| c.has_capacity()) {
            return Some(channel.id);
        }

        info!(zone = zone_id, "all channels full, appending a new one");
        Some(self.append_channel(zone_id))
    }

    /// Places a player into the zone's best channel. The player's zone and
    /// channel fields are updated to match.
    pub fn place_player(&mut self, mut player: Player, zone_id: ZoneId) -> Option<ChannelId> {
        let channel_id = self.best_channel_id(zone_id)?;

        player.zone_id = zone_id;
        player.channel_id = channel_id;
        self.player_index
            .insert(player.entity_id, (zone_id, channel_id));

        self.channel_mut(zone_id, channel_id)
            .expect("channel just selected")
            .insert_player(player);
        Some(channel_id)
    }

    /// Places a player into a specific channel, failing when it is full.
    pub fn place_player_in_channel(
        &mut self,
        mut player: Player,
        zone_id: ZoneId,
        channel_id: ChannelId,
    ) -> Result<(), Player> {
        match self.channel_mut(zone_id, channel_id) {
            Some(channel) if channel.has_capacity() => {
                player.zone_id = zone_id;
                player.channel_id = channel_id;
                let entity_id = player.entity_id;
                channel.insert_player(player);
                self.player_index.insert(entity_id, (zone_id, channel_id));
                Ok(())
            }
            _ => Err(player),
        }
    }

    /// Removes a player from whatever channel owns it.
    pub fn remove_player(&mut self, entity_id: EntityId) -> Option<Player> {
        let (zone_id, channel_id) = self.player_index.remove(&entity_id)?;
        self.channel_mut(zone_id, channel_id)?.remove_player(entity_id)
    }

    pub fn locate_player(&self, entity_id: EntityId) -> Option<(ZoneId, ChannelId)> {
        self.player_index.get(&entity_id).copied()
    }

    pub fn player(&self, entity_id: EntityId) -> Option<&Player> {
        let (zone_id, channel_id) = self.locate_player(entity_id)?;
        self.channel(zone_id, channel_id)?.players.get(&entity_id)
    }

    pub fn player_mut(&mut self, entity_id: EntityId) -> Option<&mut Player> {
        let (zone_id, channel_id) = self.locate_player(entity_id)?;
        self.channel_mut(zone_id, channel_id)?
            .players
            .get_mut(&entity_id)
    }

    /// The channel currently owning the given player.
    pub fn player_channel_mut(&mut self, entity_id: EntityId) -> Option<&mut Channel> {
        let (zone_id, channel_id) = self.locate_player(entity_id)?;
        self.channel_mut(zone_id, channel_id)
    }

    pub fn alloc_loot_id(&mut self) -> EntityId {
        self.loot_ids.allocate()
    }

    pub fn live_player_ids(&self) -> Vec<EntityId> {
        self.player_index.keys().copied().collect()
    }

    pub fn player_count(&self) -> usize {
        self.player_index.len()
    }

    pub fn defs(&self) -> &Arc<GameDefs> {
        &self.defs
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::entity::StatBlock;
    use crate::id::AccountId;

    fn defs() -> Arc<GameDefs> {
        Arc::new(
            GameDefs::from_parts(
                vec![],
                vec![],
                vec![skyrift_registry::MonsterDef {
                    id: 1,
                    name: "Wisp".to_owned(),
                    level: 1,
                    max_hp: 50,
                    attack: 5,
                    defense: 0,
                    xp_reward: 10,
                    aggro_range: 15.0,
                    attack_range: 2.0,
                    attack_speed_ms: 1500,
                    move_speed: 3.0,
                    respawn_ms: 5000,
                    loot: vec![],
                }],
                vec![skyrift_registry::ZoneDef {
                    id: 1,
                    name: "Aerie Fields".to_owned(),
                    spawn_x: 0.0,
                    spawn_y: 0.0,
                    spawn_z: 0.0,
                    half_extent: 500.0,
                    npcs: vec![],
                }],
                vec![skyrift_registry::SpawnDef {
                    zone_id: 1,
                    monster_def_id: 1,
                    x: 10.0,
                    y: 0.0,
                    z: 10.0,
                    radius: 5.0,
                    count: 2,
                }],
            )
            .unwrap(),
        )
    }

    fn small_world() -> WorldMap {
        let config = ServerConfig {
            channel_capacity: 2,
            ..ServerConfig::default()
        };
        WorldMap::new(defs(), &config)
    }

    fn player(entity_id: EntityId) -> Player {
        Player {
            entity_id,
            character_id: entity_id as i64,
            account_id: entity_id as AccountId,
            conn_id: entity_id,
            name: format!("p{entity_id}"),
            class_id: 1,
            position: Vec3::ZERO,
            rotation: 0.0,
            move_dir: Vec3::ZERO,
            is_moving: false,
            is_flying: false,
            hp: 100,
            mp: 50,
            stats: StatBlock::default(),
            level: 1,
            xp: 0,
            gold: 0,
            skills: FxHashMap::default(),
            skill_cooldowns: FxHashMap::default(),
            inventory: crate::entity::Inventory::new(),
            equipment: FxHashMap::default(),
            zone_id: 0,
            channel_id: 0,
            last_zone_change_ms: 0,
            last_channel_switch_ms: 0,
            target_id: 0,
            auto_attack: false,
            last_attack_ms: 0,
            last_attacker: 0,
            pending_move: None,
            udp: None,
            playtime_ms: 0,
            dirty: false,
        }
    }

    #[test]
    fn zones_start_with_one_populated_channel() {
        let world = small_world();
        let channel = world.channel(1, 1).unwrap();

        assert_eq!(channel.monsters.len(), 2);
        assert_eq!(channel.player_count(), 0);
    }

    #[test]
    fn channel_appended_when_all_full() {
        let mut world = small_world();

        for id in 1..=2 {
            world.place_player(player(id), 1).unwrap();
        }
        assert_eq!(world.zone(1).unwrap().channels.len(), 1);

        // Third player overflows into a freshly appended channel.
        let channel_id = world.place_player(player(3), 1).unwrap();
        assert_eq!(channel_id, 2);
        assert_eq!(world.zone(1).unwrap().channels.len(), 2);
        assert_eq!(
            world.channel(1, 2).unwrap().monsters.len(),
            2,
            "new channels get their own monster population"
        );

        // No channel ever exceeds its capacity.
        for channel in &world.zone(1).unwrap().channels {
            assert!(channel.player_count() <= 2);
        }
    }

    #[test]
    fn each_player_is_in_exactly_one_channel() {
        let mut world = small_world();
        world.place_player(player(1), 1).unwrap();
        world.place_player(player(2), 1).unwrap();
        world.place_player(player(3), 1).unwrap();

        for id in 1..=3 {
            let owning: usize = world
                .zone(1)
                .unwrap()
                .channels
                .iter()
                .filter(|c| c.players.contains_key(&id))
                .count();
            assert_eq!(owning, 1, "player {id}");
        }

        let removed = world.remove_player(2).unwrap();
        assert_eq!(removed.entity_id, 2);
        assert!(world.locate_player(2).is_none());
        assert!(world.player(1).is_some());
    }

    #[test]
    fn explicit_channel_placement_respects_capacity() {
        let mut world = small_world();
        world.place_player(player(1), 1).unwrap();
        world.place_player(player(2), 1).unwrap();

        let rejected = world.place_player_in_channel(player(3), 1, 1);
        assert!(rejected.is_err(), "full channel refuses placement");

        let placed = world.place_player_in_channel(player(4), 1, 99);
        assert!(placed.is_err(), "unknown channel refuses placement");
    }
}
