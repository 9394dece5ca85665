//! Death transitions, loot drops, XP awards, respawns and loot expiry.

use rand::Rng;
use skyrift_math::Vec3;
use skyrift_protocol::messages::combat::{EntityDeath, XpGain};
use skyrift_protocol::messages::entity::{EntityDespawn, EntityStatsUpdate};
use skyrift_protocol::Opcode;

use super::handlers::{broadcast_near, stage_to_player};
use super::GameState;
use crate::entity::{AiState, LootDrop, LOOT_DESPAWN_MS};
use crate::id::{ChannelId, EntityId, EntityKind, ZoneId};

struct MonsterDeath {
    zone_id: ZoneId,
    channel_id: ChannelId,
    monster_id: EntityId,
    killer_id: EntityId,
    position: Vec3,
    def_id: u32,
    xp_reward: u64,
}

/// Phase 5: entities whose HP reached zero this tick get their death
/// transition.
pub fn run(state: &mut GameState) {
    let now_ms = state.now_ms;
    let defs = state.defs.clone();
    let loot_window_ms = state.config.loot_ownership_sec * 1000;

    let GameState {
        world,
        rng,
        broadcast,
        ..
    } = state;

    // Collect the dead before mutating anything.
    let mut monster_deaths: Vec<MonsterDeath> = Vec::new();
    let mut dead_players: Vec<EntityId> = Vec::new();

    for channel in world.channels_mut() {
        for monster in channel.monsters.values() {
            if monster.hp == 0 && monster.ai_state != AiState::Dead {
                monster_deaths.push(MonsterDeath {
                    zone_id: channel.zone_id,
                    channel_id: channel.id,
                    monster_id: monster.entity_id,
                    killer_id: monster.last_attacker,
                    position: monster.position,
                    def_id: monster.def_id,
                    xp_reward: monster.xp_reward,
                });
            }
        }
        for player in channel.players.values() {
            if player.hp == 0 {
                dead_players.push(player.entity_id);
            }
        }
    }

    for death in monster_deaths {
        // Transition, death broadcast and loot rolls.
        let mut rolls: Vec<(u32, u32)> = Vec::new();
        {
            let Some(channel) = world.channel_mut(death.zone_id, death.channel_id) else {
                continue;
            };
            let Some(monster) = channel.monsters.get_mut(&death.monster_id) else {
                continue;
            };

            monster.ai_state = AiState::Dead;
            monster.target_id = 0;
            monster.death_ms = now_ms;
            channel.grid.remove(death.monster_id);

            broadcast_near(
                channel,
                broadcast,
                death.position,
                Opcode::EntityDeath,
                &EntityDeath {
                    entity_id: death.monster_id,
                    killer_id: death.killer_id,
                },
            );

            if let Some(def) = defs.monster(death.def_id) {
                for entry in &def.loot {
                    if rng.gen::<f32>() < entry.drop_chance {
                        let hi = entry.amount_max.max(entry.amount_min);
                        let amount = rng.gen_range(entry.amount_min..=hi);
                        rolls.push((entry.item_def_id, amount));
                    }
                }
            }
        }

        // Materialise rolls as owned loot entities.
        for (item_def_id, amount) in rolls {
            let Some(item_name) = defs.item(item_def_id).map(|i| i.name.clone()) else {
                continue;
            };
            let loot_id = world.alloc_loot_id();

            let Some(channel) = world.channel_mut(death.zone_id, death.channel_id) else {
                continue;
            };
            let drop = LootDrop {
                entity_id: loot_id,
                item_def_id,
                item_name,
                amount,
                position: death.position,
                owner_id: death.killer_id,
                owned_until_ms: now_ms + loot_window_ms,
                despawn_at_ms: now_ms + LOOT_DESPAWN_MS,
            };
            let spawn = drop.spawn_packet();
            channel.insert_loot(drop);
            broadcast_near(channel, broadcast, death.position, Opcode::EntitySpawn, &spawn);
        }

        // XP goes to the killer when it is a live player.
        if EntityKind::of(death.killer_id) == EntityKind::Player && death.xp_reward > 0 {
            award_kill_xp(world, broadcast, death.killer_id, death.xp_reward);
        }
    }

    // Players respawn at the zone's default spawn, full vitals, no item
    // loss.
    for player_id in dead_players {
        respawn_player(world, broadcast, player_id);
    }
}

fn award_kill_xp(
    world: &mut crate::world::WorldMap,
    broadcast: &mut super::broadcast::BroadcastStage,
    killer_id: EntityId,
    xp_reward: u64,
) {
    let Some(killer) = world.player_mut(killer_id) else {
        return;
    };

    let gained = killer.award_xp(xp_reward);
    let conn_id = killer.conn_id;
    let position = killer.position;
    let packet = XpGain {
        amount: xp_reward,
        total_xp: killer.xp,
        level: killer.level,
        unspent_points: killer.stats.unspent_points,
    };
    let stats = EntityStatsUpdate {
        entity_id: killer_id,
        hp: killer.hp,
        max_hp: killer.max_hp(),
        mp: killer.mp,
        max_mp: killer.max_mp(),
    };

    stage_to_player(broadcast, conn_id, Opcode::XpGain, &packet);

    if gained > 0 {
        // Level-ups are visible to everyone nearby.
        if let Some(channel) = world.player_channel_mut(killer_id) {
            broadcast_near(channel, broadcast, position, Opcode::EntityStats, &stats);
        }
    }
}

fn respawn_player(
    world: &mut crate::world::WorldMap,
    broadcast: &mut super::broadcast::BroadcastStage,
    player_id: EntityId,
) {
    let Some((zone_id, _)) = world.locate_player(player_id) else {
        return;
    };
    let Some(zone) = world.zone(zone_id) else {
        return;
    };
    let spawn_point = zone.spawn_point();

    let Some(channel) = world.player_channel_mut(player_id) else {
        return;
    };

    let (old_pos, death, spawn) = {
        let Some(player) = channel.players.get_mut(&player_id) else {
            return;
        };
        let old_pos = player.position;
        let death = EntityDeath {
            entity_id: player_id,
            killer_id: player.last_attacker,
        };

        player.position = spawn_point;
        player.hp = player.max_hp();
        player.mp = player.max_mp();
        player.target_id = 0;
        player.auto_attack = false;
        player.is_moving = false;
        player.pending_move = None;
        player.mark_dirty();

        (old_pos, death, player.spawn_packet())
    };

    channel.grid.update(player_id, spawn_point.x, spawn_point.z);

    broadcast_near(channel, broadcast, old_pos, Opcode::EntityDeath, &death);
    broadcast_near(
        channel,
        broadcast,
        old_pos,
        Opcode::EntityDespawn,
        &EntityDespawn {
            entity_id: player_id,
        },
    );
    broadcast_near(channel, broadcast, spawn_point, Opcode::EntitySpawn, &spawn);
}

/// Late phase: monsters come back after their respawn delay, stale loot
/// evaporates.
pub fn run_respawns(state: &mut GameState) {
    let now_ms = state.now_ms;

    let GameState {
        world, broadcast, ..
    } = state;

    for channel in world.channels_mut() {
        let due: Vec<EntityId> = channel
            .monsters
            .values()
            .filter(|m| m.can_respawn(now_ms))
            .map(|m| m.entity_id)
            .collect();

        for monster_id in due {
            let (spawn, pos) = {
                let monster = channel
                    .monsters
                    .get_mut(&monster_id)
                    .expect("collected above");
                monster.respawn();
                (monster.spawn_packet(), monster.position)
            };
            channel.grid.update(monster_id, pos.x, pos.z);
            broadcast_near(channel, broadcast, pos, Opcode::EntitySpawn, &spawn);
        }

        let stale: Vec<EntityId> = channel
            .loot
            .values()
            .filter(|l| now_ms >= l.despawn_at_ms)
            .map(|l| l.entity_id)
            .collect();

        for loot_id in stale {
            if let Some(drop) = channel.remove_loot(loot_id) {
                broadcast_near(
                    channel,
                    broadcast,
                    drop.position,
                    Opcode::EntityDespawn,
                    &EntityDespawn {
                        entity_id: loot_id,
                    },
                );
            }
        }
    }
}
