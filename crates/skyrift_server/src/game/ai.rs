//! The monster state machine.
//!
//! IDLE → AGGRO → ATTACK with RETURN as the give-up path and DEAD handled
//! by the death phase. Advanced once per tick per live monster; AGGRO and
//! RETURN move the monster, ATTACK swings on its attack-speed timer.

use skyrift_math::{step_toward, Vec3};
use skyrift_protocol::messages::movement::PositionBroadcast;
use skyrift_protocol::Opcode;

use super::broadcast::send_datagram;
use super::{combat, handlers, GameState};
use crate::entity::{AiState, LEASH_DISTANCE};
use crate::id::EntityId;
use crate::validate::within_range;

/// A monster counts as "back at spawn" within this distance.
const ARRIVE_EPSILON: f32 = 0.25;

struct MonsterView {
    id: EntityId,
    ai_state: AiState,
    position: Vec3,
    spawn: Vec3,
    target_id: EntityId,
    target: Option<(Vec3, bool)>,
    nearest_player: Option<EntityId>,
    aggro_range: f32,
    attack_range: f32,
    attack_speed_ms: u64,
    move_speed: f32,
    attack: u32,
    last_attack_ms: u64,
    alive: bool,
}

/// Phase 3: advance every monster.
pub fn run(state: &mut GameState) {
    let now_ms = state.now_ms;
    let dt = state.config.tick_ms() as f32 / 1000.0;
    let sink = state.udp_sink.clone();
    let defs = state.defs.clone();

    // Split the world borrow away from rng/broadcast.
    let GameState {
        world,
        rng,
        broadcast,
        ..
    } = state;

    for channel in world.channels_mut() {
        let mut views = Vec::with_capacity(channel.monsters.len());

        for monster in channel.monsters.values() {
            let target = channel.players.get(&monster.target_id).map(|p| {
                (p.position, p.is_alive())
            });

            // Potential aggro target: the nearest live player in the
            // monster's interest neighbourhood.
            let nearest_player = if monster.ai_state == AiState::Idle && monster.is_alive() {
                channel
                    .nearby_players(monster.position.x, monster.position.z)
                    .into_iter()
                    .filter_map(|id| channel.players.get(&id))
                    .filter(|p| p.is_alive())
                    .filter(|p| within_range(monster.position, p.position, monster.aggro_range))
                    .min_by(|a, b| {
                        let da = monster.position.distance(a.position);
                        let db = monster.position.distance(b.position);
                        da.total_cmp(&db)
                    })
                    .map(|p| p.entity_id)
            } else {
                None
            };

            views.push(MonsterView {
                id: monster.entity_id,
                ai_state: monster.ai_state,
                position: monster.position,
                spawn: monster.spawn_point,
                target_id: monster.target_id,
                target,
                nearest_player,
                aggro_range: monster.aggro_range,
                attack_range: monster.attack_range,
                attack_speed_ms: monster.attack_speed_ms,
                move_speed: monster.move_speed,
                attack: monster.attack,
                last_attack_ms: monster.last_attack_ms,
                alive: monster.is_alive(),
            });
        }

        let mut attacks: Vec<(EntityId, EntityId, i64)> = Vec::new();
        let mut moved: Vec<(EntityId, Vec3)> = Vec::new();

        for view in views {
            if !view.alive {
                // The death phase owns the HP = 0 transition.
                continue;
            }

            let (next_state, next_pos, clear_target, swing) = decide(&view, now_ms, dt);

            if let Some(monster) = channel.monsters.get_mut(&view.id) {
                if monster.ai_state != next_state {
                    if next_state == AiState::Idle && monster.ai_state == AiState::Return {
                        // Coming home resets the fight entirely.
                        monster.hp = monster.max_hp;
                    }
                    monster.ai_state = next_state;
                }
                if clear_target {
                    monster.target_id = 0;
                } else if view.nearest_player.is_some() && next_state == AiState::Aggro {
                    monster.target_id = view.nearest_player.unwrap_or(0);
                }
                if let Some(pos) = next_pos {
                    monster.position = pos;
                    moved.push((view.id, pos));
                }
                if swing {
                    monster.last_attack_ms = now_ms;
                    attacks.push((view.id, monster.target_id, i64::from(view.attack)));
                }
            }
        }

        for (id, pos) in moved {
            channel.grid.update(id, pos.x, pos.z);

            let update = PositionBroadcast {
                entity_id: id,
                x: pos.x,
                y: pos.y,
                z: pos.z,
                rotation: 0.0,
                is_moving: true,
                is_flying: false,
            };
            for recipient_id in channel.nearby_players(pos.x, pos.z) {
                if let Some(recipient) = channel.players.get_mut(&recipient_id) {
                    send_datagram(&*sink, recipient, Opcode::PositionBroadcast, &update);
                }
            }
        }

        for (attacker_id, target_id, attack) in attacks {
            if target_id == 0 {
                continue;
            }
            let outcome =
                combat::resolve_hit(channel, &defs, rng, attacker_id, target_id, attack, 0.0);
            if let Some(hit) = outcome {
                handlers::broadcast_damage(channel, broadcast, &hit, 0);
            }
        }
    }
}

/// Pure transition decision: (next state, new position, clear target,
/// attack this tick).
fn decide(view: &MonsterView, now_ms: u64, dt: f32) -> (AiState, Option<Vec3>, bool, bool) {
    let step = view.move_speed * dt;

    match view.ai_state {
        AiState::Dead => (AiState::Dead, None, false, false),

        AiState::Idle => {
            if view.nearest_player.is_some() {
                (AiState::Aggro, None, false, false)
            } else {
                (AiState::Idle, None, false, false)
            }
        }

        AiState::Aggro => match view.target {
            // Target lost or dead: give up and go home.
            None | Some((_, false)) => (AiState::Return, None, true, false),
            Some((target_pos, true)) => {
                if view.position.distance(view.spawn) > LEASH_DISTANCE {
                    (AiState::Return, None, true, false)
                } else if within_range(view.position, target_pos, view.attack_range) {
                    (AiState::Attack, None, false, false)
                } else {
                    let next = step_toward(view.position, target_pos, step);
                    (AiState::Aggro, Some(next), false, false)
                }
            }
        },

        AiState::Attack => match view.target {
            None | Some((_, false)) => (AiState::Return, None, true, false),
            Some((target_pos, true)) => {
                if !within_range(view.position, target_pos, view.attack_range) {
                    (AiState::Aggro, None, false, false)
                } else {
                    let swing =
                        now_ms.saturating_sub(view.last_attack_ms) >= view.attack_speed_ms;
                    (AiState::Attack, None, false, swing)
                }
            }
        },

        AiState::Return => {
            if view.position.distance(view.spawn) <= ARRIVE_EPSILON {
                (AiState::Idle, Some(view.spawn), true, false)
            } else {
                let next = step_toward(view.position, view.spawn, step);
                (AiState::Return, Some(next), true, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(ai_state: AiState) -> MonsterView {
        MonsterView {
            id: 1 << 32,
            ai_state,
            position: Vec3::ZERO,
            spawn: Vec3::ZERO,
            target_id: 0,
            target: None,
            nearest_player: None,
            aggro_range: 15.0,
            attack_range: 2.0,
            attack_speed_ms: 1500,
            move_speed: 3.0,
            attack: 5,
            last_attack_ms: 0,
            alive: true,
        }
    }

    #[test]
    fn idle_aggros_on_nearby_player() {
        let mut v = view(AiState::Idle);
        assert_eq!(decide(&v, 0, 0.05).0, AiState::Idle);

        v.nearest_player = Some(7);
        assert_eq!(decide(&v, 0, 0.05).0, AiState::Aggro);
    }

    #[test]
    fn aggro_chases_then_attacks() {
        let mut v = view(AiState::Aggro);
        v.target_id = 7;
        v.target = Some((Vec3::new(10.0, 0.0, 0.0), true));

        let (state, pos, _, _) = decide(&v, 0, 0.05);
        assert_eq!(state, AiState::Aggro);
        let pos = pos.unwrap();
        assert!(pos.x > 0.0 && pos.x < 10.0, "moved toward target");

        v.target = Some((Vec3::new(1.5, 0.0, 0.0), true));
        assert_eq!(decide(&v, 0, 0.05).0, AiState::Attack);
    }

    #[test]
    fn aggro_leashes_past_the_limit() {
        let mut v = view(AiState::Aggro);
        v.position = Vec3::new(LEASH_DISTANCE + 1.0, 0.0, 0.0);
        v.target = Some((Vec3::new(60.0, 0.0, 0.0), true));

        let (state, _, cleared, _) = decide(&v, 0, 0.05);
        assert_eq!(state, AiState::Return);
        assert!(cleared);
    }

    #[test]
    fn attack_swings_on_its_timer() {
        let mut v = view(AiState::Attack);
        v.target = Some((Vec3::new(1.0, 0.0, 0.0), true));
        v.last_attack_ms = 1000;

        assert!(!decide(&v, 2000, 0.05).3, "still cooling down");
        assert!(decide(&v, 2500, 0.05).3, "attack speed elapsed");
    }

    #[test]
    fn attack_falls_back_to_aggro_when_target_steps_out() {
        let mut v = view(AiState::Attack);
        v.target = Some((Vec3::new(5.0, 0.0, 0.0), true));

        assert_eq!(decide(&v, 0, 0.05).0, AiState::Aggro);
    }

    #[test]
    fn dead_target_sends_monster_home() {
        let mut v = view(AiState::Attack);
        v.target = Some((Vec3::new(1.0, 0.0, 0.0), false));
        assert_eq!(decide(&v, 0, 0.05).0, AiState::Return);

        let mut v = view(AiState::Aggro);
        v.target = None;
        assert_eq!(decide(&v, 0, 0.05).0, AiState::Return);
    }

    #[test]
    fn return_arrives_home() {
        let mut v = view(AiState::Return);
        v.position = Vec3::new(0.1, 0.0, 0.0);

        let (state, pos, _, _) = decide(&v, 0, 0.05);
        assert_eq!(state, AiState::Idle);
        assert_eq!(pos.unwrap(), v.spawn);
    }
}
