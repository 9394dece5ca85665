//! Movement integration and the speed cap.
//!
//! Clients stream MovementInput datagrams with a claimed position; the
//! movement phase realises at most one claim per player per tick. A claim
//! whose displacement exceeds the speed cap (with the latency grace) or
//! leaves the zone bounds is answered with a PositionCorrection and the
//! authoritative position stands.

use skyrift_math::vec3;
use skyrift_protocol::messages::movement::{
    MovementInput, PositionBroadcast, PositionCorrection,
};
use skyrift_protocol::Opcode;

use super::broadcast::{send_datagram, send_position};
use super::GameState;
use crate::entity::{FLIGHT_SPEED, GROUND_SPEED};
use crate::id::EntityId;
use crate::validate::movement_allowed;

/// Phase 2: realise pending movement claims.
pub fn run(state: &mut GameState) {
    let dt_ms = state.config.tick_ms();
    let sink = state.udp_sink.clone();

    for entity_id in state.world.live_player_ids() {
        let Some((zone_id, _)) = state.world.locate_player(entity_id) else {
            continue;
        };
        let Some(zone) = state.world.zone(zone_id) else {
            continue;
        };
        let bounds = zone.bounds;

        let Some(channel) = state.world.player_channel_mut(entity_id) else {
            continue;
        };

        let mut moved = None;

        {
            let Some(player) = channel.players.get_mut(&entity_id) else {
                continue;
            };
            if !player.is_alive() {
                player.pending_move = None;
                continue;
            }

            if let Some(input) = player.pending_move.take() {
                let claimed = vec3(input.x, input.y, input.z);
                let max_speed = if input.is_flying {
                    FLIGHT_SPEED
                } else {
                    GROUND_SPEED
                };

                let legal = bounds.contains(claimed)
                    && movement_allowed(player.position, claimed, max_speed, dt_ms);

                if legal {
                    player.position = claimed;
                    player.rotation = input.rotation;
                    player.move_dir = vec3(input.dir_x, 0.0, input.dir_z);
                    player.is_moving = input.is_moving;
                    player.is_flying = input.is_flying;
                    player.mark_dirty();
                    moved = Some(position_packet(entity_id, &input));
                } else {
                    let correction = PositionCorrection {
                        x: player.position.x,
                        y: player.position.y,
                        z: player.position.z,
                        rotation: player.rotation,
                    };
                    send_datagram(&*sink, player, Opcode::PositionCorrection, &correction);
                }
            } else if player.is_moving {
                // No fresh claim this tick; keep integrating the last
                // direction server-side so observers see smooth motion.
                let step = player.move_dir * player.max_speed() * (dt_ms as f32 / 1000.0);
                let next = bounds.clamp_point(player.position + step);
                if next != player.position {
                    player.position = next;
                    player.mark_dirty();
                    moved = Some(PositionBroadcast {
                        entity_id,
                        x: next.x,
                        y: next.y,
                        z: next.z,
                        rotation: player.rotation,
                        is_moving: true,
                        is_flying: player.is_flying,
                    });
                }
            }
        }

        if let Some(update) = moved {
            let position = vec3(update.x, update.y, update.z);
            channel.grid.update(entity_id, position.x, position.z);

            // Fan the update out over the interest set, skipping the mover.
            let recipients = channel.nearby_players(position.x, position.z);
            for recipient_id in recipients {
                if recipient_id == entity_id {
                    continue;
                }
                if let Some(recipient) = channel.players.get_mut(&recipient_id) {
                    send_position(&*sink, &*state.delta, recipient, &update);
                }
            }
        }
    }
}

/// Stores the latest movement claim on the player; the movement phase picks
/// it up this tick. Later datagrams in the same tick overwrite earlier
/// ones, which matches the "latest input wins" real-time contract.
pub fn handle_movement_input(state: &mut GameState, entity_id: EntityId, input: MovementInput) {
    if let Some(player) = state.world.player_mut(entity_id) {
        player.pending_move = Some(input);
    }
}

fn position_packet(entity_id: EntityId, input: &MovementInput) -> PositionBroadcast {
    PositionBroadcast {
        entity_id,
        x: input.x,
        y: input.y,
        z: input.z,
        rotation: input.rotation,
        is_moving: input.is_moving,
        is_flying: input.is_flying,
    }
}
