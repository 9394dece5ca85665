//! EnterWorld and the disconnect path.
//!
//! EnterWorld is resolved in two steps: the handler validates shape and
//! hands the slow work (JWT, session store, ban check, multi-login gate,
//! character load) to the auth/persistence worker; the completion event
//! registers the entity and places it in the world.

use std::sync::Arc;

use skyrift_protocol::messages::auth::{EnterWorld, WorldSnapshot};
use skyrift_protocol::messages::entity::EntityDespawn;
use skyrift_protocol::{ErrorCode, Opcode, SessionToken};
use tracing::{debug, info, warn};

use super::{broadcast_near, stage_to_player};
use crate::entity::{Player, PlayerUdp};
use crate::game::broadcast::ConnAuth;
use crate::game::GameState;
use crate::id::{ConnId, EntityId, MONSTER_ID_BASE};
use crate::persist::{PersistJob, ReleaseSession};
use crate::queue::EnterWorldSuccess;
use crate::session::UdpSession;

pub(super) fn handle_enter_world(
    state: &mut GameState,
    conn_id: ConnId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: EnterWorld = skyrift_protocol::decode_payload(body)?;

    let token_bytes: [u8; 8] = msg
        .session_token
        .as_slice()
        .try_into()
        .map_err(|_| ErrorCode::MalformedPayload)?;

    let slot = state
        .connections
        .get_mut(conn_id)
        .ok_or(ErrorCode::ServerError)?;

    match slot.auth {
        ConnAuth::Fresh => {}
        // One EnterWorld per connection, ever.
        ConnAuth::Pending | ConnAuth::Authed(_) => return Err(ErrorCode::MultiLoginDenied),
    }
    slot.auth = ConnAuth::Pending;

    state.persist.send(PersistJob::ResolveEnterWorld {
        conn_id,
        character_id: msg.character_id as i64,
        token: SessionToken::from_bytes(token_bytes),
        jwt: msg.jwt,
    });

    Ok(())
}

pub(super) fn complete_enter_world(
    state: &mut GameState,
    conn_id: ConnId,
    outcome: Result<Box<EnterWorldSuccess>, ErrorCode>,
) {
    let success = match outcome {
        Ok(success) => success,
        Err(code) => {
            if let Some(slot) = state.connections.get_mut(conn_id) {
                slot.auth = ConnAuth::Fresh;
            }
            state
                .broadcast
                .stage_error(conn_id, Opcode::EnterWorld.to_raw(), code);
            if code.is_fatal() {
                disconnect(state, conn_id);
            }
            return;
        }
    };

    // The connection may have died while the worker was busy; the claim it
    // acquired must be handed back.
    if state.connections.get_mut(conn_id).is_none() {
        state.persist.send(PersistJob::ReleaseAbandoned {
            account_id: success.account_id,
            token: success.token,
        });
        return;
    }

    // The worker's CAS makes a duplicate registration impossible unless
    // the process itself is confused; bail rather than clobber.
    if state.accounts.contains_key(&success.account_id) {
        warn!(
            account = success.account_id,
            "EnterWorld resolved for an account that is already live"
        );
        state
            .broadcast
            .stage_error(conn_id, Opcode::EnterWorld.to_raw(), ErrorCode::SessionBusy);
        state.persist.send(PersistJob::ReleaseAbandoned {
            account_id: success.account_id,
            token: success.token,
        });
        return;
    }

    let EnterWorldSuccess {
        account_id,
        token,
        secret,
        record,
    } = *success;

    let mut player = Player::from_record(record, conn_id);

    if player.entity_id >= MONSTER_ID_BASE {
        warn!(
            character = player.character_id,
            "character id collides with the monster id partition"
        );
        state
            .broadcast
            .stage_error(conn_id, Opcode::EnterWorld.to_raw(), ErrorCode::ServerError);
        state.persist.send(PersistJob::ReleaseAbandoned {
            account_id,
            token,
        });
        return;
    }

    // Unknown or missing zone falls back to the first configured zone's
    // spawn.
    let (zone_id, position) = match state.world.zone(player.zone_id) {
        Some(zone) if zone.bounds.contains(player.position) => {
            (player.zone_id, player.position)
        }
        Some(zone) => (player.zone_id, zone.spawn_point()),
        None => {
            let zone = state
                .defs
                .zones()
                .next()
                .expect("at least one zone is configured");
            let spawn = state
                .world
                .zone(zone.id)
                .expect("zone built at startup")
                .spawn_point();
            (zone.id, spawn)
        }
    };
    player.zone_id = zone_id;
    player.position = position;

    // Real-time channel binding.
    let udp_session = Arc::new(UdpSession::new(account_id, conn_id, secret));
    state.secret_cache.insert(token, udp_session.clone());
    player.udp = Some(PlayerUdp {
        token,
        session: udp_session,
        addr: None,
        out_seq: 0,
    });

    let entity_id = player.entity_id;
    let name = player.name.clone();

    let Some(channel_id) = state.world.place_player(player, zone_id) else {
        state
            .broadcast
            .stage_error(conn_id, Opcode::EnterWorld.to_raw(), ErrorCode::ServerError);
        state.secret_cache.remove(&token);
        state.persist.send(PersistJob::ReleaseAbandoned {
            account_id,
            token,
        });
        return;
    };

    if let Some(slot) = state.connections.get_mut(conn_id) {
        slot.auth = ConnAuth::Authed(account_id);
    }
    state.accounts.insert(account_id, entity_id);
    state.conn_players.insert(conn_id, entity_id);
    state.heartbeats.track(conn_id);

    info!(
        account = account_id,
        entity = entity_id,
        zone = zone_id,
        channel = channel_id,
        %name,
        "player entered world"
    );

    announce_spawn(state, entity_id);
    send_world_snapshot(state, conn_id, entity_id);
}

/// Broadcasts the new player to everyone already inside its interest set.
pub(super) fn announce_spawn(state: &mut GameState, entity_id: EntityId) {
    let Some(channel) = state.world.player_channel_mut(entity_id) else {
        return;
    };
    let Some(spawn) = channel.spawn_packet_for(entity_id) else {
        return;
    };
    let position = skyrift_math::vec3(spawn.x, spawn.y, spawn.z);

    for near_id in channel.nearby_players(position.x, position.z) {
        if near_id == entity_id {
            continue;
        }
        if let Some(near) = channel.players.get(&near_id) {
            state
                .broadcast
                .stage(near.conn_id, Opcode::EntitySpawn, &spawn);
        }
    }
}

/// Stages the initial (or post-transfer) world snapshot for one player.
pub(super) fn send_world_snapshot(state: &mut GameState, conn_id: ConnId, entity_id: EntityId) {
    let Some(channel) = state.world.player_channel_mut(entity_id) else {
        return;
    };
    let Some(player) = channel.players.get(&entity_id) else {
        return;
    };

    let mut entities = Vec::new();
    for near_id in channel.nearby_players(player.position.x, player.position.z) {
        if near_id == entity_id {
            continue;
        }
        if let Some(packet) = channel.spawn_packet_for(near_id) {
            entities.push(packet);
        }
    }
    // Monsters and loot share the grid with players, so the interest set
    // above only held players; widen to every non-player nearby.
    for near_id in channel
        .grid
        .nearby_entities(player.position.x, player.position.z)
    {
        if near_id == entity_id || channel.players.contains_key(&near_id) {
            continue;
        }
        if let Some(packet) = channel.spawn_packet_for(near_id) {
            entities.push(packet);
        }
    }

    let snapshot = WorldSnapshot {
        zone_id: player.zone_id,
        channel_id: player.channel_id,
        player: Some(player.self_packet()),
        entities,
    };

    stage_to_player(&mut state.broadcast, conn_id, Opcode::EnterWorld, &snapshot);
}

/// The full disconnect path: tear down the transport binding, pull the
/// entity from the world, and force-flush its state while the account claim
/// stays held.
pub fn disconnect(state: &mut GameState, conn_id: ConnId) {
    let Some(mut slot) = state.connections.remove(conn_id) else {
        return;
    };
    // Deliver any staged frames (typically the final ErrorResponse)
    // before the socket goes away.
    state.broadcast.flush_one(conn_id, &mut slot);
    slot.handle.close();
    state.heartbeats.forget(conn_id);

    let account_id = match slot.auth {
        ConnAuth::Authed(account_id) => account_id,
        _ => return,
    };

    let entity_id = state.conn_players.remove(&conn_id);
    state.accounts.remove(&account_id);
    state.chat_windows.remove(&account_id);

    // The player is either live in a channel or parked in a pending
    // transfer; both paths end in the same force-flush.
    let mut player = None;
    if let Some(id) = entity_id {
        if let Some((zone_id, channel_id)) = state.world.locate_player(id) {
            if let Some(removed) = state.world.remove_player(id) {
                if let Some(channel) = state.world.channel_mut(zone_id, channel_id) {
                    broadcast_near(
                        channel,
                        &mut state.broadcast,
                        removed.position,
                        Opcode::EntityDespawn,
                        &EntityDespawn { entity_id: id },
                    );
                }
                player = Some(removed);
            }
        }
    }
    if player.is_none() {
        player = state.transfers.remove(&account_id).map(|t| *t.player);
    }

    let Some(player) = player else {
        debug!(account = account_id, "disconnect with no live entity");
        return;
    };

    if let Some(udp) = &player.udp {
        state.secret_cache.remove(&udp.token);
    }

    let release = player.udp.as_ref().map(|udp| ReleaseSession {
        account_id,
        token: udp.token,
    });

    info!(
        account = account_id,
        entity = player.entity_id,
        "player disconnected, force-flushing"
    );

    state.persist.send(PersistJob::ForceFlush {
        state: player.state_snapshot(),
        belongings: Some(player.belongings_snapshot()),
        release,
        notify: None,
    });
}

