//! Zone changes and channel switches.
//!
//! Both transitions follow the same shape: validate, despawn at the old
//! location, pull the entity out of the world, force-flush its state, and
//! let the FlushDone intent realise the placement. The player spends the
//! flush window parked in `GameState::transfers`.

use skyrift_protocol::messages::entity::EntityDespawn;
use skyrift_protocol::messages::zone::{ChannelList, ChannelSwitch, ZoneChange};
use skyrift_protocol::{ErrorCode, Opcode};
use tracing::{debug, warn};

use super::auth::send_world_snapshot;
use super::{broadcast_near, stage_to_player};
use crate::game::{GameState, PendingTransfer, TransferKind};
use crate::id::{AccountId, EntityId};
use crate::persist::{FlushNotice, PersistJob};

pub(super) fn handle_zone_change(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: ZoneChange = skyrift_protocol::decode_payload(body)?;
    let now_ms = state.now_ms;

    if state.world.zone(msg.zone_id).is_none() {
        return Err(ErrorCode::InputOutOfBounds);
    }

    let cooldown_ms = state.config.zone_change_cooldown_sec * 1000;
    {
        let player = state
            .world
            .player(entity_id)
            .ok_or(ErrorCode::ServerError)?;

        if player.zone_id == msg.zone_id {
            return Err(ErrorCode::InputOutOfBounds);
        }
        if player.last_zone_change_ms != 0
            && now_ms.saturating_sub(player.last_zone_change_ms) < cooldown_ms
        {
            return Err(ErrorCode::CooldownActive);
        }
        if state.transfers.contains_key(&player.account_id) {
            return Err(ErrorCode::CooldownActive);
        }
    }

    begin_transfer(state, entity_id, TransferKind::Zone { target: msg.zone_id })
}

pub(super) fn handle_channel_switch(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: ChannelSwitch = skyrift_protocol::decode_payload(body)?;
    let now_ms = state.now_ms;

    let cooldown_ms = state.config.channel_switch_cooldown_sec * 1000;
    let zone_id = {
        let player = state
            .world
            .player(entity_id)
            .ok_or(ErrorCode::ServerError)?;

        if player.channel_id == msg.channel_id {
            return Err(ErrorCode::InputOutOfBounds);
        }
        if player.last_channel_switch_ms != 0
            && now_ms.saturating_sub(player.last_channel_switch_ms) < cooldown_ms
        {
            return Err(ErrorCode::CooldownActive);
        }
        if state.transfers.contains_key(&player.account_id) {
            return Err(ErrorCode::CooldownActive);
        }
        player.zone_id
    };

    // Fail fast on a full or unknown channel; capacity is re-checked at
    // placement time anyway.
    match state.world.channel(zone_id, msg.channel_id) {
        None => return Err(ErrorCode::InputOutOfBounds),
        Some(channel) if !channel.has_capacity() => return Err(ErrorCode::ChannelFull),
        Some(_) => {}
    }

    begin_transfer(
        state,
        entity_id,
        TransferKind::Channel {
            target: msg.channel_id,
        },
    )
}

/// Steps 1–3 of the transition sequence: despawn broadcast, removal from
/// the old channel, force-flush dispatch. The rest happens in
/// [`complete_transfer`].
fn begin_transfer(
    state: &mut GameState,
    entity_id: EntityId,
    kind: TransferKind,
) -> Result<(), ErrorCode> {
    let Some((zone_id, channel_id)) = state.world.locate_player(entity_id) else {
        return Err(ErrorCode::ServerError);
    };

    let player = state
        .world
        .remove_player(entity_id)
        .ok_or(ErrorCode::ServerError)?;

    if let Some(channel) = state.world.channel_mut(zone_id, channel_id) {
        broadcast_near(
            channel,
            &mut state.broadcast,
            player.position,
            Opcode::EntityDespawn,
            &EntityDespawn { entity_id },
        );
    }

    let account_id = player.account_id;
    let snapshot = player.state_snapshot();

    state.transfers.insert(
        account_id,
        PendingTransfer {
            player: Box::new(player),
            kind,
        },
    );

    state.persist.send(PersistJob::ForceFlush {
        state: snapshot,
        belongings: None,
        release: None,
        notify: Some(FlushNotice::Transfer { account_id }),
    });

    Ok(())
}

/// Steps 4–6, run when the force-flush reports done: placement at the
/// destination, fresh snapshot, cooldown stamp.
pub(super) fn complete_transfer(state: &mut GameState, account_id: AccountId) {
    let Some(transfer) = state.transfers.remove(&account_id) else {
        // The player disconnected while the flush was in flight.
        debug!(account = account_id, "flush done for a vanished transfer");
        return;
    };

    let mut player = *transfer.player;
    let now_ms = state.now_ms;
    let conn_id = player.conn_id;
    let entity_id = player.entity_id;
    let old_zone = player.zone_id;

    let placed = match transfer.kind {
        TransferKind::Zone { target } => {
            let Some(zone) = state.world.zone(target) else {
                warn!(zone = target, "transfer target zone vanished");
                state.world.place_player(player, old_zone);
                return;
            };
            player.position = zone.spawn_point();
            player.rotation = 0.0;
            player.is_moving = false;
            player.pending_move = None;
            player.last_zone_change_ms = now_ms;
            player.mark_dirty();

            state.world.place_player(player, target).is_some()
        }
        TransferKind::Channel { target } => {
            player.last_channel_switch_ms = now_ms;
            player.mark_dirty();

            match state.world.place_player_in_channel(player, old_zone, target) {
                Ok(()) => true,
                Err(player) => {
                    // The channel filled while we were flushing; fall back
                    // to the best channel of the same zone.
                    stage_to_player_error(state, conn_id);
                    state.world.place_player(player, old_zone).is_some()
                }
            }
        }
    };

    if !placed {
        warn!(account = account_id, "failed to place transferred player");
        return;
    }

    // Announce the arrival and hand the client its new view of the world.
    super::auth::announce_spawn(state, entity_id);
    send_world_snapshot(state, conn_id, entity_id);
}

fn stage_to_player_error(state: &mut GameState, conn_id: crate::id::ConnId) {
    state
        .broadcast
        .stage_error(conn_id, Opcode::ChannelSwitch.to_raw(), ErrorCode::ChannelFull);
}

pub(super) fn handle_channel_list(
    state: &mut GameState,
    entity_id: EntityId,
) -> Result<(), ErrorCode> {
    let player = state
        .world
        .player(entity_id)
        .ok_or(ErrorCode::ServerError)?;
    let conn_id = player.conn_id;
    let zone_id = player.zone_id;

    let zone = state.world.zone(zone_id).ok_or(ErrorCode::ServerError)?;
    let packet = ChannelList {
        zone_id,
        channels: zone.channels.iter().map(|c| c.info()).collect(),
    };

    stage_to_player(&mut state.broadcast, conn_id, Opcode::ChannelList, &packet);
    Ok(())
}
