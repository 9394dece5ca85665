//! Packet handlers, dispatched from the tick's drain phase.
//!
//! Handlers mutate domain state in place and stage their replies; they
//! never perform I/O. A handler returns `Err(code)` to have the standard
//! error envelope staged for the offending request. Protocol-family errors
//! feed the per-connection malformed counter; authorisation-family errors
//! close the session outright.

mod auth;
mod combat;
mod items;
mod social;
mod zone;

use bytes::Bytes;
use prost::Message;
use skyrift_math::Vec3;
use skyrift_protocol::messages::combat::DamageEvent;
use skyrift_protocol::{ErrorCode, Opcode};
use tracing::debug;

pub use auth::disconnect;

use super::broadcast::BroadcastStage;
use super::combat::HitOutcome;
use super::GameState;
use crate::id::ConnId;
use crate::queue::InputEvent;
use crate::world::Channel;

pub fn dispatch(state: &mut GameState, event: InputEvent) {
    match event {
        InputEvent::Connected {
            conn_id,
            handle,
            ip,
        } => {
            state.connections.insert(conn_id, handle, ip, &state.config);
        }
        InputEvent::Frame {
            conn_id,
            opcode,
            body,
        } => handle_frame(state, conn_id, opcode, body),
        InputEvent::Datagram {
            token,
            opcode,
            payload,
            addr,
            ..
        } => handle_datagram(state, token, opcode, payload, addr),
        InputEvent::Disconnected { conn_id } => disconnect(state, conn_id),
        InputEvent::EnterWorldResolved { conn_id, outcome } => {
            auth::complete_enter_world(state, conn_id, outcome);
        }
        InputEvent::FlushDone { account_id } => zone::complete_transfer(state, account_id),
        InputEvent::Shutdown => {}
    }
}

fn handle_frame(state: &mut GameState, conn_id: ConnId, raw_opcode: u16, body: Bytes) {
    let Some(opcode) = Opcode::from_raw(raw_opcode) else {
        protocol_violation(state, conn_id, raw_opcode, ErrorCode::UnknownOpcode);
        return;
    };

    let result = match opcode {
        Opcode::EnterWorld => auth::handle_enter_world(state, conn_id, &body),
        Opcode::Heartbeat => social::handle_heartbeat(state, conn_id, &body),

        _ => match state.player_entity(conn_id) {
            None => Err(ErrorCode::Unauthenticated),
            Some(entity_id) => match opcode {
                Opcode::SelectTarget => combat::handle_select_target(state, entity_id, &body),
                Opcode::UseSkill => combat::handle_use_skill(state, entity_id, &body),
                Opcode::AutoAttackToggle => {
                    combat::handle_auto_attack_toggle(state, entity_id, &body)
                }
                Opcode::EntityStats => combat::handle_stat_allocate(state, entity_id, &body),
                Opcode::Inventory => items::handle_inventory_query(state, entity_id),
                Opcode::ItemMove => items::handle_item_move(state, entity_id, &body),
                Opcode::ItemEquip => items::handle_equip(state, entity_id, &body),
                Opcode::ItemUnequip => items::handle_unequip(state, entity_id, &body),
                Opcode::VendorBuy => items::handle_vendor_buy(state, entity_id, &body),
                Opcode::VendorSell => items::handle_vendor_sell(state, entity_id, &body),
                Opcode::LootPickup => items::handle_loot_pickup(state, entity_id, &body),
                Opcode::ChatSend => social::handle_chat(state, entity_id, &body),
                Opcode::ZoneChange => zone::handle_zone_change(state, entity_id, &body),
                Opcode::ChannelSwitch => zone::handle_channel_switch(state, entity_id, &body),
                Opcode::ChannelList => zone::handle_channel_list(state, entity_id),
                // Login-service opcodes and server-to-client opcodes have
                // no business arriving here.
                _ => Err(ErrorCode::UnknownOpcode),
            },
        },
    };

    if let Err(code) = result {
        if code.code() < 200 {
            protocol_violation(state, conn_id, raw_opcode, code);
        } else {
            state.broadcast.stage_error(conn_id, raw_opcode, code);
            if code.is_fatal() {
                disconnect(state, conn_id);
            }
        }
    }
}

/// Counts a protocol violation against the connection's malformed budget
/// and terminates the session once the budget is spent.
fn protocol_violation(state: &mut GameState, conn_id: ConnId, raw_opcode: u16, code: ErrorCode) {
    state.broadcast.stage_error(conn_id, raw_opcode, code);

    let now_ms = state.now_ms;
    let Some(slot) = state.connections.get_mut(conn_id) else {
        return;
    };

    if !slot.malformed.allow(now_ms) {
        debug!(conn = conn_id, "malformed budget exceeded, terminating session");
        disconnect(state, conn_id);
    }
}

/// Authenticated datagrams. Only real-time opcodes are meaningful; anything
/// else inside a datagram is dropped silently, matching the UDP policy of
/// never answering bad traffic.
fn handle_datagram(
    state: &mut GameState,
    token: skyrift_protocol::SessionToken,
    raw_opcode: u16,
    payload: Bytes,
    addr: std::net::SocketAddr,
) {
    let Some(session) = state.secret_cache.get(&token) else {
        return;
    };
    let Some(&entity_id) = state.accounts.get(&session.account_id) else {
        return;
    };

    match Opcode::from_raw(raw_opcode) {
        Some(Opcode::MovementInput) => {
            let Ok(input) =
                skyrift_protocol::messages::movement::MovementInput::decode(&payload[..])
            else {
                return;
            };

            // First authenticated datagram teaches us where to send
            // real-time traffic for this player.
            if let Some(player) = state.world.player_mut(entity_id) {
                if let Some(udp) = player.udp.as_mut() {
                    udp.addr = Some(addr);
                }
            }

            super::movement::handle_movement_input(state, entity_id, input);
        }
        _ => {}
    }
}

/// Stages `msg` for every player whose interest set covers `center`.
pub fn broadcast_near<M: Message>(
    channel: &Channel,
    stage: &mut BroadcastStage,
    center: Vec3,
    opcode: Opcode,
    msg: &M,
) {
    for entity_id in channel.nearby_players(center.x, center.z) {
        if let Some(player) = channel.players.get(&entity_id) {
            stage.stage(player.conn_id, opcode, msg);
        }
    }
}

/// Stages `msg` for one specific connection.
pub fn stage_to_player<M: Message>(
    stage: &mut BroadcastStage,
    conn_id: ConnId,
    opcode: Opcode,
    msg: &M,
) {
    stage.stage(conn_id, opcode, msg);
}

/// Fans a resolved hit out to the interest set around the target.
pub fn broadcast_damage(
    channel: &Channel,
    stage: &mut BroadcastStage,
    hit: &HitOutcome,
    skill_id: u32,
) {
    let center = channel
        .entity_position(hit.target_id)
        .or_else(|| channel.entity_position(hit.attacker_id))
        .unwrap_or(Vec3::ZERO);

    broadcast_near(
        channel,
        stage,
        center,
        Opcode::DamageEvent,
        &DamageEvent {
            attacker_id: hit.attacker_id,
            target_id: hit.target_id,
            amount: hit.amount,
            skill_id,
            critical: hit.critical,
            target_hp: hit.target_hp_after,
        },
    );
}
