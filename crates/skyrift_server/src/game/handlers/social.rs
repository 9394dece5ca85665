//! Heartbeats and chat.

use skyrift_protocol::messages::chat::{ChatBroadcast, ChatSend, MAX_CHAT_LEN};
use skyrift_protocol::messages::system::Heartbeat;
use skyrift_protocol::{ErrorCode, Opcode};

use super::{broadcast_near, stage_to_player};
use crate::game::GameState;
use crate::id::{ConnId, EntityId};

pub(super) fn handle_heartbeat(
    state: &mut GameState,
    conn_id: ConnId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: Heartbeat = skyrift_protocol::decode_payload(body)?;

    // Stamping an untracked (pre-auth) connection is a no-op; pre-auth
    // liveness is the idle timeout's job.
    state.heartbeats.beat(conn_id);
    stage_to_player(&mut state.broadcast, conn_id, Opcode::Heartbeat, &msg);
    Ok(())
}

pub(super) fn handle_chat(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: ChatSend = skyrift_protocol::decode_payload(body)?;
    let now_ms = state.now_ms;

    if msg.text.chars().count() > MAX_CHAT_LEN {
        return Err(ErrorCode::ChatTooLong);
    }
    if msg.text.trim().is_empty() {
        return Err(ErrorCode::InputOutOfBounds);
    }

    let (account_id, name, position) = {
        let player = state
            .world
            .player(entity_id)
            .ok_or(ErrorCode::ServerError)?;
        (player.account_id, player.name.clone(), player.position)
    };

    if !state.chat_window(account_id).allow(now_ms) {
        return Err(ErrorCode::RateLimited);
    }

    let packet = ChatBroadcast {
        entity_id,
        name,
        text: msg.text,
    };

    let channel = state
        .world
        .player_channel_mut(entity_id)
        .ok_or(ErrorCode::ServerError)?;
    broadcast_near(channel, &mut state.broadcast, position, Opcode::ChatBroadcast, &packet);

    Ok(())
}
