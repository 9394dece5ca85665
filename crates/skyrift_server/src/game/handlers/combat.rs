//! Target selection, skill casts, auto-attack toggling and stat spends.

use skyrift_protocol::messages::combat::{AutoAttackToggle, SelectTarget, UseSkill};
use skyrift_protocol::messages::entity::{EntityStatsUpdate, StatAllocate};
use skyrift_protocol::{ErrorCode, Opcode};

use super::{broadcast_damage, broadcast_near, stage_to_player};
use crate::entity::PLAYER_CRIT_CHANCE;
use crate::game::skill::{validate_use_skill, CasterFacts, TargetFacts};
use crate::game::{combat, GameState};
use crate::id::EntityId;
use crate::validate::stat_points_requested;

pub(super) fn handle_select_target(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: SelectTarget = skyrift_protocol::decode_payload(body)?;

    let channel = state
        .world
        .player_channel_mut(entity_id)
        .ok_or(ErrorCode::ServerError)?;

    if msg.target_id != 0 && channel.entity_alive(msg.target_id).is_none() {
        return Err(ErrorCode::TargetMissing);
    }

    let player = channel
        .players
        .get_mut(&entity_id)
        .ok_or(ErrorCode::ServerError)?;
    player.target_id = msg.target_id;

    Ok(())
}

pub(super) fn handle_auto_attack_toggle(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: AutoAttackToggle = skyrift_protocol::decode_payload(body)?;

    let player = state
        .world
        .player_mut(entity_id)
        .ok_or(ErrorCode::ServerError)?;
    player.auto_attack = msg.enabled;

    Ok(())
}

pub(super) fn handle_use_skill(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: UseSkill = skyrift_protocol::decode_payload(body)?;
    let now_ms = state.now_ms;
    let defs = state.defs.clone();

    let def = defs.skill(msg.skill_id);

    let channel = state
        .world
        .player_channel_mut(entity_id)
        .ok_or(ErrorCode::ServerError)?;

    // Gather the facts the validation chain needs.
    let (caster_facts, target_id, conn_id, caster_pos) = {
        let player = channel
            .players
            .get(&entity_id)
            .ok_or(ErrorCode::ServerError)?;

        let target_id = if msg.target_id != 0 {
            msg.target_id
        } else {
            player.target_id
        };

        (
            CasterFacts {
                learned_level: player.skills.get(&msg.skill_id).copied().unwrap_or(0),
                mp: player.mp,
                cooldown_ready: player.cooldown_ready(msg.skill_id, now_ms),
            },
            target_id,
            player.conn_id,
            player.position,
        )
    };

    let target_facts = match (
        channel.entity_alive(target_id),
        channel.entity_position(target_id),
    ) {
        (Some(alive), Some(position)) => Some(TargetFacts {
            alive,
            distance: caster_pos.distance(position),
        }),
        _ => None,
    };

    let learned_level = validate_use_skill(def, caster_facts, target_facts)?;
    let def = def.expect("validated above");

    // Pay the costs and stamp the cooldown.
    let attack_value = {
        let player = channel
            .players
            .get_mut(&entity_id)
            .ok_or(ErrorCode::ServerError)?;
        player.mp -= def.mp_cost;
        player
            .skill_cooldowns
            .insert(def.id, now_ms + def.cooldown_ms);
        player.mark_dirty();

        combat::skill_attack_value(player, &defs, def.base_damage, def.damage_per_level, learned_level)
    };

    let outcome = combat::resolve_hit(
        channel,
        &defs,
        &mut state.rng,
        entity_id,
        target_id,
        attack_value,
        PLAYER_CRIT_CHANCE,
    );

    if let Some(hit) = outcome {
        broadcast_damage(channel, &mut state.broadcast, &hit, def.id);
    }

    // The caster sees its MP change immediately.
    let stats = {
        let player = channel
            .players
            .get(&entity_id)
            .ok_or(ErrorCode::ServerError)?;
        EntityStatsUpdate {
            entity_id,
            hp: player.hp,
            max_hp: player.max_hp(),
            mp: player.mp,
            max_mp: player.max_mp(),
        }
    };
    stage_to_player(&mut state.broadcast, conn_id, Opcode::EntityStats, &stats);

    Ok(())
}

pub(super) fn handle_stat_allocate(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: StatAllocate = skyrift_protocol::decode_payload(body)?;

    let requested = stat_points_requested(&msg);
    if requested == 0 {
        return Err(ErrorCode::InputOutOfBounds);
    }

    let channel = state
        .world
        .player_channel_mut(entity_id)
        .ok_or(ErrorCode::ServerError)?;

    let (position, stats) = {
        let player = channel
            .players
            .get_mut(&entity_id)
            .ok_or(ErrorCode::ServerError)?;

        // The increments must sum to points the player actually has.
        if requested > u64::from(player.stats.unspent_points) {
            return Err(ErrorCode::StatOverdraw);
        }

        player.stats.strength += msg.strength;
        player.stats.stamina += msg.stamina;
        player.stats.dexterity += msg.dexterity;
        player.stats.intellect += msg.intellect;
        player.stats.unspent_points -= requested as u32;
        player.mark_dirty();

        (
            player.position,
            EntityStatsUpdate {
                entity_id,
                hp: player.hp,
                max_hp: player.max_hp(),
                mp: player.mp,
                max_mp: player.max_mp(),
            },
        )
    };

    broadcast_near(channel, &mut state.broadcast, position, Opcode::EntityStats, &stats);
    Ok(())
}
