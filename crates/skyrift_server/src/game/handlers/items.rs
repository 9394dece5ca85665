//! Inventory, equipment, vendor and loot-pickup handlers.
//!
//! Every mutation here persists through the direct transactional path
//! (`SaveBelongings`), never the write-back cache: belongings are the most
//! exploit-sensitive state the server owns.

use skyrift_math::vec3;
use skyrift_protocol::messages::entity::EntityDespawn;
use skyrift_protocol::messages::inventory::{
    EquipmentSlot, GoldUpdate, InventoryContent, InventorySlot, ItemEquip, ItemMove, ItemUnequip,
    LootPickup, VendorBuy, VendorSell,
};
use skyrift_protocol::{ErrorCode, Opcode};

use super::{broadcast_near, stage_to_player};
use crate::entity::{Inventory, Player};
use crate::game::GameState;
use crate::id::EntityId;
use crate::persist::PersistJob;
use crate::validate::within_range;

/// How close a player must stand to pick a drop off the ground.
const PICKUP_RANGE: f32 = 5.0;

/// Most items a single vendor transaction may move.
const VENDOR_MAX_AMOUNT: u32 = 999;

fn vendor_price(unit_price: u64, amount: u32) -> u64 {
    unit_price.saturating_mul(u64::from(amount))
}

fn content_packet(player: &Player) -> InventoryContent {
    let mut slots: Vec<InventorySlot> = player
        .inventory
        .iter()
        .map(|(slot, stack)| InventorySlot {
            slot,
            item_def_id: stack.item_def_id,
            amount: stack.amount,
            enhancement: stack.enhancement,
        })
        .collect();
    slots.sort_unstable_by_key(|s| s.slot);

    let mut equipment: Vec<EquipmentSlot> = player
        .equipment
        .iter()
        .map(|(&slot_type, &inventory_slot)| EquipmentSlot {
            slot_type: slot_type.to_raw(),
            inventory_slot,
        })
        .collect();
    equipment.sort_unstable_by_key(|e| e.slot_type);

    InventoryContent {
        slots,
        equipment,
        gold: player.gold,
    }
}

/// Replies with the current content and queues the transactional save.
fn commit_belongings(state: &mut GameState, entity_id: EntityId) -> Result<(), ErrorCode> {
    let player = state
        .world
        .player(entity_id)
        .ok_or(ErrorCode::ServerError)?;

    let content = content_packet(player);
    let snapshot = player.belongings_snapshot();
    let conn_id = player.conn_id;

    stage_to_player(&mut state.broadcast, conn_id, Opcode::Inventory, &content);
    state.persist.send(PersistJob::SaveBelongings { snapshot });
    Ok(())
}

pub(super) fn handle_inventory_query(
    state: &mut GameState,
    entity_id: EntityId,
) -> Result<(), ErrorCode> {
    let player = state
        .world
        .player(entity_id)
        .ok_or(ErrorCode::ServerError)?;
    let content = content_packet(player);
    let conn_id = player.conn_id;

    stage_to_player(&mut state.broadcast, conn_id, Opcode::Inventory, &content);
    Ok(())
}

pub(super) fn handle_item_move(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: ItemMove = skyrift_protocol::decode_payload(body)?;
    let defs = state.defs.clone();

    {
        let player = state
            .world
            .player_mut(entity_id)
            .ok_or(ErrorCode::ServerError)?;

        player.inventory.move_stack(msg.from_slot, msg.to_slot, &defs)?;

        // Equipment references inventory slots by number; keep them
        // pointing at the stacks they were bound to.
        for slot in player.equipment.values_mut() {
            if *slot == msg.from_slot {
                *slot = msg.to_slot;
            } else if *slot == msg.to_slot {
                *slot = msg.from_slot;
            }
        }
    }

    commit_belongings(state, entity_id)
}

pub(super) fn handle_equip(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: ItemEquip = skyrift_protocol::decode_payload(body)?;
    let defs = state.defs.clone();

    {
        let player = state
            .world
            .player_mut(entity_id)
            .ok_or(ErrorCode::ServerError)?;

        if !Inventory::is_valid_slot(msg.inventory_slot) {
            return Err(ErrorCode::BadSlot);
        }
        let stack = player
            .inventory
            .get(msg.inventory_slot)
            .ok_or(ErrorCode::BadSlot)?;
        let def = defs
            .item(stack.item_def_id)
            .ok_or(ErrorCode::ServerError)?;
        let slot_type = def.equip_slot.ok_or(ErrorCode::BadSlot)?;

        if player.level < def.required_level {
            return Err(ErrorCode::InputOutOfBounds);
        }

        player.equipment.insert(slot_type, msg.inventory_slot);
    }

    commit_belongings(state, entity_id)
}

pub(super) fn handle_unequip(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: ItemUnequip = skyrift_protocol::decode_payload(body)?;

    {
        let player = state
            .world
            .player_mut(entity_id)
            .ok_or(ErrorCode::ServerError)?;

        let slot_type = skyrift_registry::EquipSlotType::from_raw(msg.slot_type)
            .ok_or(ErrorCode::BadSlot)?;
        if player.equipment.remove(&slot_type).is_none() {
            return Err(ErrorCode::BadSlot);
        }
    }

    commit_belongings(state, entity_id)
}

/// Shared vendor gate: the NPC exists, lives in the player's zone, and the
/// player stands within interaction range.
fn vendor_gate(
    state: &GameState,
    entity_id: EntityId,
    npc_id: u64,
) -> Result<&skyrift_registry::NpcDef, ErrorCode> {
    let player = state
        .world
        .player(entity_id)
        .ok_or(ErrorCode::ServerError)?;

    let (zone, npc) = state.defs.npc(npc_id).ok_or(ErrorCode::TargetMissing)?;
    if zone.id != player.zone_id {
        return Err(ErrorCode::TargetMissing);
    }

    let npc_pos = vec3(npc.x, npc.y, npc.z);
    if !within_range(player.position, npc_pos, state.config.npc_interact_range) {
        return Err(ErrorCode::OutOfRange);
    }

    Ok(npc)
}

pub(super) fn handle_vendor_buy(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: VendorBuy = skyrift_protocol::decode_payload(body)?;
    let defs = state.defs.clone();

    if msg.amount == 0 || msg.amount > VENDOR_MAX_AMOUNT {
        return Err(ErrorCode::InputOutOfBounds);
    }

    let npc = vendor_gate(state, entity_id, msg.npc_id)?;
    if !npc.sells.contains(&msg.item_def_id) {
        return Err(ErrorCode::InputOutOfBounds);
    }

    let def = defs.item(msg.item_def_id).ok_or(ErrorCode::ServerError)?;
    let cost = vendor_price(def.buy_price, msg.amount);

    {
        let player = state
            .world
            .player_mut(entity_id)
            .ok_or(ErrorCode::ServerError)?;

        if player.gold < cost {
            return Err(ErrorCode::NotEnoughGold);
        }

        player.inventory.add(def, msg.amount, 0)?;
        player.gold -= cost;
        player.mark_dirty();
    }

    gold_update(state, entity_id);
    commit_belongings(state, entity_id)
}

pub(super) fn handle_vendor_sell(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: VendorSell = skyrift_protocol::decode_payload(body)?;
    let defs = state.defs.clone();

    if msg.amount == 0 || msg.amount > VENDOR_MAX_AMOUNT {
        return Err(ErrorCode::InputOutOfBounds);
    }

    vendor_gate(state, entity_id, msg.npc_id)?;

    {
        let player = state
            .world
            .player_mut(entity_id)
            .ok_or(ErrorCode::ServerError)?;

        let stack = player.inventory.get(msg.slot).ok_or(ErrorCode::BadSlot)?;
        let def = defs.item(stack.item_def_id).ok_or(ErrorCode::ServerError)?;

        // Worn gear cannot be sold out from under the equipment map.
        if player.equipment.values().any(|&s| s == msg.slot) {
            return Err(ErrorCode::BadSlot);
        }

        let proceeds = vendor_price(def.sell_price, msg.amount);
        player.inventory.remove(msg.slot, msg.amount)?;
        player.gold = player.gold.saturating_add(proceeds);
        player.mark_dirty();
    }

    gold_update(state, entity_id);
    commit_belongings(state, entity_id)
}

pub(super) fn handle_loot_pickup(
    state: &mut GameState,
    entity_id: EntityId,
    body: &[u8],
) -> Result<(), ErrorCode> {
    let msg: LootPickup = skyrift_protocol::decode_payload(body)?;
    let now_ms = state.now_ms;
    let defs = state.defs.clone();

    let channel = state
        .world
        .player_channel_mut(entity_id)
        .ok_or(ErrorCode::ServerError)?;

    let (item_def_id, amount, position) = {
        let drop = channel
            .loot
            .get(&msg.loot_id)
            .ok_or(ErrorCode::TargetMissing)?;
        let player = channel
            .players
            .get(&entity_id)
            .ok_or(ErrorCode::ServerError)?;

        if !within_range(player.position, drop.position, PICKUP_RANGE) {
            return Err(ErrorCode::OutOfRange);
        }
        if !drop.pickup_allowed(entity_id, now_ms) {
            return Err(ErrorCode::LootProtected);
        }

        (drop.item_def_id, drop.amount, drop.position)
    };

    let def = defs.item(item_def_id).ok_or(ErrorCode::ServerError)?;

    {
        let player = channel
            .players
            .get_mut(&entity_id)
            .ok_or(ErrorCode::ServerError)?;
        // A full bag leaves the drop on the ground.
        player.inventory.add(def, amount, 0)?;
        player.mark_dirty();
    }

    channel.remove_loot(msg.loot_id);
    broadcast_near(
        channel,
        &mut state.broadcast,
        position,
        Opcode::EntityDespawn,
        &EntityDespawn {
            entity_id: msg.loot_id,
        },
    );

    commit_belongings(state, entity_id)
}

fn gold_update(state: &mut GameState, entity_id: EntityId) {
    if let Some(player) = state.world.player(entity_id) {
        let packet = GoldUpdate { gold: player.gold };
        let conn_id = player.conn_id;
        // GoldUpdate is the server→client meaning of the 0x0407 opcode.
        stage_to_player(&mut state.broadcast, conn_id, Opcode::LootPickup, &packet);
    }
}
