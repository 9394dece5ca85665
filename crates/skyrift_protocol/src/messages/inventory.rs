//! Inventory, equipment, vendor and loot payloads.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct InventoryQuery {}

#[derive(Clone, PartialEq, Message)]
pub struct InventorySlot {
    #[prost(uint32, tag = "1")]
    pub slot: u32,
    #[prost(uint32, tag = "2")]
    pub item_def_id: u32,
    #[prost(uint32, tag = "3")]
    pub amount: u32,
    #[prost(uint32, tag = "4")]
    pub enhancement: u32,
}

/// Full inventory refresh. Sent in reply to queries and after any mutation.
#[derive(Clone, PartialEq, Message)]
pub struct InventoryContent {
    #[prost(message, repeated, tag = "1")]
    pub slots: Vec<InventorySlot>,
    /// Equipped slots as (slot_type, inventory_slot) pairs.
    #[prost(message, repeated, tag = "2")]
    pub equipment: Vec<EquipmentSlot>,
    #[prost(uint64, tag = "3")]
    pub gold: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct EquipmentSlot {
    #[prost(uint32, tag = "1")]
    pub slot_type: u32,
    #[prost(uint32, tag = "2")]
    pub inventory_slot: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ItemMove {
    #[prost(uint32, tag = "1")]
    pub from_slot: u32,
    #[prost(uint32, tag = "2")]
    pub to_slot: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ItemEquip {
    #[prost(uint32, tag = "1")]
    pub inventory_slot: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ItemUnequip {
    #[prost(uint32, tag = "1")]
    pub slot_type: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VendorBuy {
    #[prost(uint64, tag = "1")]
    pub npc_id: u64,
    #[prost(uint32, tag = "2")]
    pub item_def_id: u32,
    #[prost(uint32, tag = "3")]
    pub amount: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VendorSell {
    #[prost(uint64, tag = "1")]
    pub npc_id: u64,
    #[prost(uint32, tag = "2")]
    pub slot: u32,
    #[prost(uint32, tag = "3")]
    pub amount: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct LootPickup {
    #[prost(uint64, tag = "1")]
    pub loot_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GoldUpdate {
    #[prost(uint64, tag = "1")]
    pub gold: u64,
}
