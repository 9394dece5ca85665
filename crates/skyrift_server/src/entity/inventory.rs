use rustc_hash::FxHashMap;
use skyrift_protocol::ErrorCode;
use skyrift_registry::{GameDefs, ItemDef};

/// Inventory slots per character.
pub const INVENTORY_SLOTS: u32 = 100;

/// Enhancement levels run 0..=10.
pub const EQUIP_MAX_ENHANCEMENT: u32 = 10;

#[derive(Copy, Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub struct ItemStack {
    pub item_def_id: u32,
    pub amount: u32,
    pub enhancement: u32,
}

/// A character's bag: sparse slot map over `0..INVENTORY_SLOTS`.
///
/// Mutations here only touch RAM; the owning handler persists the result
/// through the transactional belongings path, never the write-back cache.
#[derive(Clone, Default, Debug)]
pub struct Inventory {
    slots: FxHashMap<u32, ItemStack>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: impl IntoIterator<Item = (u32, ItemStack)>) -> Self {
        Self {
            slots: slots.into_iter().collect(),
        }
    }

    pub fn get(&self, slot: u32) -> Option<&ItemStack> {
        self.slots.get(&slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ItemStack)> {
        self.slots.iter().map(|(&slot, stack)| (slot, stack))
    }

    pub fn is_valid_slot(slot: u32) -> bool {
        slot < INVENTORY_SLOTS
    }

    /// Adds `amount` of an item, stacking onto existing stacks first and
    /// then filling the lowest free slots. Nothing is added if the full
    /// amount does not fit.
    pub fn add(&mut self, def: &ItemDef, amount: u32, enhancement: u32) -> Result<(), ErrorCode> {
        let mut remaining = amount;

        // Capacity dry-run over existing stacks and free slots.
        let mut stackable = 0_u32;
        if def.max_stack > 1 {
            for stack in self.slots.values() {
                if stack.item_def_id == def.id && stack.enhancement == enhancement {
                    stackable += def.max_stack.saturating_sub(stack.amount);
                }
            }
        }
        let free_slots =
            (0..INVENTORY_SLOTS).filter(|s| !self.slots.contains_key(s)).count() as u32;

        if u64::from(stackable) + u64::from(free_slots) * u64::from(def.max_stack)
            < u64::from(remaining)
        {
            return Err(ErrorCode::InventoryFull);
        }

        if def.max_stack > 1 {
            for stack in self.slots.values_mut() {
                if remaining == 0 {
                    break;
                }
                if stack.item_def_id == def.id && stack.enhancement == enhancement {
                    let take = remaining.min(def.max_stack - stack.amount);
                    stack.amount += take;
                    remaining -= take;
                }
            }
        }

        let mut slot = 0;
        while remaining > 0 {
            debug_assert!(slot < INVENTORY_SLOTS, "capacity dry-run was wrong");
            if !self.slots.contains_key(&slot) {
                let take = remaining.min(def.max_stack);
                self.slots.insert(
                    slot,
                    ItemStack {
                        item_def_id: def.id,
                        amount: take,
                        enhancement,
                    },
                );
                remaining -= take;
            }
            slot += 1;
        }

        Ok(())
    }

    /// Removes `amount` items from one slot, deleting the stack when it
    /// empties.
    pub fn remove(&mut self, slot: u32, amount: u32) -> Result<ItemStack, ErrorCode> {
        let stack = self.slots.get_mut(&slot).ok_or(ErrorCode::BadSlot)?;

        if stack.amount < amount {
            return Err(ErrorCode::NotEnoughItems);
        }

        let removed = ItemStack {
            amount,
            ..*stack
        };

        stack.amount -= amount;
        if stack.amount == 0 {
            self.slots.remove(&slot);
        }

        Ok(removed)
    }

    /// Moves or swaps the contents of two slots, merging compatible stacks.
    pub fn move_stack(&mut self, from: u32, to: u32, defs: &GameDefs) -> Result<(), ErrorCode> {
        if !Self::is_valid_slot(from) || !Self::is_valid_slot(to) || from == to {
            return Err(ErrorCode::BadSlot);
        }

        let src = *self.slots.get(&from).ok_or(ErrorCode::BadSlot)?;

        match self.slots.get(&to).copied() {
            None => {
                self.slots.remove(&from);
                self.slots.insert(to, src);
            }
            Some(dst)
                if dst.item_def_id == src.item_def_id && dst.enhancement == src.enhancement =>
            {
                let max_stack = defs
                    .item(src.item_def_id)
                    .map(|d| d.max_stack)
                    .unwrap_or(1);
                let merged = remaining_merge(src.amount, dst.amount, max_stack);

                match merged {
                    (0, dst_amount) => {
                        self.slots.remove(&from);
                        self.slots.get_mut(&to).unwrap().amount = dst_amount;
                    }
                    (src_amount, dst_amount) => {
                        self.slots.get_mut(&from).unwrap().amount = src_amount;
                        self.slots.get_mut(&to).unwrap().amount = dst_amount;
                    }
                }
            }
            Some(dst) => {
                // Plain swap.
                self.slots.insert(from, dst);
                self.slots.insert(to, src);
            }
        }

        Ok(())
    }

    pub fn count_of(&self, item_def_id: u32) -> u64 {
        self.slots
            .values()
            .filter(|s| s.item_def_id == item_def_id)
            .map(|s| u64::from(s.amount))
            .sum()
    }
}

fn remaining_merge(src: u32, dst: u32, max_stack: u32) -> (u32, u32) {
    let space = max_stack.saturating_sub(dst);
    let moved = src.min(space);
    (src - moved, dst + moved)
}
