//! Integer identifier spaces.
//!
//! Every cross-entity reference in the domain is an ID, never a handle; the
//! per-channel entity tables are the only place an actual record lives.
//! Entity IDs are partitioned so the kind of an entity is recoverable from
//! the bare number.

pub type AccountId = i64;
pub type CharacterId = i64;
pub type EntityId = u64;
pub type ZoneId = u32;
pub type ChannelId = u32;

/// Identifies one accepted transport connection for its whole lifetime.
pub type ConnId = u64;

/// First monster entity ID; everything below is a player.
pub const MONSTER_ID_BASE: EntityId = 1 << 32;

/// First loot entity ID.
pub const LOOT_ID_BASE: EntityId = 1 << 33;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EntityKind {
    Player,
    Monster,
    Loot,
}

impl EntityKind {
    pub const fn of(id: EntityId) -> Self {
        if id >= LOOT_ID_BASE {
            Self::Loot
        } else if id >= MONSTER_ID_BASE {
            Self::Monster
        } else {
            Self::Player
        }
    }
}

/// Monotonic allocator for one ID partition.
#[derive(Debug)]
pub struct IdAllocator {
    next: EntityId,
}

impl IdAllocator {
    pub const fn starting_at(base: EntityId) -> Self {
        Self {
            next: if base > 1 { base } else { 1 },
        }
    }

    pub fn allocate(&mut self) -> EntityId {
        let id = self.next;
        self.next += 1;
        id
    }
}
