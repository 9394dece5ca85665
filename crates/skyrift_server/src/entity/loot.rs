use skyrift_math::Vec3;
use skyrift_protocol::messages::entity::{entity_kind, EntitySpawn};

use crate::id::EntityId;

/// Loot drops vanish this long after spawning if nobody picks them up.
pub const LOOT_DESPAWN_MS: u64 = 120_000;

/// A loot drop on the ground.
pub struct LootDrop {
    pub entity_id: EntityId,
    pub item_def_id: u32,
    pub item_name: String,
    pub amount: u32,
    pub position: Vec3,
    /// The killer, holding exclusive pickup rights until `owned_until_ms`.
    pub owner_id: EntityId,
    pub owned_until_ms: u64,
    pub despawn_at_ms: u64,
}

impl LootDrop {
    /// Whether `picker` may take this drop at `now_ms`.
    pub fn pickup_allowed(&self, picker: EntityId, now_ms: u64) -> bool {
        picker == self.owner_id || now_ms >= self.owned_until_ms
    }

    pub fn spawn_packet(&self) -> EntitySpawn {
        EntitySpawn {
            entity_id: self.entity_id,
            kind: entity_kind::LOOT,
            name: self.item_name.clone(),
            definition_id: self.item_def_id,
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            rotation: 0.0,
            hp: 0,
            max_hp: 0,
            level: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_window() {
        let drop = LootDrop {
            entity_id: 1 << 33,
            item_def_id: 10,
            item_name: "Wisp Dust".to_owned(),
            amount: 1,
            position: Vec3::ZERO,
            owner_id: 42,
            owned_until_ms: 30_000,
            despawn_at_ms: 120_000,
        };

        assert!(drop.pickup_allowed(42, 0), "owner may always pick up");
        assert!(!drop.pickup_allowed(7, 10_000), "stranger denied inside the window");
        assert!(drop.pickup_allowed(7, 31_000), "free for all after the window");
        assert!(drop.pickup_allowed(7, 30_000), "window edge is inclusive");
    }
}
