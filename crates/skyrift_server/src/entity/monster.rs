use skyrift_math::Vec3;
use skyrift_protocol::messages::entity::{entity_kind, EntitySpawn};
use skyrift_registry::MonsterDef;

use crate::id::EntityId;

/// Maximum distance a monster pursues a target away from its spawn before
/// giving up and walking home.
pub const LEASH_DISTANCE: f32 = 40.0;

/// The monster AI states. Transitions are driven once per tick by the AI
/// phase; `Dead` is entered by the death phase, never by the AI itself.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AiState {
    Idle,
    Aggro,
    Attack,
    Return,
    Dead,
}

pub struct Monster {
    pub entity_id: EntityId,
    pub def_id: u32,
    pub name: String,

    pub position: Vec3,
    pub spawn_point: Vec3,
    pub spawn_radius: f32,

    pub hp: u32,
    pub max_hp: u32,
    pub attack: u32,
    pub defense: u32,
    pub level: u32,
    pub xp_reward: u64,

    pub aggro_range: f32,
    pub attack_range: f32,
    pub attack_speed_ms: u64,
    pub move_speed: f32,
    pub respawn_ms: u64,

    pub ai_state: AiState,
    /// Current pursuit target; zero when none.
    pub target_id: EntityId,
    /// The entity that most recently damaged this monster; credited as the
    /// killer on death.
    pub last_attacker: EntityId,
    pub last_attack_ms: u64,
    pub death_ms: u64,
}

impl Monster {
    pub fn from_def(entity_id: EntityId, def: &MonsterDef, position: Vec3, radius: f32) -> Self {
        Self {
            entity_id,
            def_id: def.id,
            name: def.name.clone(),
            position,
            spawn_point: position,
            spawn_radius: radius,
            hp: def.max_hp,
            max_hp: def.max_hp,
            attack: def.attack,
            defense: def.defense,
            level: def.level,
            xp_reward: def.xp_reward,
            aggro_range: def.aggro_range,
            attack_range: def.attack_range,
            attack_speed_ms: def.attack_speed_ms,
            move_speed: def.move_speed,
            respawn_ms: def.respawn_ms,
            ai_state: AiState::Idle,
            target_id: 0,
            last_attacker: 0,
            last_attack_ms: 0,
            death_ms: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Whether a dead monster is due back at `now_ms`.
    pub fn can_respawn(&self, now_ms: u64) -> bool {
        self.ai_state == AiState::Dead && now_ms.saturating_sub(self.death_ms) >= self.respawn_ms
    }

    /// Resets the monster to full health at its spawn point.
    pub fn respawn(&mut self) {
        self.hp = self.max_hp;
        self.position = self.spawn_point;
        self.ai_state = AiState::Idle;
        self.target_id = 0;
        self.last_attacker = 0;
        self.last_attack_ms = 0;
        self.death_ms = 0;
    }

    pub fn spawn_packet(&self) -> EntitySpawn {
        EntitySpawn {
            entity_id: self.entity_id,
            kind: entity_kind::MONSTER,
            name: self.name.clone(),
            definition_id: self.def_id,
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            rotation: 0.0,
            hp: self.hp,
            max_hp: self.max_hp,
            level: self.level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> MonsterDef {
        MonsterDef {
            id: 3,
            name: "Forest Wisp".to_owned(),
            level: 2,
            max_hp: 80,
            attack: 7,
            defense: 1,
            xp_reward: 25,
            aggro_range: 15.0,
            attack_range: 2.0,
            attack_speed_ms: 1500,
            move_speed: 3.0,
            respawn_ms: 5000,
            loot: vec![],
        }
    }

    #[test]
    fn respawn_timing() {
        let mut m = Monster::from_def(1 << 32, &def(), Vec3::ZERO, 0.0);
        assert!(!m.can_respawn(0), "alive monsters never respawn");

        m.hp = 0;
        m.ai_state = AiState::Dead;
        m.death_ms = 1000;

        assert!(!m.can_respawn(5999));
        assert!(m.can_respawn(6000));

        m.respawn();
        assert_eq!(m.hp, m.max_hp);
        assert_eq!(m.ai_state, AiState::Idle);
        assert_eq!(m.position, m.spawn_point);
    }
}
