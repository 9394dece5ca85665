//! Deterministic damage resolution.
//!
//! All integer arithmetic. The attacker's effective attack value is
//! computed by the caller (plain attack power for auto-attacks, skill
//! attack for skills); this module rolls variance and crits and applies the
//! result to the target.

use rand::Rng;
use skyrift_registry::GameDefs;

use crate::entity::Player;
use crate::id::{EntityId, EntityKind};
use crate::world::Channel;

/// Hits never resolve below this.
pub const MIN_DAMAGE: u32 = 1;

/// Melee auto-attack reach for players, world units.
pub const AUTO_ATTACK_RANGE: f32 = 2.5;

/// Player auto-attack cooldown.
pub const AUTO_ATTACK_COOLDOWN_MS: u64 = 1500;

/// One resolved hit, ready to broadcast.
#[derive(Copy, Clone, Debug)]
pub struct HitOutcome {
    pub attacker_id: EntityId,
    pub target_id: EntityId,
    pub amount: u32,
    pub critical: bool,
    pub target_hp_after: u32,
}

/// Rolls the damage formula: `raw = attack − defense + uniform(−2, +2)`,
/// ×1.5 on crit, floored at [`MIN_DAMAGE`].
pub fn roll_damage(
    rng: &mut impl Rng,
    attack: i64,
    defense: i64,
    crit_chance: f64,
) -> (u32, bool) {
    let mut raw = attack - defense + rng.gen_range(-2..=2);

    let critical = crit_chance > 0.0 && rng.gen::<f64>() < crit_chance;
    if critical {
        raw = raw * 3 / 2;
    }

    (raw.max(i64::from(MIN_DAMAGE)) as u32, critical)
}

/// Applies a rolled hit to whatever entity `target_id` names in the
/// channel. Returns `None` if the target is gone or already dead.
pub fn resolve_hit(
    channel: &mut Channel,
    defs: &GameDefs,
    rng: &mut impl Rng,
    attacker_id: EntityId,
    target_id: EntityId,
    attack_value: i64,
    crit_chance: f64,
) -> Option<HitOutcome> {
    let defense = i64::from(target_defense(channel, defs, target_id)?);
    let (amount, critical) = roll_damage(rng, attack_value, defense, crit_chance);

    let hp_after = match EntityKind::of(target_id) {
        EntityKind::Player => {
            let target = channel.players.get_mut(&target_id)?;
            if !target.is_alive() {
                return None;
            }
            target.hp = target.hp.saturating_sub(amount);
            target.last_attacker = attacker_id;
            target.mark_dirty();
            target.hp
        }
        EntityKind::Monster => {
            let target = channel.monsters.get_mut(&target_id)?;
            if !target.is_alive() {
                return None;
            }
            target.hp = target.hp.saturating_sub(amount);
            target.last_attacker = attacker_id;
            target.hp
        }
        EntityKind::Loot => return None,
    };

    Some(HitOutcome {
        attacker_id,
        target_id,
        amount,
        critical,
        target_hp_after: hp_after,
    })
}

fn target_defense(channel: &Channel, defs: &GameDefs, target_id: EntityId) -> Option<u32> {
    match EntityKind::of(target_id) {
        EntityKind::Player => channel
            .players
            .get(&target_id)
            .map(|p| p.equip_defense(defs)),
        EntityKind::Monster => channel.monsters.get(&target_id).map(|m| m.defense),
        EntityKind::Loot => None,
    }
}

/// Attack value of a skill cast: attack power plus the skill's base damage
/// plus its per-level scaling at the caster's learned level.
pub fn skill_attack_value(
    player: &Player,
    defs: &GameDefs,
    base_damage: u32,
    damage_per_level: u32,
    skill_level: u32,
) -> i64 {
    i64::from(player.attack_power(defs))
        + i64::from(base_damage)
        + i64::from(skill_level) * i64::from(damage_per_level)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn damage_stays_in_the_variance_band() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let (dmg, crit) = roll_damage(&mut rng, 63, 0, 0.0);
            assert!(!crit);
            assert!((61..=65).contains(&dmg), "rolled {dmg}");
        }
    }

    #[test]
    fn defense_reduces_and_floor_holds() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let (dmg, _) = roll_damage(&mut rng, 5, 100, 0.0);
            assert_eq!(dmg, MIN_DAMAGE, "overwhelming defense still leaks 1");
        }
    }

    #[test]
    fn crits_multiply_by_three_halves() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..2000 {
            let (dmg, crit) = roll_damage(&mut rng, 63, 0, 1.0);
            assert!(crit);
            // (63 ± 2) * 3 / 2 with integer truncation.
            assert!((91..=97).contains(&dmg), "rolled {dmg}");
        }
    }
}
