//! UseSkill validation.
//!
//! The check order is part of the protocol contract: the error a client
//! sees for a failed cast is always the first failing check in this
//! sequence, so the chain below must not be reordered.

use skyrift_protocol::ErrorCode;
use skyrift_registry::SkillDef;

/// Target facts gathered by the caller before validation.
#[derive(Copy, Clone, Debug)]
pub struct TargetFacts {
    pub alive: bool,
    pub distance: f32,
}

/// Caster facts gathered by the caller before validation.
#[derive(Copy, Clone, Debug)]
pub struct CasterFacts {
    pub learned_level: u32,
    pub mp: u32,
    pub cooldown_ready: bool,
}

/// Runs the full validation chain. On success returns the learned level to
/// feed the damage formula.
pub fn validate_use_skill(
    def: Option<&SkillDef>,
    caster: CasterFacts,
    target: Option<TargetFacts>,
) -> Result<u32, ErrorCode> {
    // 1. The skill exists.
    let def = def.ok_or(ErrorCode::SkillUnknown)?;

    // 2. The caster has learned it.
    if caster.learned_level == 0 {
        return Err(ErrorCode::SkillNotLearned);
    }

    // 3. Enough MP.
    if caster.mp < def.mp_cost {
        return Err(ErrorCode::NotEnoughMana);
    }

    // 4. Off cooldown.
    if !caster.cooldown_ready {
        return Err(ErrorCode::CooldownActive);
    }

    // 5. A live target in the same channel.
    let target = target.ok_or(ErrorCode::TargetMissing)?;
    if !target.alive {
        return Err(ErrorCode::TargetDead);
    }

    // 6. In range.
    if target.distance > def.range {
        return Err(ErrorCode::OutOfRange);
    }

    Ok(caster.learned_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> SkillDef {
        SkillDef {
            id: 7,
            name: "Wind Cutter".to_owned(),
            class_id: 0,
            mp_cost: 10,
            cooldown_ms: 3000,
            range: 5.0,
            base_damage: 50,
            damage_per_level: 2,
            max_level: 10,
        }
    }

    fn ready_caster() -> CasterFacts {
        CasterFacts {
            learned_level: 1,
            mp: 100,
            cooldown_ready: true,
        }
    }

    fn near_target() -> Option<TargetFacts> {
        Some(TargetFacts {
            alive: true,
            distance: 3.0,
        })
    }

    #[test]
    fn happy_path_returns_level() {
        let level = validate_use_skill(Some(&def()), ready_caster(), near_target()).unwrap();
        assert_eq!(level, 1);
    }

    /// The reported error is exactly the first failing check, even when
    /// several would fail.
    #[test]
    fn first_failure_wins() {
        let d = def();

        // Everything is wrong; unknown skill dominates.
        let broke = CasterFacts {
            learned_level: 0,
            mp: 0,
            cooldown_ready: false,
        };
        assert_eq!(
            validate_use_skill(None, broke, None).unwrap_err(),
            ErrorCode::SkillUnknown
        );

        // Skill known, everything else wrong: not-learned dominates.
        assert_eq!(
            validate_use_skill(Some(&d), broke, None).unwrap_err(),
            ErrorCode::SkillNotLearned
        );

        // Learned but broke and on cooldown with no target: MP dominates.
        let no_mana = CasterFacts {
            learned_level: 1,
            mp: 9,
            cooldown_ready: false,
        };
        assert_eq!(
            validate_use_skill(Some(&d), no_mana, None).unwrap_err(),
            ErrorCode::NotEnoughMana
        );

        // Cooldown beats target checks.
        let cooling = CasterFacts {
            learned_level: 1,
            mp: 100,
            cooldown_ready: false,
        };
        assert_eq!(
            validate_use_skill(Some(&d), cooling, None).unwrap_err(),
            ErrorCode::CooldownActive
        );

        // Missing target beats range.
        assert_eq!(
            validate_use_skill(Some(&d), ready_caster(), None).unwrap_err(),
            ErrorCode::TargetMissing
        );

        // Dead target beats range.
        let dead_far = Some(TargetFacts {
            alive: false,
            distance: 100.0,
        });
        assert_eq!(
            validate_use_skill(Some(&d), ready_caster(), dead_far).unwrap_err(),
            ErrorCode::TargetDead
        );

        // Finally, range.
        let far = Some(TargetFacts {
            alive: true,
            distance: 5.1,
        });
        assert_eq!(
            validate_use_skill(Some(&d), ready_caster(), far).unwrap_err(),
            ErrorCode::OutOfRange
        );
    }

    #[test]
    fn range_edge_is_inclusive() {
        let at_edge = Some(TargetFacts {
            alive: true,
            distance: 5.0,
        });
        assert!(validate_use_skill(Some(&def()), ready_caster(), at_edge).is_ok());
    }
}
