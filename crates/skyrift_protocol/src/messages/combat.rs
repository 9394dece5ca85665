//! Combat payloads.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct SelectTarget {
    /// Zero clears the current target.
    #[prost(uint64, tag = "1")]
    pub target_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct UseSkill {
    #[prost(uint32, tag = "1")]
    pub skill_id: u32,
    #[prost(uint64, tag = "2")]
    pub target_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct DamageEvent {
    #[prost(uint64, tag = "1")]
    pub attacker_id: u64,
    #[prost(uint64, tag = "2")]
    pub target_id: u64,
    #[prost(uint32, tag = "3")]
    pub amount: u32,
    /// Zero for plain auto-attacks.
    #[prost(uint32, tag = "4")]
    pub skill_id: u32,
    #[prost(bool, tag = "5")]
    pub critical: bool,
    /// Target HP after the hit, so observers need no follow-up query.
    #[prost(uint32, tag = "6")]
    pub target_hp: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct EntityDeath {
    #[prost(uint64, tag = "1")]
    pub entity_id: u64,
    #[prost(uint64, tag = "2")]
    pub killer_id: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct XpGain {
    #[prost(uint64, tag = "1")]
    pub amount: u64,
    #[prost(uint64, tag = "2")]
    pub total_xp: u64,
    #[prost(uint32, tag = "3")]
    pub level: u32,
    #[prost(uint32, tag = "4")]
    pub unspent_points: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct AutoAttackToggle {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
}
