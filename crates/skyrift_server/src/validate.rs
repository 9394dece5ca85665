//! Cross-cutting anti-cheat validators.
//!
//! Small pure functions invoked from the relevant handlers; every rule the
//! server enforces against a hostile client that is not already part of the
//! frame/datagram gates lives here or in the skill validation chain.

use skyrift_math::Vec3;
use skyrift_protocol::messages::entity::StatAllocate;

/// Latency grace multiplier on the movement cap. Instantaneous per tick,
/// never accumulated.
pub const MOVE_GRACE: f32 = 1.2;

/// Whether a claimed position is reachable from `old` within one tick.
pub fn movement_allowed(old: Vec3, claimed: Vec3, max_speed: f32, dt_ms: u64) -> bool {
    let allowed = max_speed * (dt_ms as f32 / 1000.0) * MOVE_GRACE;
    old.distance(claimed) <= allowed
}

/// Euclidean range check used by skills, auto-attacks, pickups and vendor
/// interactions.
pub fn within_range(a: Vec3, b: Vec3, range: f32) -> bool {
    a.distance(b) <= range
}

/// Total points a stat allocation asks for.
pub fn stat_points_requested(alloc: &StatAllocate) -> u64 {
    u64::from(alloc.strength)
        + u64::from(alloc.stamina)
        + u64::from(alloc.dexterity)
        + u64::from(alloc.intellect)
}

/// Fixed-window counter for per-account and per-connection action limits.
#[derive(Clone, Debug)]
pub struct FixedWindow {
    limit: u32,
    window_ms: u64,
    window_start: u64,
    count: u32,
}

impl FixedWindow {
    pub fn new(limit: u32, window_ms: u64) -> Self {
        Self {
            limit,
            window_ms,
            window_start: 0,
            count: 0,
        }
    }

    /// Counts one action at `now_ms`; returns whether it is allowed.
    pub fn allow(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.window_start) >= self.window_ms {
            self.window_start = now_ms;
            self.count = 0;
        }

        self.count += 1;
        self.count <= self.limit
    }
}
