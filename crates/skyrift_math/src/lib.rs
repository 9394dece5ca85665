#![doc = include_str!("../README.md")]

mod aabb;

pub use aabb::Aabb;
pub use glam::{vec3, Vec2, Vec3};

/// Distance between two points projected onto the XZ plane.
///
/// Interest management and grid placement ignore altitude; two entities
/// stacked vertically occupy the same cell.
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    Vec2::new(a.x - b.x, a.z - b.z).length()
}

/// Moves `from` toward `to` by at most `step`, without overshooting.
pub fn step_toward(from: Vec3, to: Vec3, step: f32) -> Vec3 {
    let delta = to - from;
    let dist = delta.length();

    if dist <= step || dist <= f32::EPSILON {
        to
    } else {
        from + delta * (step / dist)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn planar_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 100.0, 4.0);

        assert_relative_eq!(planar_distance(a, b), 5.0);
    }

    #[test]
    fn step_toward_does_not_overshoot() {
        let from = Vec3::ZERO;
        let to = Vec3::new(10.0, 0.0, 0.0);

        let mid = step_toward(from, to, 4.0);
        assert_relative_eq!(mid.x, 4.0);

        let done = step_toward(mid, to, 100.0);
        assert_eq!(done, to);
    }

    #[test]
    fn step_toward_is_stationary_at_target() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(step_toward(p, p, 5.0), p);
    }
}
