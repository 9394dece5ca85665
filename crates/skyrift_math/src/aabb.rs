use glam::Vec3;

/// An axis-aligned box in world space, stored as its two extreme corners.
///
/// Zone bounds are the only boxes the server deals in, so the surface is
/// deliberately small: build one, ask whether a point is inside, and pull
/// stray points back in.
#[derive(Copy, Clone, PartialEq, Default, Debug)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    /// Builds a box from opposite corners.
    ///
    /// # Panics
    ///
    /// Debug builds panic when the corners are out of order on any axis.
    #[cfg_attr(debug_assertions, track_caller)]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        debug_assert!(
            min.cmple(max).all(),
            "box corners out of order: min {min}, max {max}"
        );

        Self { min, max }
    }

    /// A square column of playable area: `half_extent` outward from
    /// `center` on X and Z, `height` upward on Y.
    pub fn from_center(center: Vec3, half_extent: f32, height: f32) -> Self {
        let spread = Vec3::new(half_extent, 0.0, half_extent);
        let lift = Vec3::new(0.0, height, 0.0);

        Self::new(center - spread, center + spread + lift)
    }

    pub const fn min(self) -> Vec3 {
        self.min
    }

    pub const fn max(self) -> Vec3 {
        self.max
    }

    /// Whether `p` lies inside the box. Points on a face count as inside.
    pub fn contains(self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Pulls `p` to the nearest point inside the box; interior points come
    /// back unchanged.
    pub fn clamp_point(self, p: Vec3) -> Vec3 {
        p.max(self.min).min(self.max)
    }

    /// How far outside the box `p` sits; zero anywhere inside.
    pub fn distance_to(self, p: Vec3) -> f32 {
        self.clamp_point(p).distance(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meadow() -> Aabb {
        Aabb::from_center(Vec3::ZERO, 100.0, 50.0)
    }

    #[test]
    fn faces_count_as_inside() {
        let bounds = meadow();

        assert!(bounds.contains(Vec3::ZERO));
        assert!(bounds.contains(Vec3::new(100.0, 0.0, -100.0)));
        assert!(!bounds.contains(Vec3::new(100.1, 0.0, 0.0)));
        assert!(!bounds.contains(Vec3::new(0.0, -0.1, 0.0)));
    }

    #[test]
    fn clamping_lands_on_the_border() {
        let bounds = meadow();

        let pulled = bounds.clamp_point(Vec3::new(250.0, 10.0, -40.0));
        assert_eq!(pulled, Vec3::new(100.0, 10.0, -40.0));
        assert!(bounds.contains(pulled));

        let inside = Vec3::new(3.0, 3.0, 3.0);
        assert_eq!(bounds.clamp_point(inside), inside);
    }

    #[test]
    fn distance_is_zero_inside_and_grows_outside() {
        let bounds = meadow();

        assert_eq!(bounds.distance_to(Vec3::new(50.0, 25.0, 50.0)), 0.0);
        assert_eq!(bounds.distance_to(Vec3::new(103.0, 0.0, 0.0)), 3.0);
    }
}
