#![doc = include_str!("../README.md")]

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

/// Integer key of one grid cell.
pub type CellKey = (i32, i32);

/// A uniform grid over world XZ coordinates.
///
/// Membership is tracked in both directions: cell → id set and id → current
/// cell key. Moving an entity is O(1) and touches cell sets only when the
/// cell key actually changes. Queries return the 3×3 neighbourhood around
/// the target cell, which with the standard 50-unit cell side comfortably
/// covers every gameplay radius (aggro, skills, chat, vendor proximity).
pub struct SpatialGrid<K> {
    cell_size: f32,
    /// Cells beyond this absolute coordinate are clamped onto the border
    /// ring, bounding the map size regardless of input coordinates.
    max_cell: i32,
    cells: FxHashMap<CellKey, FxHashSet<K>>,
    positions: FxHashMap<K, CellKey>,
}

impl<K: Copy + Eq + Ord + Hash> SpatialGrid<K> {
    /// A grid with the given cell side and a practically unbounded extent.
    pub fn new(cell_size: f32) -> Self {
        Self::with_extent(cell_size, i32::MAX / 2)
    }

    /// A grid clamped to `±max_cell` cells around the origin.
    pub fn with_extent(cell_size: f32, max_cell: i32) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive");
        assert!(max_cell > 0, "grid extent must be positive");

        Self {
            cell_size,
            max_cell,
            cells: FxHashMap::default(),
            positions: FxHashMap::default(),
        }
    }

    /// The cell key covering world position (`x`, `z`).
    pub fn cell_of(&self, x: f32, z: f32) -> CellKey {
        let cx = (x / self.cell_size).floor() as i32;
        let cz = (z / self.cell_size).floor() as i32;

        (
            cx.clamp(-self.max_cell, self.max_cell),
            cz.clamp(-self.max_cell, self.max_cell),
        )
    }

    /// Inserts or moves `id` to the cell covering (`x`, `z`).
    pub fn update(&mut self, id: K, x: f32, z: f32) {
        let new_key = self.cell_of(x, z);

        if let Some(&old_key) = self.positions.get(&id) {
            if old_key == new_key {
                return;
            }
            self.remove_from_cell(id, old_key);
        }

        self.positions.insert(id, new_key);
        self.cells.entry(new_key).or_default().insert(id);
    }

    /// Removes `id` entirely. Unknown ids are a no-op.
    pub fn remove(&mut self, id: K) {
        if let Some(key) = self.positions.remove(&id) {
            self.remove_from_cell(id, key);
        }
    }

    fn remove_from_cell(&mut self, id: K, key: CellKey) {
        if let Some(cell) = self.cells.get_mut(&key) {
            cell.remove(&id);
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    pub fn contains(&self, id: K) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// All entity ids within the 3×3 cell neighbourhood centred on the cell
    /// covering (`x`, `z`).
    pub fn nearby_entities(&self, x: f32, z: f32) -> Vec<K> {
        let (cx, cz) = self.cell_of(x, z);
        let mut out = Vec::new();

        for dx in -1..=1 {
            for dz in -1..=1 {
                let key = (
                    (cx + dx).clamp(-self.max_cell, self.max_cell),
                    (cz + dz).clamp(-self.max_cell, self.max_cell),
                );
                if let Some(cell) = self.cells.get(&key) {
                    out.extend(cell.iter().copied());
                }
            }
        }

        // Border clamping can visit the same cell twice.
        out.sort_unstable();
        out.dedup();
        out
    }
}
