/// Potentially-visible-set providers
///
/// The PVS itself is computed offline by the map pipeline; the visibility
/// core only consumes byte arrays. Bit `i` of the output covers leaf `i`.
use glam::Vec3;

use crate::world::WorldModel;

/// Bytes needed to hold one bit per leaf.
pub fn pvs_row_len(num_leafs: usize) -> usize {
    (num_leafs + 7) / 8
}

/// Source of per-leaf visibility rows. Implementations must fill at least
/// `ceil(num_leafs / 8)` bytes; callers pass a buffer of exactly that size.
pub trait PvsProvider {
    /// Visibility row for `leaf`: bit `i` set iff leaf `i` is potentially
    /// visible from anywhere inside `leaf`.
    fn leaf_pvs(&self, leaf: usize, out: &mut [u8]);

    /// Conservative multi-origin row: everything reachable from any nearby
    /// viewpoint around `origin`. Used near transparent liquid portals,
    /// where the tight single-leaf row can pop surfaces.
    fn fat_pvs(&self, origin: Vec3, out: &mut [u8]);
}

/// PVS rows held in memory, as a loader would decompress them. Also the
/// test/bench workhorse: rows start empty and are populated with
/// [`set_visible`](StoredPvs::set_visible).
pub struct StoredPvs {
    row_len: usize,
    rows: Vec<Vec<u8>>,
    /// Leaf bounds for the fat variant's origin lookup.
    bounds: Vec<(Vec3, Vec3)>,
    /// How far beyond a leaf's box the fat lookup reaches.
    fat_expand: f32,
}

impl StoredPvs {
    pub fn new(model: &WorldModel) -> Self {
        let row_len = pvs_row_len(model.num_leafs());
        Self {
            row_len,
            rows: vec![vec![0; row_len]; model.num_leafs()],
            bounds: model.leafs.iter().map(|l| (l.mins, l.maxs)).collect(),
            fat_expand: 8.0,
        }
    }

    /// Every leaf sees every leaf.
    pub fn all_visible(model: &WorldModel) -> Self {
        let mut pvs = Self::new(model);
        for row in &mut pvs.rows {
            row.fill(0xff);
        }
        pvs
    }

    /// Mark `to` visible from `from` (one direction only; real PVS data is
    /// symmetric, tests may want asymmetry).
    pub fn set_visible(&mut self, from: usize, to: usize) {
        self.rows[from][to / 8] |= 1 << (to % 8);
    }

    /// Replace the whole row for `from`.
    pub fn set_row(&mut self, from: usize, row: &[u8]) {
        debug_assert_eq!(row.len(), self.row_len);
        self.rows[from].copy_from_slice(row);
    }
}

impl PvsProvider for StoredPvs {
    fn leaf_pvs(&self, leaf: usize, out: &mut [u8]) {
        let row = &self.rows[leaf];
        out[..row.len()].copy_from_slice(row);
        for byte in &mut out[row.len()..] {
            *byte = 0;
        }
    }

    fn fat_pvs(&self, origin: Vec3, out: &mut [u8]) {
        out.fill(0);
        let expand = Vec3::splat(self.fat_expand);
        let mut any = false;
        for (leaf, (mins, maxs)) in self.bounds.iter().enumerate() {
            let inside = origin.cmpge(*mins - expand).all() && origin.cmple(*maxs + expand).all();
            if inside {
                any = true;
                for (dst, src) in out.iter_mut().zip(&self.rows[leaf]) {
                    *dst |= src;
                }
            }
        }
        // Degenerate origin (outside every leaf): stay conservative.
        if !any {
            out.fill(0xff);
        }
    }
}
