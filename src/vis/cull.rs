use glam::Vec3;

use crate::camera::ViewState;
use crate::vis::wide::CullBackend;

/// A plane in `normal * p = dist` form with precomputed sign bits.
///
/// Bit `k` of `signbits` is set iff `normal[k]` is negative; the culling
/// paths use it to pick which corner of an AABB to test without branching
/// on the normal per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    pub signbits: u8,
}

impl Plane {
    pub fn new(normal: Vec3, dist: f32) -> Self {
        let mut signbits = 0u8;
        if normal.x < 0.0 {
            signbits |= 1;
        }
        if normal.y < 0.0 {
            signbits |= 2;
        }
        if normal.z < 0.0 {
            signbits |= 4;
        }
        Self {
            normal,
            dist,
            signbits,
        }
    }

    /// Same plane facing the other way.
    pub fn flipped(&self) -> Plane {
        Plane::new(-self.normal, -self.dist)
    }

    /// Signed distance of `point` from the plane.
    #[inline]
    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.dist
    }
}

/// Returns true if the box is entirely outside at least one of the four
/// inward-facing frustum planes.
///
/// The test is conservative the other way around: a box touching the
/// frustum is never culled. The comparison is strict (`dist < dot`) so the
/// accept/reject decision is bit-identical to the wide path's lane test.
pub fn cull_box(frustum: &[Plane; 4], mins: Vec3, maxs: Vec3) -> bool {
    for plane in frustum {
        // Corner furthest along the plane normal, picked from the sign bits.
        let corner = Vec3::new(
            if plane.signbits & 1 != 0 { mins.x } else { maxs.x },
            if plane.signbits & 2 != 0 { mins.y } else { maxs.y },
            if plane.signbits & 4 != 0 { mins.z } else { maxs.z },
        );
        if !(plane.dist < plane.normal.dot(corner)) {
            return true;
        }
    }
    false
}

/// Per-frame culling constants.
///
/// Built once during the prepare step and read-only afterwards, so every
/// marking task can share it without synchronization. `box_offsets` holds,
/// per frustum plane, the lane-block offsets into a [`SoaAabb`] record
/// selecting the min or max corner per axis from the plane's sign bits.
///
/// [`SoaAabb`]: crate::world::SoaAabb
pub struct FrameCullState {
    pub frustum: [Plane; 4],
    pub view_origin: Vec3,
    pub backend: CullBackend,
    pub box_offsets: [[usize; 3]; 4],
}

impl FrameCullState {
    pub fn new(view: &ViewState, backend: CullBackend) -> Self {
        let mut box_offsets = [[0usize; 3]; 4];
        for (plane, offsets) in view.frustum.iter().zip(box_offsets.iter_mut()) {
            offsets[0] = if plane.signbits & 1 != 0 { 0 } else { 8 };
            offsets[1] = if plane.signbits & 2 != 0 { 16 } else { 24 };
            offsets[2] = if plane.signbits & 4 != 0 { 32 } else { 40 };
        }
        Self {
            frustum: view.frustum,
            view_origin: view.origin,
            backend,
            box_offsets,
        }
    }
}
