/// 32-lane wide culling predicates
///
/// Each call frustum-culls 32 bounding boxes or backface-culls 32 surface
/// planes against per-frame constants, returning a bitmask of surviving
/// lanes. The SSE2 backend packs 8 lanes per structure-of-arrays record
/// into paired 4-wide registers; the portable backend performs the same
/// arithmetic lane by lane and must produce bit-identical masks.
use crate::vis::cull::FrameCullState;
use crate::world::{SoaAabb, SoaPlane};

#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

/// Wide-culling backend, picked once at startup by capability detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullBackend {
    /// Lane-by-lane arithmetic, available everywhere.
    Portable,
    /// SSE2 packed lanes.
    Sse2,
}

impl CullBackend {
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("sse2") {
                return CullBackend::Sse2;
            }
        }
        CullBackend::Portable
    }
}

/// Frustum-cull 32 bounding boxes.
///
/// `boxes` must hold at least 4 SoA records (8 boxes each). Lanes cleared
/// in `active` stay cleared; a lane survives only if its box is on the
/// inside of all four planes. Early-outs when no lane remains active.
#[inline]
pub fn cull_boxes_32(state: &FrameCullState, boxes: &[SoaAabb], active: u32) -> u32 {
    debug_assert!(boxes.len() >= 4);
    match state.backend {
        #[cfg(target_arch = "x86_64")]
        CullBackend::Sse2 => unsafe { cull_boxes_32_sse2(state, boxes, active) },
        _ => cull_boxes_32_portable(state, boxes, active),
    }
}

/// Backface-cull 32 surfaces: lane set iff the view origin is strictly on
/// the front side of the lane's (pre-oriented) plane.
///
/// `planes` must hold at least 4 SoA records (8 planes each).
#[inline]
pub fn backface_32(state: &FrameCullState, planes: &[SoaPlane]) -> u32 {
    debug_assert!(planes.len() >= 4);
    match state.backend {
        #[cfg(target_arch = "x86_64")]
        CullBackend::Sse2 => unsafe { backface_32_sse2(state, planes) },
        _ => backface_32_portable(state, planes),
    }
}

fn cull_boxes_32_portable(state: &FrameCullState, boxes: &[SoaAabb], mut active: u32) -> u32 {
    for plane_index in 0..4 {
        if active == 0 {
            break;
        }
        let plane = &state.frustum[plane_index];
        let [ofsx, ofsy, ofsz] = state.box_offsets[plane_index];

        let mut plane_lanes = 0u32;
        for (box_index, record) in boxes[..4].iter().enumerate() {
            for lane in 0..8 {
                // Same operation order as the packed path, so rounding
                // matches lane for lane.
                let v = plane.normal.x * record.0[ofsx + lane]
                    + plane.normal.y * record.0[ofsy + lane]
                    + plane.normal.z * record.0[ofsz + lane];
                if plane.dist < v {
                    plane_lanes |= 1u32 << (box_index * 8 + lane);
                }
            }
        }
        active &= plane_lanes;
    }
    active
}

fn backface_32_portable(state: &FrameCullState, planes: &[SoaPlane]) -> u32 {
    let origin = state.view_origin;
    let mut active = 0u32;
    for (record_index, record) in planes[..4].iter().enumerate() {
        for lane in 0..8 {
            let v = record.0[lane] * origin.x
                + record.0[8 + lane] * origin.y
                + record.0[16 + lane] * origin.z;
            if record.0[24 + lane] < v {
                active |= 1u32 << (record_index * 8 + lane);
            }
        }
    }
    active
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn cull_boxes_32_sse2(state: &FrameCullState, boxes: &[SoaAabb], mut active: u32) -> u32 {
    for plane_index in 0..4 {
        if active == 0 {
            break;
        }
        let plane = &state.frustum[plane_index];
        let [ofsx, ofsy, ofsz] = state.box_offsets[plane_index];
        let px = _mm_set1_ps(plane.normal.x);
        let py = _mm_set1_ps(plane.normal.y);
        let pz = _mm_set1_ps(plane.normal.z);
        let pd = _mm_set1_ps(plane.dist);

        let mut plane_lanes = 0u32;
        for box_index in 0..4 {
            let record = boxes[box_index].0.as_ptr();
            let mut v0 = _mm_mul_ps(_mm_loadu_ps(record.add(ofsx)), px);
            let mut v1 = _mm_mul_ps(_mm_loadu_ps(record.add(ofsx + 4)), px);
            v0 = _mm_add_ps(v0, _mm_mul_ps(_mm_loadu_ps(record.add(ofsy)), py));
            v1 = _mm_add_ps(v1, _mm_mul_ps(_mm_loadu_ps(record.add(ofsy + 4)), py));
            v0 = _mm_add_ps(v0, _mm_mul_ps(_mm_loadu_ps(record.add(ofsz)), pz));
            v1 = _mm_add_ps(v1, _mm_mul_ps(_mm_loadu_ps(record.add(ofsz + 4)), pz));

            let lanes = (_mm_movemask_ps(_mm_cmplt_ps(pd, v0)) as u32)
                | ((_mm_movemask_ps(_mm_cmplt_ps(pd, v1)) as u32) << 4);
            plane_lanes |= lanes << (box_index * 8);
        }
        active &= plane_lanes;
    }
    active
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn backface_32_sse2(state: &FrameCullState, planes: &[SoaPlane]) -> u32 {
    let px = _mm_set1_ps(state.view_origin.x);
    let py = _mm_set1_ps(state.view_origin.y);
    let pz = _mm_set1_ps(state.view_origin.z);

    let mut active = 0u32;
    for record_index in 0..4 {
        let record = planes[record_index].0.as_ptr();
        let mut v0 = _mm_mul_ps(_mm_loadu_ps(record), px);
        let mut v1 = _mm_mul_ps(_mm_loadu_ps(record.add(4)), px);
        v0 = _mm_add_ps(v0, _mm_mul_ps(_mm_loadu_ps(record.add(8)), py));
        v1 = _mm_add_ps(v1, _mm_mul_ps(_mm_loadu_ps(record.add(12)), py));
        v0 = _mm_add_ps(v0, _mm_mul_ps(_mm_loadu_ps(record.add(16)), pz));
        v1 = _mm_add_ps(v1, _mm_mul_ps(_mm_loadu_ps(record.add(20)), pz));

        let pd0 = _mm_loadu_ps(record.add(24));
        let pd1 = _mm_loadu_ps(record.add(28));

        let lanes = (_mm_movemask_ps(_mm_cmplt_ps(pd0, v0)) as u32)
            | ((_mm_movemask_ps(_mm_cmplt_ps(pd1, v1)) as u32) << 4);
        active |= lanes << (record_index * 8);
    }
    active
}
