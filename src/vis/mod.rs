/// Per-frame visibility pipeline
/// PVS traversal, frustum/backface culling and texture chain building
pub mod bitset;
pub mod chains;
pub mod cull;
pub mod marker;
pub mod partition;
pub mod tasks;
pub mod wide;

pub use bitset::VisBitset;
pub use chains::{ChainIter, ChainKind, TextureChains, CHAIN_NONE};
pub use cull::{cull_box, FrameCullState, Plane};
pub use marker::{mark_surfaces, FrameScratch, FrameVis};
pub use partition::{partition_texture_ranges, WorkloadRange};
pub use tasks::{StageGraph, StageId};
pub use wide::{backface_32, cull_boxes_32, CullBackend};

/// Default number of parallel draw-submission slots the partitioner fills.
pub const DEFAULT_DRAW_WORKERS: usize = 8;

/// Runtime toggles for the marking pipeline. The original engine exposes
/// these as console variables; here they are a plain per-frame config.
#[derive(Debug, Clone)]
pub struct VisSettings {
    /// Skip PVS lookup entirely and treat every leaf as potentially visible.
    pub no_vis: bool,
    /// Mark surfaces of sky-content leaves like any other leaf.
    pub old_sky_leaf: bool,
    /// Run marking as a dependency-ordered task graph on the worker pool.
    pub parallel_mark: bool,
    /// Use the 32-lane wide culling path instead of the scalar walk.
    pub wide_cull: bool,
    /// Backend for the wide culling predicates.
    pub backend: CullBackend,
    /// Number of draw-submission ranges to partition the texture list into.
    pub draw_workers: usize,
}

impl Default for VisSettings {
    fn default() -> Self {
        Self {
            no_vis: false,
            old_sky_leaf: false,
            parallel_mark: true,
            wide_cull: true,
            backend: CullBackend::detect(),
            draw_workers: DEFAULT_DRAW_WORKERS,
        }
    }
}
