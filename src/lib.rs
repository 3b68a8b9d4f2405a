/// World visibility core: per-frame potentially-visible-set traversal,
/// frustum and backface culling (scalar and 32-lane wide paths), and
/// per-texture surface chain building for a renderer to consume.
pub mod camera;
pub mod perf;
pub mod vis;
pub mod world;

pub use camera::{Camera, ViewState};
pub use perf::{CounterSnapshot, VisCounters, VIS_COUNTERS};
pub use vis::bitset::VisBitset;
pub use vis::chains::{ChainIter, ChainKind, TextureChains, CHAIN_NONE};
pub use vis::cull::{cull_box, FrameCullState, Plane};
pub use vis::marker::{mark_surfaces, FrameScratch, FrameVis};
pub use vis::partition::{partition_texture_ranges, WorkloadRange};
pub use vis::tasks::{StageGraph, StageId};
pub use vis::wide::{backface_32, cull_boxes_32, CullBackend};
pub use vis::VisSettings;
pub use world::pvs::{PvsProvider, StoredPvs};
pub use world::{
    Leaf, LeafContents, Lightmap, SoaAabb, SoaPlane, Surface, SurfaceFlags, TextureInfo,
    WorldBuilder, WorldModel,
};
