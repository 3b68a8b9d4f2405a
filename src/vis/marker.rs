/// Surface marking pipeline
///
/// Walks the potentially-visible leaf set for the current viewpoint,
/// frustum- and backface-culls it, and rebuilds the per-texture surface
/// chains. Runs either as a dependency-ordered task graph on the worker
/// pool (`prepare -> mark-leaves -> {store-fragments, cull-surfaces} ->
/// build-chains`), as one sequential pass over the wide culling
/// primitives, or as a purely scalar per-leaf walk. All three produce the
/// same set of chained surfaces; only the chain order differs.
use std::sync::atomic::Ordering;

use log::debug;

use crate::camera::ViewState;
use crate::count_add;
use crate::count_call;
use crate::vis::bitset::VisBitset;
use crate::vis::chains::{ChainKind, TextureChains};
use crate::vis::cull::{cull_box, FrameCullState};
use crate::vis::partition::{partition_texture_ranges, WorkloadRange};
use crate::vis::tasks::StageGraph;
use crate::vis::wide::{backface_32, cull_boxes_32};
use crate::vis::VisSettings;
use crate::world::pvs::{pvs_row_len, PvsProvider};
use crate::world::{LeafContents, Surface, SurfaceFlags, WorldModel};

/// Per-frame mutable scratch state, allocated once per loaded model and
/// fully overwritten every frame. Nothing here survives a frame except the
/// storage itself and the visibility-frame counter.
pub struct FrameScratch {
    /// One bit per leaf: potentially visible, then narrowed by the frustum
    /// cull, then narrowed again to fragment-carrying leaves.
    pub leaf_vis: VisBitset,
    /// One bit per surface: marked by visible leaves, then narrowed by the
    /// backface cull.
    pub surf_vis: VisBitset,
    /// Scalar-path visit stamps; a surface whose stamp matches the current
    /// frame has already been handled.
    visit_stamp: Vec<u32>,
    frame: u32,
    /// Staging buffer for PVS provider output.
    pvs_row: Vec<u8>,
}

impl FrameScratch {
    pub fn new(model: &WorldModel) -> Self {
        Self {
            leaf_vis: VisBitset::new(model.num_leafs()),
            surf_vis: VisBitset::new(model.num_surfaces()),
            visit_stamp: vec![0; model.num_surfaces()],
            frame: 0,
            pvs_row: vec![0; pvs_row_len(model.num_leafs())],
        }
    }

    /// Monotonically increasing visibility-frame counter.
    pub fn frame(&self) -> u32 {
        self.frame
    }
}

/// What a frame of marking produces for the renderer.
pub struct FrameVis {
    pub chains: TextureChains,
    /// Fragments of every visible fragment-carrying leaf, relinked into
    /// this frame's render list.
    pub fragments: Vec<u32>,
    /// Texture index ranges for parallel draw submission.
    pub ranges: Vec<WorkloadRange>,
    /// Surfaces linked into chains this frame.
    pub surfaces_chained: u32,
    /// Textures with a non-empty chain this frame.
    pub draw_batches: u32,
}

impl FrameVis {
    pub fn new(model: &WorldModel) -> Self {
        Self {
            chains: TextureChains::new(model.num_textures(), model.num_surfaces()),
            fragments: Vec::new(),
            ranges: Vec::new(),
            surfaces_chained: 0,
            draw_batches: 0,
        }
    }
}

/// Mark the surfaces visible from `view` and rebuild the world texture
/// chains. Per-frame entry point; dispatches between the task-graph,
/// sequential-wide and scalar paths based on `settings`.
pub fn mark_surfaces(
    model: &WorldModel,
    view: &ViewState,
    pvs: &impl PvsProvider,
    settings: &VisSettings,
    scratch: &mut FrameScratch,
    vis: &mut FrameVis,
) {
    assert!(view.view_leaf < model.num_leafs(), "view leaf out of range");

    let cull = prepare(model, view, pvs, settings, scratch, vis);

    if settings.wide_cull && settings.parallel_mark {
        mark_visible_tasks(model, &cull, settings, scratch, vis);
    } else if settings.wide_cull {
        mark_visible_wide(model, &cull, settings, scratch, vis);
    } else {
        mark_visible_scalar(model, &cull, settings, scratch, vis);
    }

    vis.ranges = partition_texture_ranges(
        model,
        &vis.chains,
        ChainKind::World,
        settings.draw_workers,
        settings.parallel_mark,
    );
    vis.draw_batches = (0..model.num_textures())
        .filter(|&t| vis.chains.head(ChainKind::World, t).is_some())
        .count() as u32;
    count_add!(
        crate::perf::VIS_COUNTERS.draw_batches,
        vis.draw_batches as u64
    );
}

/// Select the PVS source, reset per-frame state and build the shared
/// culling constants. Pure precomputation with no writes to state the
/// marking tasks share, so it always runs before the graph is dispatched.
fn prepare(
    model: &WorldModel,
    view: &ViewState,
    pvs: &impl PvsProvider,
    settings: &VisSettings,
    scratch: &mut FrameScratch,
    vis: &mut FrameVis,
) -> FrameCullState {
    let view_leaf = &model.leafs[view.view_leaf];

    // A liquid surface visible from the view leaf means a transparent
    // portal may be nearby; the tight per-leaf row can pop surfaces on the
    // far side, so fall back to the conservative fat row.
    let near_water_portal = view_leaf
        .surfaces
        .iter()
        .any(|&s| model.surfaces[s as usize].flags.intersects(SurfaceFlags::WARP));

    if settings.no_vis
        || matches!(view_leaf.contents, LeafContents::Solid | LeafContents::Sky)
    {
        scratch.leaf_vis.fill_all();
        debug!("prepare: all-visible leaf set (no-vis or degenerate view leaf)");
    } else if near_water_portal {
        pvs.fat_pvs(view.origin, &mut scratch.pvs_row);
        scratch.leaf_vis.fill_from_bytes(&scratch.pvs_row);
        debug!("prepare: fat PVS near water portal");
    } else {
        pvs.leaf_pvs(view.view_leaf, &mut scratch.pvs_row);
        scratch.leaf_vis.fill_from_bytes(&scratch.pvs_row);
    }

    scratch.frame = scratch.frame.wrapping_add(1);
    scratch.surf_vis.clear();

    vis.chains.clear(ChainKind::World);
    vis.fragments.clear();
    vis.ranges.clear();
    vis.surfaces_chained = 0;
    vis.draw_batches = 0;

    FrameCullState::new(view, settings.backend)
}

/// Set the lightmap/warp dirty flags a visible surface implies. Atomic
/// stores; concurrent surfaces under one texture race benignly.
#[inline]
fn mark_surface_dirty(model: &WorldModel, surf: &Surface) {
    if let Some(lightmap) = surf.lightmap {
        model.lightmaps[lightmap as usize]
            .modified
            .store(true, Ordering::Relaxed);
    }
    let texture = &model.textures[surf.texture as usize];
    if texture.warp {
        texture.update_warp.store(true, Ordering::Relaxed);
    }
}

/// Leaf-mark task for one 32-leaf block: frustum-cull the block, OR the
/// surviving leaves' surfaces into the shared surface bitset, and drop the
/// leaf bits that need no fragment pass.
fn mark_leaf_block(
    model: &WorldModel,
    cull: &FrameCullState,
    scratch: &FrameScratch,
    old_sky_leaf: bool,
    block: usize,
) {
    let mask = scratch.leaf_vis.word(block);
    if mask == 0 {
        return;
    }
    count_call!(crate::perf::VIS_COUNTERS.leaf_blocks_marked);

    let mut mask = cull_boxes_32(cull, &model.leaf_bounds[block * 4..], mask);

    let mut iter = mask;
    while iter != 0 {
        let lane = iter.trailing_zeros() as usize;
        iter &= iter - 1;

        let leaf = &model.leafs[block * 32 + lane];
        count_call!(crate::perf::VIS_COUNTERS.leaves_visited);
        if old_sky_leaf || leaf.contents != LeafContents::Sky {
            for &surf in &leaf.surfaces {
                // Atomic OR: the same surface may be reachable from another
                // concurrently processed leaf.
                scratch.surf_vis.set(surf as usize);
            }
        }
        // Leaves without fragments need no further leaf-level work.
        if leaf.fragments.is_empty() {
            mask &= !(1u32 << lane);
        }
    }
    scratch.leaf_vis.store_word(block, mask);
}

/// Relink the fragments of every still-visible leaf into the frame render
/// list. Mutates one shared list, so it runs as a single task after all
/// leaf blocks settle.
fn store_fragments(model: &WorldModel, scratch: &FrameScratch, fragments: &mut Vec<u32>) {
    for block in 0..scratch.leaf_vis.num_words() {
        let mut mask = scratch.leaf_vis.word(block);
        while mask != 0 {
            let lane = mask.trailing_zeros() as usize;
            mask &= mask - 1;
            let leaf = &model.leafs[block * 32 + lane];
            fragments.extend_from_slice(&leaf.fragments);
        }
    }
    count_add!(
        crate::perf::VIS_COUNTERS.fragments_stored,
        fragments.len() as u64
    );
}

/// Surface-cull task for one 32-surface block: AND the block with the wide
/// backface mask and raise the dirty flags of the survivors.
fn cull_surface_block(
    model: &WorldModel,
    cull: &FrameCullState,
    scratch: &FrameScratch,
    block: usize,
) {
    let mask = scratch.surf_vis.word(block);
    if mask == 0 {
        return;
    }
    count_call!(crate::perf::VIS_COUNTERS.surf_blocks_culled);

    let mask = mask & backface_32(cull, &model.surface_planes[block * 4..]);
    scratch.surf_vis.store_word(block, mask);

    let mut iter = mask;
    while iter != 0 {
        let lane = iter.trailing_zeros() as usize;
        iter &= iter - 1;
        mark_surface_dirty(model, &model.surfaces[block * 32 + lane]);
    }
}

/// Link every surface left in the visibility bitset into its texture's
/// chain, in ascending index order. Head insertion is not parallel-safe,
/// so this is a single task once all surface blocks are culled.
fn chain_visible(
    model: &WorldModel,
    scratch: &FrameScratch,
    chains: &mut TextureChains,
    kind: ChainKind,
) -> u32 {
    let mut chained = 0u32;
    for block in 0..scratch.surf_vis.num_words() {
        let mut mask = scratch.surf_vis.word(block);
        while mask != 0 {
            let lane = mask.trailing_zeros() as usize;
            mask &= mask - 1;
            let index = block * 32 + lane;
            chains.push(kind, model.surfaces[index].texture as usize, index as u32);
            chained += 1;
        }
    }
    count_add!(crate::perf::VIS_COUNTERS.surfaces_chained, chained as u64);
    chained
}

/// Task-graph path: leaf blocks fan out over the pool, fragment storage and
/// surface culling both wait on the settled leaf set, chaining waits on the
/// culled surface set. Fragment storage and chaining run in either order.
fn mark_visible_tasks(
    model: &WorldModel,
    cull: &FrameCullState,
    settings: &VisSettings,
    scratch: &mut FrameScratch,
    vis: &mut FrameVis,
) {
    let FrameVis {
        chains,
        fragments,
        surfaces_chained,
        ..
    } = vis;
    let scratch: &FrameScratch = scratch;
    let old_sky_leaf = settings.old_sky_leaf;

    let mut graph = StageGraph::new();
    let mark_leaves = graph.stage_indexed(&[], scratch.leaf_vis.num_words(), move |block| {
        mark_leaf_block(model, cull, scratch, old_sky_leaf, block);
    });
    graph.stage(&[mark_leaves], move || {
        store_fragments(model, scratch, fragments);
    });
    let cull_surfaces =
        graph.stage_indexed(&[mark_leaves], scratch.surf_vis.num_words(), move |block| {
            cull_surface_block(model, cull, scratch, block);
        });
    graph.stage(&[cull_surfaces], move || {
        *surfaces_chained = chain_visible(model, scratch, chains, ChainKind::World);
    });
    graph.run();
}

/// Sequential wide path: the same two wide passes as the task graph, fused
/// into one call with fragment storage and chaining done inline.
fn mark_visible_wide(
    model: &WorldModel,
    cull: &FrameCullState,
    settings: &VisSettings,
    scratch: &mut FrameScratch,
    vis: &mut FrameVis,
) {
    for block in 0..scratch.leaf_vis.num_words() {
        let mask = scratch.leaf_vis.word(block);
        if mask == 0 {
            continue;
        }
        count_call!(crate::perf::VIS_COUNTERS.leaf_blocks_marked);

        let mut mask = cull_boxes_32(cull, &model.leaf_bounds[block * 4..], mask);
        while mask != 0 {
            let lane = mask.trailing_zeros() as usize;
            mask &= mask - 1;

            let leaf = &model.leafs[block * 32 + lane];
            count_call!(crate::perf::VIS_COUNTERS.leaves_visited);
            if settings.old_sky_leaf || leaf.contents != LeafContents::Sky {
                for &surf in &leaf.surfaces {
                    scratch.surf_vis.set(surf as usize);
                }
            }
            if !leaf.fragments.is_empty() {
                vis.fragments.extend_from_slice(&leaf.fragments);
            }
        }
    }

    let mut chained = 0u32;
    for block in 0..scratch.surf_vis.num_words() {
        let mask = scratch.surf_vis.word(block);
        if mask == 0 {
            continue;
        }
        count_call!(crate::perf::VIS_COUNTERS.surf_blocks_culled);

        let mask = mask & backface_32(cull, &model.surface_planes[block * 4..]);
        scratch.surf_vis.store_word(block, mask);

        let mut iter = mask;
        while iter != 0 {
            let lane = iter.trailing_zeros() as usize;
            iter &= iter - 1;
            let index = block * 32 + lane;
            let surf = &model.surfaces[index];
            vis.chains
                .push(ChainKind::World, surf.texture as usize, index as u32);
            chained += 1;
            mark_surface_dirty(model, surf);
        }
    }
    vis.surfaces_chained = chained;
    count_add!(crate::perf::VIS_COUNTERS.surfaces_chained, chained as u64);
    count_add!(
        crate::perf::VIS_COUNTERS.fragments_stored,
        vis.fragments.len() as u64
    );
}

/// Scalar fallback: one combined pass per leaf with box cull, visit-stamped
/// marking, inline backface test, immediate chaining and fragment storage.
/// Same visible set as the wide paths, different internal order.
fn mark_visible_scalar(
    model: &WorldModel,
    cull: &FrameCullState,
    settings: &VisSettings,
    scratch: &mut FrameScratch,
    vis: &mut FrameVis,
) {
    let frame = scratch.frame;
    let mut chained = 0u32;

    for (leaf_index, leaf) in model.leafs.iter().enumerate() {
        if !scratch.leaf_vis.test(leaf_index) {
            continue;
        }
        if cull_box(&cull.frustum, leaf.mins, leaf.maxs) {
            continue;
        }
        count_call!(crate::perf::VIS_COUNTERS.leaves_visited);

        if settings.old_sky_leaf || leaf.contents != LeafContents::Sky {
            for &surf_index in &leaf.surfaces {
                let surf_index = surf_index as usize;
                if scratch.visit_stamp[surf_index] == frame {
                    continue;
                }
                scratch.visit_stamp[surf_index] = frame;

                let surf = &model.surfaces[surf_index];
                if !surf.front_facing(cull.view_origin) {
                    continue;
                }

                scratch.surf_vis.set(surf_index);
                vis.chains
                    .push(ChainKind::World, surf.texture as usize, surf_index as u32);
                chained += 1;
                mark_surface_dirty(model, surf);
            }
        }

        if !leaf.fragments.is_empty() {
            vis.fragments.extend_from_slice(&leaf.fragments);
        }
    }

    vis.surfaces_chained = chained;
    count_add!(crate::perf::VIS_COUNTERS.surfaces_chained, chained as u64);
    count_add!(
        crate::perf::VIS_COUNTERS.fragments_stored,
        vis.fragments.len() as u64
    );
}
