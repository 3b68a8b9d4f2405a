//! End-to-end tests for the per-frame marking pipeline: PVS selection,
//! frustum and backface culling, sky handling, chain building, fragment
//! relinking and workload partitioning, across all three marking paths.
use glam::Vec3;
use worldvis::{
    mark_surfaces, ChainKind, CullBackend, FrameScratch, FrameVis, LeafContents, Plane, StoredPvs,
    SurfaceFlags, ViewState, VisSettings, WorldBuilder, WorldModel,
};

const NUM_LEAFS: usize = 40;
const SKY_LEAF: usize = 37;
const SIDE_LEAF: usize = 1;

/// 40 leaves in a row along +x, one surface each, viewer meant to stand in
/// leaf 0. Leaf 1 is displaced far along +y so a frustum plane can exclude
/// it without touching the others; leaf 37 holds sky. Even-numbered
/// surfaces use "stone", odd use "metal". Every surface faces the viewer.
fn row_world() -> WorldModel {
    let mut builder = WorldBuilder::new();
    let stone = builder.add_texture("stone", false);
    let metal = builder.add_texture("metal", false);

    for i in 0..NUM_LEAFS {
        let tex = if i % 2 == 0 { stone } else { metal };
        // Faces +x from far behind the row, so every viewpoint in front of
        // x = -10000 sees the front side.
        let plane = Plane::new(Vec3::X, -10_000.0);
        let surf = builder.add_surface(plane, false, SurfaceFlags::NONE, tex, 4, None);

        let base = if i == SIDE_LEAF {
            Vec3::new(i as f32 * 64.0, 1_000.0, 0.0)
        } else {
            Vec3::new(i as f32 * 64.0, 0.0, 0.0)
        };
        let contents = if i == SKY_LEAF {
            LeafContents::Sky
        } else {
            LeafContents::Empty
        };
        builder.add_leaf(base, base + Vec3::splat(64.0), contents, vec![surf], vec![]);
    }
    builder.build()
}

/// Frustum open in every direction except y, which is capped below the
/// displaced side leaf.
fn open_view_excluding_side_leaf(view_leaf: usize) -> ViewState {
    ViewState {
        origin: Vec3::new(32.0, 32.0, 32.0),
        frustum: [
            Plane::new(Vec3::X, -100_000.0),
            Plane::new(Vec3::NEG_X, -100_000.0),
            Plane::new(Vec3::Y, -100_000.0),
            // Inside means y < 500.
            Plane::new(Vec3::NEG_Y, -500.0),
        ],
        view_leaf,
    }
}

fn scalar_settings() -> VisSettings {
    VisSettings {
        parallel_mark: false,
        wide_cull: false,
        ..VisSettings::default()
    }
}

fn wide_settings(backend: CullBackend) -> VisSettings {
    VisSettings {
        parallel_mark: false,
        wide_cull: true,
        backend,
        ..VisSettings::default()
    }
}

fn tasks_settings() -> VisSettings {
    VisSettings {
        parallel_mark: true,
        wide_cull: true,
        ..VisSettings::default()
    }
}

fn run_frame(
    model: &WorldModel,
    view: &ViewState,
    pvs: &StoredPvs,
    settings: &VisSettings,
) -> FrameVis {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut scratch = FrameScratch::new(model);
    let mut vis = FrameVis::new(model);
    mark_surfaces(model, view, pvs, settings, &mut scratch, &mut vis);
    vis
}

/// Chained surfaces per texture, sorted, for order-insensitive comparison.
fn chained_sets(model: &WorldModel, vis: &FrameVis) -> Vec<Vec<u32>> {
    (0..model.num_textures())
        .map(|t| {
            let mut surfs: Vec<u32> = vis.chains.iter(ChainKind::World, t).collect();
            surfs.sort_unstable();
            surfs
        })
        .collect()
}

#[test]
fn pvs_frustum_and_sky_all_narrow_the_visible_set() {
    let model = row_world();
    let mut pvs = StoredPvs::new(&model);
    pvs.set_visible(0, 0);
    pvs.set_visible(0, SIDE_LEAF);
    pvs.set_visible(0, SKY_LEAF);

    let view = open_view_excluding_side_leaf(0);
    for settings in [
        scalar_settings(),
        wide_settings(CullBackend::Portable),
        tasks_settings(),
    ] {
        let vis = run_frame(&model, &view, &pvs, &settings);

        // Leaf 0 survives everything. Leaf 1 is in the PVS but outside the
        // frustum. Leaf 37 is in view but its sky contents suppress marking.
        // Leaves outside the PVS never get looked at.
        assert_eq!(vis.surfaces_chained, 1);
        let stone: Vec<u32> = vis.chains.iter(ChainKind::World, 0).collect();
        assert_eq!(stone, vec![0]);
        assert_eq!(vis.chains.count(ChainKind::World, 1), 0);
    }
}

#[test]
fn old_sky_leaf_restores_sky_surfaces() {
    let model = row_world();
    let mut pvs = StoredPvs::new(&model);
    pvs.set_visible(0, 0);
    pvs.set_visible(0, SKY_LEAF);

    let view = open_view_excluding_side_leaf(0);
    let settings = VisSettings {
        old_sky_leaf: true,
        ..scalar_settings()
    };
    let vis = run_frame(&model, &view, &pvs, &settings);

    assert_eq!(vis.surfaces_chained, 2);
    // Leaf 37's surface is odd-numbered, so it lands in the metal chain.
    assert_eq!(
        vis.chains.iter(ChainKind::World, 1).collect::<Vec<_>>(),
        vec![SKY_LEAF as u32]
    );
}

#[test]
fn surfaces_sharing_a_material_share_a_chain() {
    let model = row_world();
    let mut pvs = StoredPvs::new(&model);
    pvs.set_visible(0, 0);
    pvs.set_visible(0, 2);

    let view = open_view_excluding_side_leaf(0);
    let vis = run_frame(&model, &view, &pvs, &scalar_settings());

    // Surfaces 0 and 2 are both stone.
    assert_eq!(vis.chains.count(ChainKind::World, 0), 2);
    let mut stone: Vec<u32> = vis.chains.iter(ChainKind::World, 0).collect();
    stone.sort_unstable();
    assert_eq!(stone, vec![0, 2]);
    assert_eq!(vis.chains.count(ChainKind::World, 1), 0);
}

#[test]
fn empty_pvs_row_chains_nothing() {
    let model = row_world();
    let pvs = StoredPvs::new(&model);
    let view = open_view_excluding_side_leaf(0);

    for settings in [
        scalar_settings(),
        wide_settings(CullBackend::detect()),
        tasks_settings(),
    ] {
        let vis = run_frame(&model, &view, &pvs, &settings);
        assert_eq!(vis.surfaces_chained, 0);
        assert_eq!(vis.chains.total(ChainKind::World), 0);
        assert!(vis.fragments.is_empty());
        assert_eq!(vis.draw_batches, 0);
        // Partitioning still tiles the texture array.
        let covered: usize = vis.ranges.iter().map(|r| r.len()).sum();
        assert_eq!(covered, model.num_textures());
    }
}

#[test]
fn surface_shared_by_leaves_chains_once() {
    let mut builder = WorldBuilder::new();
    let stone = builder.add_texture("stone", false);
    let plane = Plane::new(Vec3::X, -10_000.0);
    let shared = builder.add_surface(plane, false, SurfaceFlags::NONE, stone, 4, None);
    builder.add_leaf(
        Vec3::ZERO,
        Vec3::splat(64.0),
        LeafContents::Empty,
        vec![shared],
        vec![],
    );
    builder.add_leaf(
        Vec3::new(64.0, 0.0, 0.0),
        Vec3::new(128.0, 64.0, 64.0),
        LeafContents::Empty,
        vec![shared],
        vec![],
    );
    let model = builder.build();
    let pvs = StoredPvs::all_visible(&model);
    let view = open_view_excluding_side_leaf(0);

    for settings in [
        scalar_settings(),
        wide_settings(CullBackend::Portable),
        tasks_settings(),
    ] {
        let vis = run_frame(&model, &view, &pvs, &settings);
        assert_eq!(vis.surfaces_chained, 1);
        assert_eq!(vis.chains.count(ChainKind::World, 0), 1);
    }
}

#[test]
fn backfacing_surfaces_are_dropped_in_every_path() {
    let mut builder = WorldBuilder::new();
    let stone = builder.add_texture("stone", false);
    // Faces +x from in front of the viewer: the viewer at x = 32 is on the
    // negative side, so this is a back face.
    let toward = builder.add_surface(
        Plane::new(Vec3::X, -10_000.0),
        false,
        SurfaceFlags::NONE,
        stone,
        4,
        None,
    );
    let away = builder.add_surface(
        Plane::new(Vec3::X, 10_000.0),
        false,
        SurfaceFlags::NONE,
        stone,
        4,
        None,
    );
    builder.add_leaf(
        Vec3::ZERO,
        Vec3::splat(64.0),
        LeafContents::Empty,
        vec![toward, away],
        vec![],
    );
    let model = builder.build();
    let pvs = StoredPvs::all_visible(&model);
    let view = open_view_excluding_side_leaf(0);

    for settings in [
        scalar_settings(),
        wide_settings(CullBackend::Portable),
        wide_settings(CullBackend::detect()),
        tasks_settings(),
    ] {
        let vis = run_frame(&model, &view, &pvs, &settings);
        assert_eq!(
            vis.chains.iter(ChainKind::World, 0).collect::<Vec<_>>(),
            vec![toward]
        );
    }
}

#[test]
fn fragments_follow_only_visible_leaves() {
    let mut builder = WorldBuilder::new();
    let stone = builder.add_texture("stone", false);
    let plane = Plane::new(Vec3::X, -10_000.0);
    let s0 = builder.add_surface(plane, false, SurfaceFlags::NONE, stone, 4, None);
    let s1 = builder.add_surface(plane, false, SurfaceFlags::NONE, stone, 4, None);
    let s2 = builder.add_surface(plane, false, SurfaceFlags::NONE, stone, 4, None);

    builder.add_leaf(
        Vec3::ZERO,
        Vec3::splat(64.0),
        LeafContents::Empty,
        vec![s0],
        vec![10, 11],
    );
    // Fragment-carrying leaf outside the frustum.
    builder.add_leaf(
        Vec3::new(0.0, 1_000.0, 0.0),
        Vec3::new(64.0, 1_064.0, 64.0),
        LeafContents::Empty,
        vec![s1],
        vec![20],
    );
    // Visible leaf without fragments.
    builder.add_leaf(
        Vec3::new(64.0, 0.0, 0.0),
        Vec3::new(128.0, 64.0, 64.0),
        LeafContents::Empty,
        vec![s2],
        vec![],
    );
    let model = builder.build();
    let pvs = StoredPvs::all_visible(&model);
    let view = open_view_excluding_side_leaf(0);

    for settings in [
        scalar_settings(),
        wide_settings(CullBackend::Portable),
        tasks_settings(),
    ] {
        let mut vis = run_frame(&model, &view, &pvs, &settings);
        vis.fragments.sort_unstable();
        assert_eq!(vis.fragments, vec![10, 11]);
    }
}

#[test]
fn repeated_frames_produce_identical_results() {
    let model = row_world();
    let mut pvs = StoredPvs::new(&model);
    for leaf in [0, 2, 4, 6, SKY_LEAF] {
        pvs.set_visible(0, leaf);
    }
    let view = open_view_excluding_side_leaf(0);
    let settings = tasks_settings();

    let mut scratch = FrameScratch::new(&model);
    let mut vis = FrameVis::new(&model);
    mark_surfaces(&model, &view, &pvs, &settings, &mut scratch, &mut vis);
    let first = chained_sets(&model, &vis);
    let first_chained = vis.surfaces_chained;

    for _ in 0..3 {
        mark_surfaces(&model, &view, &pvs, &settings, &mut scratch, &mut vis);
        assert_eq!(chained_sets(&model, &vis), first);
        assert_eq!(vis.surfaces_chained, first_chained);
    }
}

#[test]
fn all_marking_paths_agree_on_the_chained_set() {
    let model = row_world();
    let mut pvs = StoredPvs::new(&model);
    for leaf in 0..NUM_LEAFS {
        if leaf % 3 != 2 {
            pvs.set_visible(0, leaf);
        }
    }
    let view = open_view_excluding_side_leaf(0);

    let scalar = run_frame(&model, &view, &pvs, &scalar_settings());
    let wide = run_frame(&model, &view, &pvs, &wide_settings(CullBackend::Portable));
    let native = run_frame(&model, &view, &pvs, &wide_settings(CullBackend::detect()));
    let tasks = run_frame(&model, &view, &pvs, &tasks_settings());

    let expected = chained_sets(&model, &scalar);
    assert_eq!(chained_sets(&model, &wide), expected);
    assert_eq!(chained_sets(&model, &native), expected);
    assert_eq!(chained_sets(&model, &tasks), expected);

    assert_eq!(wide.surfaces_chained, scalar.surfaces_chained);
    assert_eq!(tasks.surfaces_chained, scalar.surfaces_chained);

    let mut scalar_frags = scalar.fragments.clone();
    let mut tasks_frags = tasks.fragments.clone();
    scalar_frags.sort_unstable();
    tasks_frags.sort_unstable();
    assert_eq!(tasks_frags, scalar_frags);
}

#[test]
fn draw_batches_count_nonempty_chains() {
    let model = row_world();
    let mut pvs = StoredPvs::new(&model);
    pvs.set_visible(0, 0); // stone
    pvs.set_visible(0, 2); // stone
    pvs.set_visible(0, 3); // metal

    let view = open_view_excluding_side_leaf(0);
    let vis = run_frame(&model, &view, &pvs, &scalar_settings());

    assert_eq!(vis.surfaces_chained, 3);
    assert_eq!(vis.draw_batches, 2);
}

#[test]
fn parallel_frames_partition_into_worker_ranges() {
    let model = row_world();
    let pvs = StoredPvs::all_visible(&model);
    let view = open_view_excluding_side_leaf(0);

    let settings = VisSettings {
        draw_workers: 4,
        ..tasks_settings()
    };
    let vis = run_frame(&model, &view, &pvs, &settings);
    assert_eq!(vis.ranges.len(), 4);
    let mut cursor = 0;
    for range in &vis.ranges {
        assert_eq!(range.start, cursor);
        cursor = range.end;
    }
    assert_eq!(cursor, model.num_textures());

    // Sequential marking keeps the whole array in one range.
    let vis = run_frame(&model, &view, &pvs, &scalar_settings());
    assert_eq!(vis.ranges.len(), 1);
    assert_eq!(vis.ranges[0].start, 0);
    assert_eq!(vis.ranges[0].end, model.num_textures());
}
