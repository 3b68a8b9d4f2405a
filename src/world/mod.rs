/// Static world model consumed by the visibility pipeline
/// Leaf/surface/texture arrays plus the structure-of-arrays mirrors used by
/// the wide culling path. Read-only while a frame is being marked; the only
/// mutation during marking goes through the atomic dirty flags.
pub mod pvs;

use std::sync::atomic::AtomicBool;

use glam::Vec3;

use crate::vis::cull::Plane;

/// Surface property bits, stored packed like the source data they come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceFlags(pub u32);

impl SurfaceFlags {
    pub const NONE: SurfaceFlags = SurfaceFlags(0);
    /// The surface plane faces away from its stored normal.
    pub const PLANE_BACK: SurfaceFlags = SurfaceFlags(1 << 0);
    /// Turbulent liquid surface, drawn with a procedural warp.
    pub const WARP: SurfaceFlags = SurfaceFlags(1 << 1);
    /// Tiled sky/liquid geometry drawn by a dedicated pass.
    pub const TILED: SurfaceFlags = SurfaceFlags(1 << 2);
    /// Placeholder surface with no usable texture.
    pub const NO_TEXTURE: SurfaceFlags = SurfaceFlags(1 << 3);

    /// Surfaces the per-texture draw loop skips; they are chained but drawn
    /// (or dropped) by dedicated passes instead.
    pub const UNDRAWN: SurfaceFlags =
        SurfaceFlags(Self::WARP.0 | Self::TILED.0 | Self::NO_TEXTURE.0);

    #[inline]
    pub fn intersects(self, other: SurfaceFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for SurfaceFlags {
    type Output = SurfaceFlags;
    fn bitor(self, rhs: SurfaceFlags) -> SurfaceFlags {
        SurfaceFlags(self.0 | rhs.0)
    }
}

/// Content classification of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafContents {
    Empty,
    Solid,
    Water,
    Sky,
}

/// A convex region of the spatial partition; the unit of PVS granularity.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub contents: LeafContents,
    /// Indices of the surfaces visible from inside this leaf.
    pub surfaces: Vec<u32>,
    /// Static-entity fragments currently attached to this leaf.
    pub fragments: Vec<u32>,
}

/// A drawable planar patch of world geometry.
///
/// The plane is stored pre-oriented: surfaces flagged `PLANE_BACK` have
/// their plane negated at build time, so "front-facing" is always a strict
/// positive-side test of the view origin, in both culling paths.
#[derive(Debug, Clone)]
pub struct Surface {
    pub plane: Plane,
    pub flags: SurfaceFlags,
    pub texture: u32,
    pub first_vert: u32,
    pub num_verts: u32,
    pub lightmap: Option<u32>,
}

impl Surface {
    /// True if the surface faces the given view origin.
    #[inline]
    pub fn front_facing(&self, origin: Vec3) -> bool {
        self.plane.dist < self.plane.normal.dot(origin)
    }
}

/// A texture (material) and its frame-animation links.
#[derive(Debug)]
pub struct TextureInfo {
    pub name: String,
    /// Procedurally warped (liquid) texture.
    pub warp: bool,
    /// Next texture in the animation ring, if animated.
    pub anim_next: Option<u32>,
    /// Alternate variant used on odd entity frames.
    pub alternate: Option<u32>,
    /// Set during marking when a visible surface needs its warp recomputed.
    /// Concurrent stores race benignly; the flag is boolean "dirty".
    pub update_warp: AtomicBool,
}

/// One lightmap page; `modified` is set when any visible surface touching
/// the page may need a dynamic-light recompute.
#[derive(Debug, Default)]
pub struct Lightmap {
    pub modified: AtomicBool,
}

/// Structure-of-arrays bounds for 8 leaves:
/// `[xmin; 8][xmax; 8][ymin; 8][ymax; 8][zmin; 8][zmax; 8]`.
/// The wide frustum cull indexes min or max lane blocks by byte offset.
#[derive(Debug, Clone, Copy)]
pub struct SoaAabb(pub [f32; 48]);

impl SoaAabb {
    pub const ZERO: SoaAabb = SoaAabb([0.0; 48]);

    pub fn set_lane(&mut self, lane: usize, mins: Vec3, maxs: Vec3) {
        debug_assert!(lane < 8);
        self.0[lane] = mins.x;
        self.0[8 + lane] = maxs.x;
        self.0[16 + lane] = mins.y;
        self.0[24 + lane] = maxs.y;
        self.0[32 + lane] = mins.z;
        self.0[40 + lane] = maxs.z;
    }
}

/// Structure-of-arrays planes for 8 surfaces:
/// `[nx; 8][ny; 8][nz; 8][dist; 8]`, planes pre-oriented like
/// [`Surface::plane`].
#[derive(Debug, Clone, Copy)]
pub struct SoaPlane(pub [f32; 32]);

impl SoaPlane {
    pub const ZERO: SoaPlane = SoaPlane([0.0; 32]);

    pub fn set_lane(&mut self, lane: usize, plane: &Plane) {
        debug_assert!(lane < 8);
        self.0[lane] = plane.normal.x;
        self.0[8 + lane] = plane.normal.y;
        self.0[16 + lane] = plane.normal.z;
        self.0[24 + lane] = plane.dist;
    }
}

/// The loaded world. Indices into every array are stable for the lifetime
/// of the model.
pub struct WorldModel {
    pub leafs: Vec<Leaf>,
    pub surfaces: Vec<Surface>,
    pub textures: Vec<TextureInfo>,
    pub lightmaps: Vec<Lightmap>,
    /// One record per 8 leaves, padded to a whole number of 32-leaf blocks.
    pub leaf_bounds: Vec<SoaAabb>,
    /// One record per 8 surfaces, same padding.
    pub surface_planes: Vec<SoaPlane>,
}

impl WorldModel {
    pub fn num_leafs(&self) -> usize {
        self.leafs.len()
    }

    pub fn num_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    pub fn num_textures(&self) -> usize {
        self.textures.len()
    }

    /// Index of the leaf whose bounds contain `point`, if any. A real BSP
    /// walk replaces this on top of a tree structure; the visibility core
    /// only needs some stable point-to-leaf mapping.
    pub fn leaf_at(&self, point: Vec3) -> Option<usize> {
        self.leafs.iter().position(|leaf| {
            point.cmpge(leaf.mins).all() && point.cmple(leaf.maxs).all()
        })
    }

    /// Resolve the animation variant of `texture` for an entity frame and
    /// animation tick. Odd entity frames switch to the alternate variant
    /// when one exists; the tick then advances through the `anim_next`
    /// ring, one texture per tick, wrapping at the ring length.
    pub fn texture_animation(&self, texture: usize, entity_frame: i32, tick: u32) -> usize {
        let mut current = texture;
        if entity_frame % 2 != 0 {
            if let Some(alt) = self.textures[current].alternate {
                current = alt as usize;
            }
        }
        if self.textures[current].anim_next.is_none() {
            return current;
        }

        // Ring length, capped so a ring that fails to close cannot spin.
        let mut len = 1u32;
        let mut cursor = current;
        while let Some(next) = self.textures[cursor].anim_next {
            let next = next as usize;
            if next == current || len as usize >= self.textures.len() {
                break;
            }
            cursor = next;
            len += 1;
        }

        for _ in 0..tick % len {
            if let Some(next) = self.textures[current].anim_next {
                current = next as usize;
            }
        }
        current
    }
}

/// Number of triangle-list indices needed to draw a surface fan with
/// `num_verts` vertices.
pub fn triangle_index_count(num_verts: usize) -> usize {
    3 * num_verts.saturating_sub(2)
}

/// Write the triangle-list indices for a surface fan starting at
/// `base_vert`. Writes exactly [`triangle_index_count`] entries.
pub fn write_triangle_indices(base_vert: u32, num_verts: usize, out: &mut Vec<u32>) {
    for i in 2..num_verts as u32 {
        out.push(base_vert);
        out.push(base_vert + i - 1);
        out.push(base_vert + i);
    }
}

/// Builds a [`WorldModel`] and its derived SoA mirrors. Used by loaders,
/// tests and benches alike.
pub struct WorldBuilder {
    leafs: Vec<Leaf>,
    surfaces: Vec<Surface>,
    textures: Vec<TextureInfo>,
    lightmaps: Vec<Lightmap>,
    next_vert: u32,
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self {
            leafs: Vec::new(),
            surfaces: Vec::new(),
            textures: Vec::new(),
            lightmaps: Vec::new(),
            next_vert: 0,
        }
    }

    pub fn add_texture(&mut self, name: &str, warp: bool) -> u32 {
        self.textures.push(TextureInfo {
            name: name.to_owned(),
            warp,
            anim_next: None,
            alternate: None,
            update_warp: AtomicBool::new(false),
        });
        (self.textures.len() - 1) as u32
    }

    pub fn set_texture_animation(&mut self, texture: u32, anim_next: Option<u32>, alternate: Option<u32>) {
        let tex = &mut self.textures[texture as usize];
        tex.anim_next = anim_next;
        tex.alternate = alternate;
    }

    pub fn add_lightmap(&mut self) -> u32 {
        self.lightmaps.push(Lightmap::default());
        (self.lightmaps.len() - 1) as u32
    }

    /// Add a surface. `plane` is the geometric plane; when `plane_back` is
    /// set the stored plane is flipped so the front-face test stays a plain
    /// positive-side test.
    pub fn add_surface(
        &mut self,
        plane: Plane,
        plane_back: bool,
        flags: SurfaceFlags,
        texture: u32,
        num_verts: u32,
        lightmap: Option<u32>,
    ) -> u32 {
        debug_assert!((texture as usize) < self.textures.len());
        let oriented = if plane_back { plane.flipped() } else { plane };
        let mut flags = flags;
        if plane_back {
            flags = flags | SurfaceFlags::PLANE_BACK;
        }
        let first_vert = self.next_vert;
        self.next_vert += num_verts;
        self.surfaces.push(Surface {
            plane: oriented,
            flags,
            texture,
            first_vert,
            num_verts,
            lightmap,
        });
        (self.surfaces.len() - 1) as u32
    }

    pub fn add_leaf(
        &mut self,
        mins: Vec3,
        maxs: Vec3,
        contents: LeafContents,
        surfaces: Vec<u32>,
        fragments: Vec<u32>,
    ) -> u32 {
        self.leafs.push(Leaf {
            mins,
            maxs,
            contents,
            surfaces,
            fragments,
        });
        (self.leafs.len() - 1) as u32
    }

    pub fn build(self) -> WorldModel {
        let leaf_bounds = build_soa_bounds(&self.leafs);
        let surface_planes = build_soa_planes(&self.surfaces);
        WorldModel {
            leafs: self.leafs,
            surfaces: self.surfaces,
            textures: self.textures,
            lightmaps: self.lightmaps,
            leaf_bounds,
            surface_planes,
        }
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Records needed to cover `count` entries, rounded up to whole 32-entry
/// blocks of 4 records each so the wide path never reads past the end.
fn soa_record_count(count: usize) -> usize {
    ((count + 31) / 32) * 4
}

fn build_soa_bounds(leafs: &[Leaf]) -> Vec<SoaAabb> {
    let mut records = vec![SoaAabb::ZERO; soa_record_count(leafs.len())];
    for (index, leaf) in leafs.iter().enumerate() {
        records[index / 8].set_lane(index % 8, leaf.mins, leaf.maxs);
    }
    records
}

fn build_soa_planes(surfaces: &[Surface]) -> Vec<SoaPlane> {
    let mut records = vec![SoaPlane::ZERO; soa_record_count(surfaces.len())];
    for (index, surf) in surfaces.iter().enumerate() {
        records[index / 8].set_lane(index % 8, &surf.plane);
    }
    records
}
