/// Workload partitioning for parallel draw submission
///
/// After chain building, the texture list is split into contiguous ranges
/// sized by chained-surface count rather than texture count, so each draw
/// worker carries a roughly equal share of visible surfaces.
use crate::vis::chains::{ChainKind, TextureChains};
use crate::world::{SurfaceFlags, WorldModel};

/// Half-open `[start, end)` index range over the texture array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadRange {
    pub start: usize,
    pub end: usize,
}

impl WorkloadRange {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Chained surfaces a texture contributes to the per-texture draw loop.
/// Chains headed by warp/tiled/untextured surfaces are drawn by dedicated
/// passes and carry no weight here.
fn drawable_count(model: &WorldModel, chains: &TextureChains, kind: ChainKind, texture: usize) -> u32 {
    match chains.head(kind, texture) {
        Some(head) => {
            let flags = model.surfaces[head as usize].flags;
            if flags.intersects(SurfaceFlags::UNDRAWN) {
                0
            } else {
                chains.count(kind, texture)
            }
        }
        None => 0,
    }
}

/// Split the texture array into `worker_count` contiguous ranges carrying a
/// roughly equal number of chained surfaces.
///
/// Ranges never split a texture, tile the full `[0, num_textures)` index
/// space, and trailing ranges may be empty. With `use_tasks` unset the
/// whole array lands in one range.
pub fn partition_texture_ranges(
    model: &WorldModel,
    chains: &TextureChains,
    kind: ChainKind,
    worker_count: usize,
    use_tasks: bool,
) -> Vec<WorkloadRange> {
    let num_textures = model.num_textures();
    if !use_tasks {
        return vec![WorkloadRange {
            start: 0,
            end: num_textures,
        }];
    }

    assert!(worker_count > 0, "partitioning requires at least one worker");

    let total: u32 = (0..num_textures)
        .map(|t| drawable_count(model, chains, kind, t))
        .sum();
    // Never zero, so an all-empty frame keeps every texture in range 0.
    let target = ((total + worker_count as u32 - 1) / worker_count as u32).max(1);

    let mut ranges = vec![
        WorkloadRange {
            start: num_textures,
            end: num_textures,
        };
        worker_count
    ];
    let mut current = 0usize;
    let mut start = 0usize;
    let mut accumulated = 0u32;
    for texture in 0..num_textures {
        accumulated += drawable_count(model, chains, kind, texture);
        if accumulated >= target && current + 1 < worker_count {
            ranges[current] = WorkloadRange {
                start,
                end: texture + 1,
            };
            current += 1;
            start = texture + 1;
            accumulated = 0;
        }
    }
    // Final open range absorbs the remainder.
    ranges[current] = WorkloadRange {
        start,
        end: num_textures,
    };
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vis::cull::Plane;
    use crate::world::WorldBuilder;
    use glam::Vec3;

    /// A model with `counts.len()` textures, each owning `counts[i]`
    /// chained surfaces.
    fn model_with_chains(counts: &[u32]) -> (WorldModel, TextureChains) {
        let mut builder = WorldBuilder::new();
        let plane = Plane::new(Vec3::Z, -10.0);
        let mut surfs = Vec::new();
        for (i, &count) in counts.iter().enumerate() {
            let tex = builder.add_texture(&format!("tex{i}"), false);
            for _ in 0..count {
                surfs.push((
                    builder.add_surface(plane, false, SurfaceFlags::NONE, tex, 4, None),
                    tex,
                ));
            }
        }
        let model = builder.build();
        let mut chains = TextureChains::new(model.num_textures(), model.num_surfaces());
        for (surf, tex) in surfs {
            chains.push(ChainKind::World, tex as usize, surf);
        }
        (model, chains)
    }

    fn assert_tiling(ranges: &[WorkloadRange], num_textures: usize) {
        let mut cursor = 0;
        for range in ranges {
            assert_eq!(range.start, cursor, "ranges must be contiguous");
            assert!(range.end >= range.start);
            cursor = range.end;
        }
        assert_eq!(cursor, num_textures, "ranges must cover the texture array");
    }

    #[test]
    fn sequential_mode_returns_single_full_range() {
        let (model, chains) = model_with_chains(&[3, 2, 1]);
        let ranges = partition_texture_ranges(&model, &chains, ChainKind::World, 4, false);
        assert_eq!(ranges, vec![WorkloadRange { start: 0, end: 3 }]);
    }

    #[test]
    fn ranges_tile_and_balance_surface_counts() {
        let counts = [4u32, 4, 4, 4, 4, 4, 4, 4];
        let (model, chains) = model_with_chains(&counts);
        let ranges = partition_texture_ranges(&model, &chains, ChainKind::World, 4, true);

        assert_eq!(ranges.len(), 4);
        assert_tiling(&ranges, counts.len());
        for range in &ranges {
            let work: u32 = (range.start..range.end).map(|t| counts[t]).sum();
            assert_eq!(work, 8, "even chains should split evenly");
        }
    }

    #[test]
    fn heavy_texture_is_never_split() {
        let counts = [1u32, 20, 1, 1];
        let (model, chains) = model_with_chains(&counts);
        let ranges = partition_texture_ranges(&model, &chains, ChainKind::World, 3, true);

        assert_tiling(&ranges, counts.len());
        // Texture 1 lands entirely in one range.
        let owner: Vec<_> = ranges
            .iter()
            .filter(|r| r.start <= 1 && 1 < r.end)
            .collect();
        assert_eq!(owner.len(), 1);
    }

    #[test]
    fn zero_work_still_tiles_the_array() {
        let (model, chains) = model_with_chains(&[0, 0, 0]);
        let ranges = partition_texture_ranges(&model, &chains, ChainKind::World, 4, true);

        assert_eq!(ranges.len(), 4);
        assert_tiling(&ranges, 3);
        for range in &ranges {
            let work: u32 = (range.start..range.end)
                .map(|t| chains.count(ChainKind::World, t))
                .sum();
            assert_eq!(work, 0);
        }
    }
}
