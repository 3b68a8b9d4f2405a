/// Per-texture surface chains
///
/// Chains are arena-indexed rather than pointer-linked: each texture holds a
/// head index and a count, and one shared `next` array sized to the surface
/// count supplies the links. Everything is rebuilt from empty each frame
/// with no allocation after construction.
pub const CHAIN_NONE: u32 = u32::MAX;

/// Which chain set a surface is linked into this frame. World geometry and
/// instanced brush models chain separately so both can be live at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    World = 0,
    Model = 1,
}

pub const NUM_CHAIN_KINDS: usize = 2;

pub struct TextureChains {
    /// Head surface index per texture, per kind.
    first: [Vec<u32>; NUM_CHAIN_KINDS],
    /// Surfaces linked per texture, per kind.
    count: [Vec<u32>; NUM_CHAIN_KINDS],
    /// Link arena, one slot per surface, per kind. Stale entries from a
    /// previous frame are unreachable once the heads are reset, so only
    /// the heads and counts are cleared per frame.
    next: [Vec<u32>; NUM_CHAIN_KINDS],
}

impl TextureChains {
    pub fn new(num_textures: usize, num_surfaces: usize) -> Self {
        Self {
            first: [
                vec![CHAIN_NONE; num_textures],
                vec![CHAIN_NONE; num_textures],
            ],
            count: [vec![0; num_textures], vec![0; num_textures]],
            next: [
                vec![CHAIN_NONE; num_surfaces],
                vec![CHAIN_NONE; num_surfaces],
            ],
        }
    }

    pub fn num_textures(&self) -> usize {
        self.first[0].len()
    }

    /// Reset every chain of `kind` to empty.
    pub fn clear(&mut self, kind: ChainKind) {
        self.first[kind as usize].fill(CHAIN_NONE);
        self.count[kind as usize].fill(0);
    }

    /// Head-insert `surface` into its texture's chain. Chain order is the
    /// reverse of insertion order; it is not a contract, and consumers
    /// needing a draw order must sort downstream.
    #[inline]
    pub fn push(&mut self, kind: ChainKind, texture: usize, surface: u32) {
        let kind = kind as usize;
        self.next[kind][surface as usize] = self.first[kind][texture];
        self.first[kind][texture] = surface;
        self.count[kind][texture] += 1;
    }

    /// Head of a texture's chain, or `None` when empty.
    #[inline]
    pub fn head(&self, kind: ChainKind, texture: usize) -> Option<u32> {
        let first = self.first[kind as usize][texture];
        (first != CHAIN_NONE).then_some(first)
    }

    /// Surfaces linked into a texture's chain this frame.
    #[inline]
    pub fn count(&self, kind: ChainKind, texture: usize) -> u32 {
        self.count[kind as usize][texture]
    }

    /// Walk a texture's chain from head to tail.
    pub fn iter(&self, kind: ChainKind, texture: usize) -> ChainIter<'_> {
        ChainIter {
            next: &self.next[kind as usize],
            cursor: self.first[kind as usize][texture],
        }
    }

    /// Total surfaces chained for `kind` across all textures.
    pub fn total(&self, kind: ChainKind) -> u32 {
        self.count[kind as usize].iter().sum()
    }
}

pub struct ChainIter<'a> {
    next: &'a [u32],
    cursor: u32,
}

impl Iterator for ChainIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.cursor == CHAIN_NONE {
            return None;
        }
        let current = self.cursor;
        self.cursor = self.next[current as usize];
        Some(current)
    }
}
