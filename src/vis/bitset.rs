use std::sync::atomic::{AtomicU32, Ordering};

/// Entries per bitset word. Wide culling and the parallel marking tasks
/// operate on one word (32 leaves or surfaces) at a time.
pub const WORD_BITS: usize = 32;

/// Fixed-capacity bit array with one bit per leaf or per surface.
///
/// Words are atomic so that concurrently running leaf-mark tasks can OR
/// surface bits without synchronization beyond the store itself; no ordering
/// between writers is required, only that no update is lost. A zero word
/// lets callers skip an entire 32-entry block.
pub struct VisBitset {
    words: Vec<AtomicU32>,
    len: usize,
}

impl VisBitset {
    pub fn new(len: usize) -> Self {
        let num_words = (len + WORD_BITS - 1) / WORD_BITS;
        let mut words = Vec::with_capacity(num_words);
        words.resize_with(num_words, || AtomicU32::new(0));
        Self { words, len }
    }

    /// Number of entries (bits) the set was sized for.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of 32-bit words backing the set.
    #[inline]
    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Zero every word.
    pub fn clear(&self) {
        for word in &self.words {
            word.store(0, Ordering::Relaxed);
        }
    }

    /// Set bit `index`. Safe to call from concurrent tasks.
    #[inline]
    pub fn set(&self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / WORD_BITS].fetch_or(1 << (index % WORD_BITS), Ordering::Relaxed);
    }

    #[inline]
    pub fn test(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        self.words[index / WORD_BITS].load(Ordering::Relaxed) & (1 << (index % WORD_BITS)) != 0
    }

    /// Read a whole 32-entry word.
    #[inline]
    pub fn word(&self, word_index: usize) -> u32 {
        self.words[word_index].load(Ordering::Relaxed)
    }

    /// Replace a whole word. Parallel callers must each own their word index.
    #[inline]
    pub fn store_word(&self, word_index: usize, value: u32) {
        self.words[word_index].store(value, Ordering::Relaxed);
    }

    /// AND a mask into a word.
    #[inline]
    pub fn and_word(&self, word_index: usize, mask: u32) {
        self.words[word_index].fetch_and(mask, Ordering::Relaxed);
    }

    /// Set every bit, then mask the tail.
    pub fn fill_all(&self) {
        for word in &self.words {
            word.store(!0, Ordering::Relaxed);
        }
        self.mask_tail();
    }

    /// Load bits from a little-endian byte array (bit `i` of the array maps
    /// to entry `i`), as produced by a PVS provider. Missing trailing bytes
    /// read as zero.
    pub fn fill_from_bytes(&self, bytes: &[u8]) {
        for (word_index, word) in self.words.iter().enumerate() {
            let mut value = 0u32;
            for byte in 0..4 {
                if let Some(&b) = bytes.get(word_index * 4 + byte) {
                    value |= (b as u32) << (byte * 8);
                }
            }
            word.store(value, Ordering::Relaxed);
        }
        self.mask_tail();
    }

    /// Clear padding bits past `len` in the last word so they can never be
    /// mistaken for real entries.
    pub fn mask_tail(&self) {
        if self.len % WORD_BITS != 0 {
            if let Some(last) = self.words.last() {
                last.fetch_and((1u32 << (self.len % WORD_BITS)) - 1, Ordering::Relaxed);
            }
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }
}
