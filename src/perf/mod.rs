/// Instrumentation for the marking pipeline
/// Thread-safe frame counters, cheap enough to leave on outside benchmarks
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters accumulated across marking tasks. Relaxed ordering
/// throughout; the totals are read only after the frame settles.
pub struct VisCounters {
    pub leaf_blocks_marked: AtomicU64,
    pub surf_blocks_culled: AtomicU64,
    pub leaves_visited: AtomicU64,
    pub surfaces_chained: AtomicU64,
    pub fragments_stored: AtomicU64,
    pub draw_batches: AtomicU64,
}

impl VisCounters {
    pub const fn new() -> Self {
        Self {
            leaf_blocks_marked: AtomicU64::new(0),
            surf_blocks_culled: AtomicU64::new(0),
            leaves_visited: AtomicU64::new(0),
            surfaces_chained: AtomicU64::new(0),
            fragments_stored: AtomicU64::new(0),
            draw_batches: AtomicU64::new(0),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.leaf_blocks_marked.store(0, Ordering::Relaxed);
        self.surf_blocks_culled.store(0, Ordering::Relaxed);
        self.leaves_visited.store(0, Ordering::Relaxed);
        self.surfaces_chained.store(0, Ordering::Relaxed);
        self.fragments_stored.store(0, Ordering::Relaxed);
        self.draw_batches.store(0, Ordering::Relaxed);
    }

    /// Get snapshot of all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            leaf_blocks_marked: self.leaf_blocks_marked.load(Ordering::Relaxed),
            surf_blocks_culled: self.surf_blocks_culled.load(Ordering::Relaxed),
            leaves_visited: self.leaves_visited.load(Ordering::Relaxed),
            surfaces_chained: self.surfaces_chained.load(Ordering::Relaxed),
            fragments_stored: self.fragments_stored.load(Ordering::Relaxed),
            draw_batches: self.draw_batches.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counter values at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot {
    pub leaf_blocks_marked: u64,
    pub surf_blocks_culled: u64,
    pub leaves_visited: u64,
    pub surfaces_chained: u64,
    pub fragments_stored: u64,
    pub draw_batches: u64,
}

impl CounterSnapshot {
    /// Print formatted report.
    pub fn print_report(&self) {
        println!("\n=== Visibility Counters Report ===");
        println!("  leaf blocks marked:   {:12}", self.leaf_blocks_marked);
        println!("  surf blocks culled:   {:12}", self.surf_blocks_culled);
        println!("  leaves visited:       {:12}", self.leaves_visited);
        println!("  surfaces chained:     {:12}", self.surfaces_chained);
        println!("  fragments stored:     {:12}", self.fragments_stored);
        println!("  draw batches:         {:12}", self.draw_batches);
        println!();
    }
}

/// Global visibility counters instance.
pub static VIS_COUNTERS: VisCounters = VisCounters::new();

/// Increment a counter (only when the profiling feature is enabled).
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Add to a counter (only when the profiling feature is enabled).
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value, std::sync::atomic::Ordering::Relaxed);
        }
    };
}
