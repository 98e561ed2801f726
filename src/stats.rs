//! Cache-wide counters.
//!
//! A struct of atomic counters readable without a lock, reporting a fixed
//! field set rather than an open `BTreeMap<String, f64>`, since this cache
//! has one, known set of counters rather than a per-algorithm one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time snapshot of a cache's counters and construction
/// parameters, returned by [`crate::FluidCache::statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Successful `get` calls that found a live entry without invoking a
    /// factory.
    pub hit_count: u64,
    /// `get` calls that invoked a factory (whether or not it produced a
    /// value).
    pub miss_count: u64,
    /// Entries currently tracked by the lifespan manager.
    pub current_count: u64,
    /// Entries ever added since construction or the last rebuild.
    pub total_count: u64,
    /// Items attributed to the bag currently accepting touches
    /// (`itemsInCurrentBag`).
    pub items_in_current_bag: u64,
    /// The soft capacity this cache was configured with.
    pub capacity: usize,
    /// The oldest bag number not yet retired.
    pub oldest_bag_number: u64,
    /// The bag number currently accepting touches.
    pub current_bag_number: u64,
    /// Number of bags in the ring.
    pub bag_count: usize,
    /// Soft per-bag item cap before cleanup prefers to retire a bag early.
    pub bag_item_limit: usize,
    /// Configured minimum retention time.
    pub min_age: Duration,
    /// Configured maximum retention time.
    pub max_age: Duration,
    /// How often the lifespan manager's cleanup pass runs.
    pub cleanup_interval: Duration,
}

/// Atomic counters updated from any thread without taking the lifespan
/// manager's lock.
#[derive(Debug, Default)]
pub(crate) struct Statistics {
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    current_count: AtomicU64,
    total_count: AtomicU64,
    items_in_current_bag: AtomicU64,
}

impl Statistics {
    pub(crate) fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_add(&self) {
        self.current_count.fetch_add(1, Ordering::Relaxed);
        self.total_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remove(&self) {
        self.current_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn current_count(&self) -> u64 {
        self.current_count.load(Ordering::Relaxed)
    }

    pub(crate) fn total_count(&self) -> u64 {
        self.total_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_total_count(&self, count: u64) {
        self.total_count.store(count, Ordering::Relaxed);
    }

    pub(crate) fn items_in_current_bag(&self) -> u64 {
        self.items_in_current_bag.load(Ordering::Relaxed)
    }

    /// Called on a bag transition, not on every touch — this count only
    /// needs to reflect the *current* bag's occupancy, which only changes
    /// when an entry actually moves into it.
    pub(crate) fn set_items_in_current_bag(&self, count: u64) {
        self.items_in_current_bag.store(count, Ordering::Relaxed);
    }

    pub(crate) fn reset_counts(&self) {
        self.current_count.store(0, Ordering::Relaxed);
        self.total_count.store(0, Ordering::Relaxed);
        self.items_in_current_bag.store(0, Ordering::Relaxed);
    }

    pub(crate) fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub(crate) fn miss_count(&self) -> u64 {
        self.miss_count.load(Ordering::Relaxed)
    }
}
