//! The lifespan manager: owns the bag ring, advances it on a schedule, and
//! decides when an entry has aged out of the cache.

use std::any::Any;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::arena::{Arena, EntryId, NIL_ID};
use crate::bag::{AgeBag, STILL_OPEN};
use crate::config::{CacheConfig, NowFn, ValidateFn};
use crate::entry::UNLINKED;
use crate::index::{Index, IndexOps};
use crate::ring::BagRing;
use crate::stats::{Statistics, StatisticsSnapshot};

/// Once the monotonic bag counter passes this value, reset the whole cache
/// rather than let the counter approach `u64::MAX`.
const AGED_OUT_RESET_THRESHOLD: u64 = 1_000_000;

struct Maintenance {
    last_check: u64,
}

/// Coordinates bag admission, touches, periodic cleanup, and the set of
/// named indexes for every entry in a [`crate::FluidCache`]. Shared (via
/// `Arc`) by the cache facade and every [`Index`] registered against it.
pub(crate) struct LifespanManager<V> {
    arena: Arena<V>,
    ring: BagRing,
    current_bag_number: AtomicU64,
    oldest_bag_number: AtomicU64,
    capacity: usize,
    min_age_nanos: u64,
    max_age_nanos: u64,
    check_interval_nanos: u64,
    now_fn: NowFn,
    pub(crate) validate_fn: Option<ValidateFn<V>>,
    stats: Statistics,
    maintenance: Mutex<Maintenance>,
    indexes: Mutex<Vec<Arc<dyn IndexOps<V>>>>,
    named: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl<V> LifespanManager<V> {
    pub(crate) fn new(config: &CacheConfig<V>) -> Self {
        let now = (config.now_fn)();
        let slot_count = config.capacity.get() + config.capacity.get() / 4 + 16;
        let ring = BagRing::new(config.capacity.get(), config.max_age, config.check_interval);
        ring.get(0).reopen(now);
        LifespanManager {
            arena: Arena::new(slot_count),
            ring,
            current_bag_number: AtomicU64::new(0),
            oldest_bag_number: AtomicU64::new(0),
            capacity: config.capacity.get(),
            min_age_nanos: config.min_age.as_nanos() as u64,
            max_age_nanos: config.max_age.as_nanos() as u64,
            check_interval_nanos: config.check_interval.as_nanos().max(1) as u64,
            now_fn: config.now_fn.clone(),
            validate_fn: config.validate_fn.clone(),
            stats: Statistics::default(),
            maintenance: Mutex::new(Maintenance { last_check: now }),
            indexes: Mutex::new(Vec::new()),
            named: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn now(&self) -> u64 {
        (self.now_fn)()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn arena(&self) -> &Arena<V> {
        &self.arena
    }

    pub(crate) fn statistics(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            hit_count: self.stats.hit_count(),
            miss_count: self.stats.miss_count(),
            current_count: self.stats.current_count(),
            total_count: self.stats.total_count(),
            items_in_current_bag: self.stats.items_in_current_bag(),
            capacity: self.capacity,
            oldest_bag_number: self.oldest_bag_number.load(Ordering::Acquire),
            current_bag_number: self.current_bag_number.load(Ordering::Acquire),
            bag_count: self.ring.len(),
            bag_item_limit: self.ring.bag_item_limit(),
            min_age: Duration::from_nanos(self.min_age_nanos),
            max_age: Duration::from_nanos(self.max_age_nanos),
            cleanup_interval: self.ring.check_interval(),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.stats.record_hit();
    }

    pub(crate) fn record_miss(&self) {
        self.stats.record_miss();
    }

    /// Admits a value into the arena without linking it into any bag's
    /// chain yet. The entry becomes visible to lookups only once
    /// [`LifespanManager::touch`] links it in — the gap between the two is
    /// what lets [`LifespanManager::try_add`] register a candidate with
    /// every index before deciding whether it actually wins.
    pub(crate) fn insert_unlinked(&self, value: V) -> Option<EntryId> {
        self.arena.insert(value, UNLINKED)
    }

    /// Scans every registered index for a live entry already keyed to
    /// `value`, so a caller can tell whether inserting it would create a
    /// duplicate of something another index already tracks.
    pub(crate) fn find_by_item(&self, value: &V) -> Option<EntryId> {
        for index in self.indexes.lock().iter() {
            if let Some(id) = index.find_by_item(value) {
                return Some(id);
            }
        }
        None
    }

    /// Canonicalizes `value` across every registered index: if any index
    /// already maps to an equivalent value, that entry is touched and
    /// returned instead of creating a new one. Otherwise a candidate entry
    /// is registered with every index unconditionally (no index is skipped
    /// once another has reported a duplicate); if none of them found a
    /// conflicting prior entry the candidate is admitted, and if one did,
    /// the candidate is discarded in favor of the entry that won the race.
    pub(crate) fn try_add(&self, value: V) -> V
    where
        V: Clone,
    {
        if let Some(existing) = self.find_by_item(&value) {
            self.touch(existing);
            if let Some(found) = self.get_value(existing, V::clone) {
                return found;
            }
        }

        let Some(candidate) = self.insert_unlinked(value.clone()) else {
            // Arena exhausted; force a cleanup pass and surface the value
            // without caching it rather than fail the caller's request.
            self.check_validity();
            return value;
        };

        let mut duplicate = None;
        for index in self.indexes.lock().iter() {
            if let Some(existing) = index.try_register(&value, candidate) {
                duplicate = duplicate.or(Some(existing));
            }
        }

        match duplicate {
            None => {
                self.touch(candidate);
                value
            }
            Some(existing) => {
                self.arena.remove(candidate);
                self.get_value(existing, V::clone).unwrap_or(value)
            }
        }
    }

    /// Registers `index` under `name` so [`crate::FluidCache::get_index`]
    /// can retrieve it later, and backfills it from every currently live
    /// entry.
    pub(crate) fn register_index<K>(&self, name: String, index: Arc<Index<K, V>>)
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        index.rebuild();
        self.indexes.lock().push(index.clone());
        self.named.lock().insert(name, index);
    }

    pub(crate) fn get_named(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.named.lock().get(name).cloned()
    }

    pub(crate) fn clear_indexes(&self) {
        for index in self.indexes.lock().iter() {
            index.clear();
        }
    }

    /// Records that an index has fully rebuilt its key map from live
    /// entries, resetting the staleness heuristic every index's
    /// `rebuild_if_needed` shares — the churn a rebuild clears out is
    /// cache-wide, not specific to the one index that triggered it.
    pub(crate) fn note_rebuilt(&self) {
        self.stats.set_total_count(self.stats.current_count());
    }

    /// Walks every live entry, oldest bag to newest, without taking any
    /// bag's chain — used to fully repopulate an index from scratch.
    pub(crate) fn for_each_live(&self, mut f: impl FnMut(EntryId, &V)) {
        let current = self.current_bag_number.load(Ordering::Acquire);
        let oldest = self.oldest_bag_number.load(Ordering::Acquire);
        for bag_number in oldest..=current {
            let mut cursor = self.ring.get(bag_number).peek_head();
            while cursor != NIL_ID {
                let next = self.arena.with(cursor, |entry| entry.next()).unwrap_or(NIL_ID);
                self.arena.with(cursor, |entry| f(cursor, entry.value()));
                cursor = next;
            }
        }
    }

    /// Wait-free with respect to this manager's lock: reattributes `id` to
    /// the current bag if it isn't already there. Does nothing if the
    /// entry is already in the current bag (the common case for a busy
    /// entry touched more than once per `check_interval`). An entry still
    /// carrying its unlinked sentinel is being admitted for the first time,
    /// which is what triggers the add counters.
    pub(crate) fn touch(&self, id: EntryId) {
        let current = self.current_bag_number.load(Ordering::Acquire);
        let Some(bag_number) = self.arena.with(id, |entry| entry.bag_number()) else {
            return;
        };
        if bag_number == current {
            return;
        }
        let was_unlinked = bag_number == UNLINKED;
        self.arena.with_mut(id, |entry| entry.relocate(current));
        self.current_bag(current).push(&self.arena, id);
        self.stats
            .set_items_in_current_bag(self.current_bag(current).item_count() as u64);
        if was_unlinked {
            self.stats.record_add();
        }
    }

    pub(crate) fn remove(&self, id: EntryId) {
        if self.arena.remove(id).is_some() {
            self.stats.record_remove();
        }
    }

    pub(crate) fn is_live(&self, id: EntryId) -> bool {
        self.arena.is_live(id)
    }

    pub(crate) fn get_value<R>(&self, id: EntryId, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.arena.with(id, |entry| f(entry.value()))
    }

    fn current_bag(&self, bag_number: u64) -> &AgeBag {
        self.ring.get(bag_number)
    }

    /// Opportunistic maintenance: called from `get`/`add` paths rather
    /// than a dedicated background thread. Uses `try_lock` so a thread
    /// that loses the race just goes on with its own work — cleanup for
    /// this tick will run on the thread that won. Runs early either
    /// because a full `check_interval` has elapsed, or because the
    /// current bag has already filled past its soft item limit and
    /// waiting for the clock would let it overshoot further.
    pub(crate) fn check_validity(&self) {
        let Some(mut guard) = self.maintenance.try_lock() else {
            return;
        };
        let now = self.now();
        let elapsed_due = now.saturating_sub(guard.last_check) >= self.check_interval_nanos;
        let bag_over_limit =
            self.stats.items_in_current_bag() as usize > self.ring.bag_item_limit();
        if !elapsed_due && !bag_over_limit {
            return;
        }
        guard.last_check = now;

        let current = self.current_bag_number.load(Ordering::Acquire);
        let next_number = current + 1;
        if next_number >= AGED_OUT_RESET_THRESHOLD {
            log::debug!("bag counter aged out; resetting cache");
            self.reset_aged_out(now);
            return;
        }

        self.current_bag(current).close(now);
        self.current_bag(next_number).reopen(now);
        self.current_bag_number.store(next_number, Ordering::Release);
        self.stats.set_items_in_current_bag(0);

        let mut retired = 0u64;
        loop {
            let oldest = self.oldest_bag_number.load(Ordering::Acquire);
            if oldest >= next_number {
                break;
            }
            let bag = self.current_bag(oldest);
            let stop_time = bag.stop_time();
            if stop_time == STILL_OPEN {
                break;
            }

            let near_end_of_ring = self.ring.is_near_end(next_number, oldest);
            let expired = now.saturating_sub(stop_time) > self.max_age_nanos;
            let items_above_capacity = self
                .stats
                .current_count()
                .saturating_sub(self.capacity as u64);
            let over_capacity_and_old_enough =
                items_above_capacity > 0 && now.saturating_sub(stop_time) > self.min_age_nanos;

            if !(near_end_of_ring || expired || over_capacity_and_old_enough) {
                break;
            }

            self.clean_bag(oldest);
            self.oldest_bag_number.store(oldest + 1, Ordering::Release);
            retired += 1;
        }

        if retired > 0 {
            log::debug!("cleanup retired {retired} bag(s)");
        }
    }

    /// Retires `bag_number`, which the caller has already decided is
    /// eligible for retirement. Every entry still attributed to it (i.e.
    /// not touched since it closed) is evicted; an entry touched since has
    /// already spliced itself into its new bag's chain via `touch()`, so
    /// finding it here just means leaving it alone.
    fn clean_bag(&self, bag_number: u64) {
        let bag = self.ring.get(bag_number);
        let mut cursor = bag.take_chain();
        let mut expired = 0u64;
        let mut relocated = 0u64;

        while cursor != NIL_ID {
            let next = self.arena.with(cursor, |entry| entry.next()).unwrap_or(NIL_ID);
            let still_owned = self
                .arena
                .with(cursor, |entry| entry.bag_number() == bag_number)
                .unwrap_or(false);

            if still_owned {
                if self.arena.remove(cursor).is_some() {
                    self.stats.record_remove();
                    expired += 1;
                }
            } else {
                relocated += 1;
            }

            cursor = next;
        }

        log::trace!("clean_bag({bag_number}): expired={expired} relocated={relocated}");
    }

    fn reset_aged_out(&self, now: u64) {
        for bag_number in 0..self.ring.len() as u64 {
            self.ring.get(bag_number).reopen(now);
        }
        self.current_bag_number.store(0, Ordering::Release);
        self.oldest_bag_number.store(0, Ordering::Release);
        self.ring.get(0).reopen(now);
        self.stats.reset_counts();
        self.arena.clear();
        self.clear_indexes();
    }

    /// Drops every entry and reopens the ring at bag zero. Used by
    /// [`crate::FluidCache::clear`] as well as the aged-out reset above.
    pub(crate) fn clear(&self) {
        let now = self.now();
        self.reset_aged_out(now);
    }

    pub(crate) fn bag_item_limit(&self) -> usize {
        self.ring.bag_item_limit()
    }

    pub(crate) fn check_interval(&self) -> Duration {
        self.ring.check_interval()
    }
}
