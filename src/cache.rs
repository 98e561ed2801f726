//! The cache facade.

use std::hash::Hash;
use std::sync::Arc;

use crate::config::CacheConfig;
use crate::index::Index;
use crate::lifespan::LifespanManager;
use crate::stats::StatisticsSnapshot;

/// A thread-safe, in-process cache of live objects, accessed through one or
/// more named [`Index`]es.
///
/// `FluidCache` itself holds no keys — it owns the shared lifespan manager
/// (bag ring, arena, statistics, index registry) that every index it
/// creates draws on. Touching an entry through any one index extends its
/// life for all of them, since they all resolve to the same underlying
/// entry, and [`FluidCache::add`] admits a value through every registered
/// index at once so the same logical value is never tracked by more than
/// one entry.
pub struct FluidCache<V> {
    manager: Arc<LifespanManager<V>>,
}

impl<V> FluidCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Builds a cache from `config`. Infallible: an out-of-range
    /// `min_age`/`max_age` pair is clamped by [`CacheConfig::new`], not
    /// rejected here.
    pub fn new(config: CacheConfig<V>) -> Self {
        FluidCache {
            manager: Arc::new(LifespanManager::new(&config)),
        }
    }

    /// Creates a new secondary index over this cache's entries, named
    /// `name` and keyed by whatever `key_fn` derives from each value.
    ///
    /// The index is immediately backfilled from every value already live
    /// in the cache, so an index added after the cache has been in use
    /// starts populated rather than empty. Every index shares the same
    /// underlying entries: adding a value through [`FluidCache::add`] (or
    /// through any index's `get_or_create`) registers it with every index
    /// on the cache at once.
    pub fn add_index<K>(
        &self,
        name: impl Into<String>,
        key_fn: impl Fn(&V) -> K + Send + Sync + 'static,
    ) -> Arc<Index<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let name = name.into();
        let index = Arc::new(Index::new(
            name.clone(),
            self.manager.clone(),
            Arc::new(key_fn),
        ));
        self.manager.register_index(name, index.clone());
        index
    }

    /// Looks up a previously registered index by name.
    ///
    /// Returns `None` if no index was registered under `name`, or if one
    /// was but keyed by a different `K` than requested.
    pub fn get_index<K>(&self, name: &str) -> Option<Arc<Index<K, V>>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.manager.get_named(name)?.downcast::<Index<K, V>>().ok()
    }

    /// Admits `value` into the cache, canonicalized across every
    /// registered index: if an equivalent value is already tracked by any
    /// index, that entry is touched and returned instead of creating a new
    /// one.
    pub fn add(&self, value: V) -> V {
        self.manager.check_validity();
        self.manager.try_add(value)
    }

    /// Drops every entry in the cache and clears every index registered
    /// against it.
    pub fn clear(&self) {
        self.manager.clear_indexes();
        self.manager.clear();
    }

    /// A snapshot of this cache's hit/miss/entry counters and construction
    /// parameters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.manager.statistics()
    }

    /// The soft capacity this cache was configured with.
    pub fn capacity(&self) -> usize {
        self.manager.capacity()
    }

    /// The computed soft per-bag item cap (the bag ring's `bagItemLimit`),
    /// exposed for diagnostics and tests.
    pub fn bag_item_limit(&self) -> usize {
        self.manager.bag_item_limit()
    }

    /// How often the lifespan manager's cleanup pass runs.
    pub fn check_interval(&self) -> std::time::Duration {
        self.manager.check_interval()
    }
}

impl<V> std::fmt::Debug for FluidCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FluidCache")
            .field("statistics", &self.manager.statistics())
            .finish_non_exhaustive()
    }
}
