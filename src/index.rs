//! Secondary key→entry maps with lazy, factory-backed creation.

use std::hash::Hash;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::arena::EntryId;
use crate::error::CacheError;
use crate::lifespan::LifespanManager;

/// The outcome of a factory call, reported back through [`Index::get_or_create`].
pub enum GetError<E> {
    /// The factory itself failed.
    Factory(E),
    /// The factory produced a value, but it failed the cache's
    /// `validate_fn`.
    Invalid(CacheError),
}

impl<E: std::fmt::Debug> std::fmt::Debug for GetError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GetError::Factory(e) => f.debug_tuple("Factory").field(e).finish(),
            GetError::Invalid(e) => f.debug_tuple("Invalid").field(e).finish(),
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for GetError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GetError::Factory(e) => write!(f, "factory failed: {e}"),
            GetError::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for GetError<E> {}

/// Object-safe view of an [`Index`] that erases its key type, letting
/// [`LifespanManager`] dispatch `findByItem`/canonicalization/clearing/
/// rebuilding across every index registered against a cache regardless of
/// what each one is keyed by.
pub(crate) trait IndexOps<V>: Send + Sync {
    /// Looks up the live entry this index would map `value` to, if any.
    fn find_by_item(&self, value: &V) -> Option<EntryId>;
    /// Registers `candidate` under the key this index derives from
    /// `value`, unless a live entry is already mapped there, in which case
    /// that entry is returned instead and `candidate` is left unregistered
    /// with this index.
    fn try_register(&self, value: &V, candidate: EntryId) -> Option<EntryId>;
    /// Drops every key this index maps.
    fn clear(&self);
    /// Fully repopulates this index's map from every live entry.
    fn rebuild(&self);
}

/// A secondary key→value view over a [`crate::FluidCache`]'s entries,
/// keyed by a `key_fn` derived from the value itself rather than by an
/// arbitrary external key.
///
/// Each index keys the same underlying entries differently — looking an
/// item up through one index and touching it makes it live longer for
/// every other index too, since they all resolve to the same
/// [`EntryId`]. Inserting a value through [`crate::FluidCache::add`] (or
/// through this index's own [`Index::get_or_create`]) registers it with
/// every index on the cache, not just this one, so the same logical value
/// is never tracked by more than one entry.
pub struct Index<K, V> {
    name: String,
    manager: Arc<LifespanManager<V>>,
    key_fn: Arc<dyn Fn(&V) -> K + Send + Sync>,
    map: Mutex<HashMap<K, EntryId>>,
}

impl<K, V> Index<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(
        name: String,
        manager: Arc<LifespanManager<V>>,
        key_fn: Arc<dyn Fn(&V) -> K + Send + Sync>,
    ) -> Self {
        Index {
            name,
            manager,
            key_fn,
            map: Mutex::new(HashMap::new()),
        }
    }

    /// The name this index was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks `key` up, touching and returning its value if present.
    pub fn get(&self, key: &K) -> Option<V> {
        self.manager.check_validity();
        let id = { *self.map.lock().get(key)? };
        self.resolve(key, id)
    }

    /// Looks `key` up, invoking `factory` to create it if absent. A value
    /// the factory produces is admitted through
    /// [`crate::lifespan::LifespanManager::try_add`], so it is registered
    /// with every index on the cache, not just this one — if another index
    /// (or another thread racing through this same index) already has an
    /// equivalent value, the factory's result is discarded in favor of the
    /// canonical entry. `factory` is called with no cache lock held, so it
    /// may do its own blocking I/O or take as long as it needs.
    pub fn get_or_create<E>(
        &self,
        key: K,
        factory: impl FnOnce(&K) -> Result<Option<V>, E>,
    ) -> Result<Option<V>, GetError<E>> {
        self.manager.check_validity();
        self.rebuild_if_needed();

        if let Some(id) = { self.map.lock().get(&key).copied() } {
            if let Some(value) = self.resolve(&key, id) {
                return Ok(Some(value));
            }
        }

        self.manager.record_miss();
        let produced = factory(&key).map_err(GetError::Factory)?;
        let Some(value) = produced else {
            return Ok(None);
        };
        if let Some(validate) = &self.manager.validate_fn {
            if !validate(&value) {
                return Err(GetError::Invalid(CacheError::InvalidFactoryResult));
            }
        }

        Ok(Some(self.manager.try_add(value)))
    }

    /// Removes `key`'s entry from the cache entirely (not just this
    /// index): other indexes referencing the same entry will find it gone
    /// on their next lookup.
    pub fn remove(&self, key: &K) -> bool {
        let Some(id) = self.map.lock().remove(key) else {
            return false;
        };
        self.manager.remove(id);
        true
    }

    /// Number of keys currently mapped by this index. Not the same as the
    /// cache's total entry count when more than one index is registered.
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether this index currently maps no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuilds this index if it has accumulated enough stale (aged-out)
    /// keys relative to the cache's capacity to be worth the cost.
    /// Rebuilds are rare — only triggered by a large gap between total and
    /// current entry counts — so they're logged at `info` rather than the
    /// `debug`/`trace` level cleanup uses.
    fn rebuild_if_needed(&self) {
        let stats = self.manager.statistics();
        if stats.total_count.saturating_sub(stats.current_count) as usize <= stats.capacity {
            return;
        }
        self.rebuild();
    }

    /// Fully repopulates this index's map by deriving a key from every
    /// live entry in the cache. Unlike pruning stale keys, this also picks
    /// up entries that were added before this index existed — the backfill
    /// step a late-registered index needs.
    pub(crate) fn rebuild(&self) {
        let mut fresh = HashMap::new();
        self.manager.for_each_live(|id, value| {
            fresh.insert((self.key_fn)(value), id);
        });
        let fresh_len = fresh.len();
        let old_len = {
            let mut map = self.map.lock();
            let old_len = map.len();
            *map = fresh;
            old_len
        };
        self.manager.note_rebuilt();
        log::info!(
            "index '{}' rebuilt: {old_len} -> {fresh_len} live entries",
            self.name
        );
    }

    fn resolve(&self, key: &K, id: EntryId) -> Option<V> {
        match self.manager.get_value(id, |value| value.clone()) {
            Some(value) => {
                self.manager.touch(id);
                self.manager.record_hit();
                Some(value)
            }
            None => {
                self.map.lock().remove(key);
                None
            }
        }
    }
}

impl<K, V> std::fmt::Debug for Index<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> IndexOps<V> for Index<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn find_by_item(&self, value: &V) -> Option<EntryId> {
        let key = (self.key_fn)(value);
        let id = *self.map.lock().get(&key)?;
        if self.manager.is_live(id) {
            Some(id)
        } else {
            None
        }
    }

    fn try_register(&self, value: &V, candidate: EntryId) -> Option<EntryId> {
        let key = (self.key_fn)(value);
        let mut map = self.map.lock();
        match map.get(&key).copied() {
            Some(existing) if self.manager.is_live(existing) => Some(existing),
            _ => {
                map.insert(key, candidate);
                None
            }
        }
    }

    fn clear(&self) {
        self.map.lock().clear();
    }

    fn rebuild(&self) {
        Index::rebuild(self);
    }
}
