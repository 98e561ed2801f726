//! Fixed-capacity, generation-checked storage for cache entries.
//!
//! This cache's design calls for entries to be referenced by indexes
//! without the index owning them, the way a host runtime's weak reference
//! would — dropped out from under a reader without dangling. Rust has no
//! weak-reference analogue for an arbitrary struct, so this arena plays
//! that role directly: entries live in a preallocated slot array addressed
//! by `EntryId`, and a slot's generation counter is bumped every time it is
//! freed so a stale `EntryId` resolves to "gone" instead of someone else's
//! entry.
//!
//! The slot array itself is allocated once, at cache construction, and
//! never grows or moves: `Arena::get` only ever needs a shared reference,
//! so reading an entry never contends with the free list. Allocating and
//! freeing slots does take the arena's own lock, but both only ever happen
//! while the caller already holds the lifespan manager's lock, so that lock
//! is never on the hot touch path.

use parking_lot::Mutex;

use crate::entry::Entry;

/// A generation-checked reference to a slot in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EntryId {
    pub index: u32,
    pub generation: u32,
}

const NIL: u32 = u32::MAX;

/// No entry: used for an `AgeBag`'s empty head and an entry's empty `next`.
pub(crate) const NIL_ID: EntryId = EntryId {
    index: NIL,
    generation: 0,
};

impl EntryId {
    /// Packs this id into a `u64` so it can live in an `AtomicU64`, the
    /// representation `AgeBag`'s lock-free chain head uses.
    pub(crate) fn pack(self) -> u64 {
        (u64::from(self.index) << 32) | u64::from(self.generation)
    }

    pub(crate) fn unpack(bits: u64) -> Self {
        EntryId {
            index: (bits >> 32) as u32,
            generation: bits as u32,
        }
    }
}

struct Slot<V> {
    generation: u32,
    entry: Option<Entry<V>>,
}

/// Preallocated, generation-checked storage for up to `capacity` live
/// entries plus the headroom needed to hold entries that have aged out of
/// their bag but not yet been retired by cleanup.
pub(crate) struct Arena<V> {
    slots: Box<[Mutex<Slot<V>>]>,
    free: Mutex<Vec<u32>>,
}

impl<V> Arena<V> {
    pub(crate) fn new(slot_count: usize) -> Self {
        let slots = (0..slot_count)
            .map(|_| {
                Mutex::new(Slot {
                    generation: 0,
                    entry: None,
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let free = (0..slot_count as u32).rev().collect();
        Arena {
            slots,
            free: Mutex::new(free),
        }
    }

    /// Allocates a slot for `value`, returning its id, or `None` if the
    /// arena is at capacity (the caller should force a cleanup pass and
    /// retry).
    pub(crate) fn insert(&self, value: V, bag_number: u64) -> Option<EntryId> {
        let index = self.free.lock().pop()?;
        let mut slot = self.slots[index as usize].lock();
        slot.entry = Some(Entry::new(value, bag_number));
        Some(EntryId {
            index,
            generation: slot.generation,
        })
    }

    /// Frees the slot `id` refers to, bumping its generation so any other
    /// outstanding `EntryId` for this slot is now recognized as stale.
    ///
    /// No-op if `id` was already stale.
    pub(crate) fn remove(&self, id: EntryId) -> Option<Entry<V>> {
        let mut slot = self.slots[id.index as usize].lock();
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.lock().push(id.index);
        entry
    }

    /// Runs `f` against the live entry at `id`, or returns `None` if the
    /// slot has since been freed and reused (the index's non-owning
    /// reference has been invalidated out from under it).
    pub(crate) fn with<R>(&self, id: EntryId, f: impl FnOnce(&Entry<V>) -> R) -> Option<R> {
        if id.index == NIL {
            return None;
        }
        let slot = self.slots[id.index as usize].lock();
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref().map(f)
    }

    /// Like [`Arena::with`], but gives `f` exclusive access to the entry.
    ///
    /// This is the synchronization point for an entry's mutable state
    /// (value, bag attribution, chain link): each slot's lock is held only
    /// for the duration of one such call, so concurrent touches on
    /// different entries never contend with each other.
    pub(crate) fn with_mut<R>(&self, id: EntryId, f: impl FnOnce(&mut Entry<V>) -> R) -> Option<R> {
        if id.index == NIL {
            return None;
        }
        let mut slot = self.slots[id.index as usize].lock();
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut().map(f)
    }

    /// Drops every live entry and bumps every slot's generation, so every
    /// outstanding `EntryId` anywhere (in any index, in any bag chain)
    /// reads back as stale from here on.
    pub(crate) fn clear(&self) {
        let mut free = self.free.lock();
        free.clear();
        for (index, slot) in self.slots.iter().enumerate() {
            let mut slot = slot.lock();
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            free.push(index as u32);
        }
    }

    pub(crate) fn is_live(&self, id: EntryId) -> bool {
        if id.index == NIL {
            return false;
        }
        let slot = self.slots[id.index as usize].lock();
        slot.generation == id.generation && slot.entry.is_some()
    }
}
