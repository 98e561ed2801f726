//! A single time-sliced bucket of entries.
//!
//! An `AgeBag` covers one `[start_time, stop_time)` window. While it is the
//! current bag, entries land on its head as they are touched; once retired
//! it is only ever walked front-to-back by cleanup, which evicts whatever
//! is still attributed to it — anything touched since has already moved
//! itself to a newer bag's chain.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::arena::{Arena, EntryId, NIL_ID};

/// Fixed sentinel meaning "still open" for `stop_time`: an open bag has no
/// upper bound on its window yet.
pub(crate) const STILL_OPEN: u64 = u64::MAX;

#[derive(Debug)]
pub(crate) struct AgeBag {
    head: AtomicU64,
    start_time: AtomicU64,
    stop_time: AtomicU64,
    item_count: AtomicUsize,
}

impl Default for AgeBag {
    fn default() -> Self {
        AgeBag {
            head: AtomicU64::new(NIL_ID.pack()),
            start_time: AtomicU64::new(0),
            stop_time: AtomicU64::new(STILL_OPEN),
            item_count: AtomicUsize::new(0),
        }
    }
}

impl AgeBag {
    /// Reopens this bag (clearing whatever stale chain a previous
    /// generation around the ring left behind) to start at `start_time`.
    ///
    /// Only ever called by the lifespan manager while holding its lock —
    /// reusing a ring slot is a structural change, not a per-touch one.
    pub(crate) fn reopen(&self, start_time: u64) {
        self.head.store(NIL_ID.pack(), Ordering::Relaxed);
        self.start_time.store(start_time, Ordering::Relaxed);
        self.stop_time.store(STILL_OPEN, Ordering::Relaxed);
        self.item_count.store(0, Ordering::Relaxed);
    }

    pub(crate) fn close(&self, stop_time: u64) {
        self.stop_time.store(stop_time, Ordering::Relaxed);
    }

    pub(crate) fn start_time(&self) -> u64 {
        self.start_time.load(Ordering::Relaxed)
    }

    pub(crate) fn stop_time(&self) -> u64 {
        self.stop_time.load(Ordering::Relaxed)
    }

    pub(crate) fn item_count(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Reads this bag's chain head without taking it, for read-only
    /// traversal (index rebuilds). Unlike [`AgeBag::take_chain`], this
    /// never mutates the bag, so it may race with a concurrent cleanup
    /// pass stealing the same chain out from under the walk — callers
    /// tolerate a short, stale read the same way `cleanBag` tolerates a
    /// node that has already moved to a different bag.
    pub(crate) fn peek_head(&self) -> EntryId {
        EntryId::unpack(self.head.load(Ordering::Acquire))
    }

    /// Pushes `id` onto this bag's chain head with a Treiber-stack CAS
    /// loop. The only writer is `touch()`, moving a just-accessed entry
    /// onto whichever bag is currently open.
    pub(crate) fn push<V>(&self, arena: &Arena<V>, id: EntryId) {
        loop {
            let old_head_bits = self.head.load(Ordering::Acquire);
            let old_head = EntryId::unpack(old_head_bits);
            arena.with_mut(id, |entry| entry.set_next(old_head));
            match self.head.compare_exchange_weak(
                old_head_bits,
                id.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.item_count.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(_) => continue,
            }
        }
    }

    /// Takes the whole chain off this bag at once, leaving it empty.
    /// Used by cleanup, which then walks the returned head itself —
    /// nothing else touches a bag once cleanup has claimed its chain this
    /// way.
    pub(crate) fn take_chain(&self) -> EntryId {
        let bits = self.head.swap(NIL_ID.pack(), Ordering::AcqRel);
        self.item_count.store(0, Ordering::Relaxed);
        EntryId::unpack(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn pushed_entries_chain_in_lifo_order() {
        let arena: Arena<u32> = Arena::new(3);
        let bag = AgeBag::default();
        let a = arena.insert(1, 0).unwrap();
        let b = arena.insert(2, 0).unwrap();
        let c = arena.insert(3, 0).unwrap();
        bag.push(&arena, a);
        bag.push(&arena, b);
        bag.push(&arena, c);
        assert_eq!(bag.item_count(), 3);

        let mut seen = Vec::new();
        let mut cursor = bag.take_chain();
        while cursor != NIL_ID {
            seen.push(arena.with(cursor, |e| *e.value()).unwrap());
            cursor = arena.with(cursor, |e| e.next()).unwrap();
        }
        assert_eq!(seen, vec![3, 2, 1]);
        assert_eq!(bag.item_count(), 0);
    }

    #[test]
    fn reopen_resets_window_and_chain() {
        let bag = AgeBag::default();
        bag.reopen(10);
        bag.close(20);
        assert_eq!(bag.start_time(), 10);
        assert_eq!(bag.stop_time(), 20);
        bag.reopen(30);
        assert_eq!(bag.start_time(), 30);
        assert_eq!(bag.stop_time(), STILL_OPEN);
        assert_eq!(bag.take_chain(), NIL_ID);
    }
}
