//! Fixed-size ring of [`AgeBag`]s.
//!
//! Bags are addressed by an absolute, ever-increasing bag number rather
//! than a ring-relative index, so a stale reference to a bag that has since
//! been recycled for a much later time window can never be confused with
//! the bag currently occupying that slot — callers compare the bag number
//! they recorded against the live bag's own `start_time`/`stop_time`
//! instead.

use std::time::Duration;

use crate::bag::AgeBag;

/// Preferred number of bags to keep the ring usefully granular, matching
/// this module's sizing formula.
const PREFERRED_BAGS: u64 = 20;
/// Slack bags beyond the theoretical minimum, absorbing scheduling jitter
/// in when cleanup actually runs.
const EMPTY_BUFFER: u64 = 5;

#[derive(Debug)]
pub(crate) struct BagRing {
    bags: Box<[AgeBag]>,
    /// Soft per-bag item cap before cleanup prefers to retire it early.
    bag_item_limit: usize,
    check_interval: Duration,
}

impl BagRing {
    /// Builds a ring sized for `max_age` at the given `check_interval`:
    /// `nrBags = ceil(maxAge / checkInterval) + preferredBags +
    /// emptyBuffer`, `bagItemLimit = max(capacity / preferredBags, 1)`.
    pub(crate) fn new(capacity: usize, max_age: Duration, check_interval: Duration) -> Self {
        let interval_nanos = check_interval.as_nanos().max(1);
        let max_age_nanos = max_age.as_nanos();
        let bags_for_max_age =
            u64::try_from((max_age_nanos + interval_nanos - 1) / interval_nanos).unwrap_or(u64::MAX);
        let nr_bags = bags_for_max_age
            .saturating_add(PREFERRED_BAGS)
            .saturating_add(EMPTY_BUFFER)
            .max(1);
        let bag_item_limit = (capacity as u64 / PREFERRED_BAGS).max(1) as usize;

        log::debug!(
            "bag ring sized: nr_bags={nr_bags} bag_item_limit={bag_item_limit} check_interval={check_interval:?}"
        );

        let bags = (0..nr_bags).map(|_| AgeBag::default()).collect::<Vec<_>>();
        BagRing {
            bags: bags.into_boxed_slice(),
            bag_item_limit,
            check_interval,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bags.len()
    }

    pub(crate) fn bag_item_limit(&self) -> usize {
        self.bag_item_limit
    }

    pub(crate) fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Resolves an absolute bag number to its current ring slot.
    pub(crate) fn get(&self, bag_number: u64) -> &AgeBag {
        &self.bags[(bag_number % self.bags.len() as u64) as usize]
    }

    /// Whether `candidate` is close enough to `current` that the ring would
    /// wrap onto it soon, forcing its retirement regardless of age or
    /// capacity pressure.
    pub(crate) fn is_near_end(&self, current_bag_number: u64, candidate: u64) -> bool {
        let len = self.bags.len() as u64;
        current_bag_number - candidate > len.saturating_sub(EMPTY_BUFFER)
    }
}
