//! Cache construction parameters.
//!
//! # Design Philosophy
//!
//! Kept in a flat-public-field, no-builder style: just create the struct
//! with all fields set, no constructors or builder methods needed beyond
//! the one clamping pass `CacheConfig::new` does.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound placed on `max_age`, beyond which the bag ring's sizing
/// formula would grow unreasonably large for a check interval on the
/// order of seconds.
pub const MAX_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Upper bound on the derived `check_interval`: `min(max_age, 3 minutes)`.
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// A value-validating callback run on whatever a factory produces before
/// it is accepted into the cache.
pub type ValidateFn<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// A monotonic clock, in nanoseconds since an arbitrary fixed epoch.
///
/// Defaults to wall-clock time but is overridable so tests can drive the
/// lifespan manager's cleanup logic without waiting on a real clock.
pub type NowFn = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Construction parameters for a [`crate::FluidCache`].
pub struct CacheConfig<V> {
    /// Soft target for the number of live entries the cache holds.
    ///
    /// Not a hard ceiling — exact capacity enforcement is out of scope;
    /// cleanup uses it to decide how aggressively to retire aged bags.
    pub capacity: NonZeroUsize,
    /// Minimum time an entry is immune from cleanup-driven removal,
    /// regardless of capacity pressure.
    pub min_age: Duration,
    /// Maximum time an entry may live once it stops being touched.
    pub max_age: Duration,
    /// How often the lifespan manager's cleanup pass runs.
    pub check_interval: Duration,
    /// Source of the current time, in nanoseconds since a fixed epoch.
    pub now_fn: NowFn,
    /// Optional check a factory-produced value must pass before being
    /// admitted; a value that fails this is reported to the caller as
    /// [`crate::error::CacheError::InvalidFactoryResult`].
    pub validate_fn: Option<ValidateFn<V>>,
}

impl<V> CacheConfig<V> {
    /// Builds a config with the given capacity and ages, deriving
    /// `check_interval` and defaulting `now_fn`/`validate_fn`.
    ///
    /// Clamps `max_age` to [`MAX_MAX_AGE`], and clamps a `min_age` that
    /// exceeds it down to the (clamped) `max_age` rather than rejecting
    /// construction, since every other constructor in this crate is
    /// infallible. `check_interval` is derived as `min(max_age,
    /// MAX_CHECK_INTERVAL)`, matching the relationship the bag ring's own
    /// sizing formula assumes between the two.
    pub fn new(capacity: NonZeroUsize, min_age: Duration, max_age: Duration) -> Self {
        let max_age = max_age.min(MAX_MAX_AGE);
        let min_age = if min_age > max_age {
            log::debug!(
                "min_age {min_age:?} exceeds max_age {max_age:?}; clamping min_age down to max_age"
            );
            max_age
        } else {
            min_age
        };
        CacheConfig {
            capacity,
            min_age,
            max_age,
            check_interval: max_age.min(MAX_CHECK_INTERVAL),
            now_fn: Arc::new(default_now),
            validate_fn: None,
        }
    }
}

fn default_now() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    Instant::now().saturating_duration_since(*epoch).as_nanos() as u64
}

impl<V> std::fmt::Debug for CacheConfig<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("capacity", &self.capacity)
            .field("min_age", &self.min_age)
            .field("max_age", &self.max_age)
            .field("check_interval", &self.check_interval)
            .field("validate_fn", &self.validate_fn.is_some())
            .finish_non_exhaustive()
    }
}
