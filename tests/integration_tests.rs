//! End-to-end scenarios against the public `FluidCache` API, driven by a
//! fake clock so min-age/max-age behavior is deterministic rather than
//! timing-dependent.
//!
//! Cached values are `(u64, String)` pairs throughout so every index can
//! derive its key straight from the value, the way a real caller's
//! `key_fn` would.

use std::convert::Infallible;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fluid_cache::{CacheConfig, FluidCache};

type Item = (u64, String);

fn fake_clock() -> (Arc<AtomicU64>, Arc<dyn Fn() -> u64 + Send + Sync>) {
    let now = Arc::new(AtomicU64::new(0));
    let now_for_closure = now.clone();
    let now_fn: Arc<dyn Fn() -> u64 + Send + Sync> =
        Arc::new(move || now_for_closure.load(Ordering::SeqCst));
    (now, now_fn)
}

fn config_with_clock<V>(
    capacity: usize,
    min_age: Duration,
    max_age: Duration,
    check_interval: Duration,
) -> (CacheConfig<V>, Arc<AtomicU64>) {
    let (now, now_fn) = fake_clock();
    let mut config = CacheConfig::new(NonZeroUsize::new(capacity).unwrap(), min_age, max_age);
    config.now_fn = now_fn;
    config.check_interval = check_interval;
    (config, now)
}

fn advance(now: &AtomicU64, by: Duration) {
    now.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
}

#[test]
fn lazy_creation_invokes_factory_once_per_key() {
    let (config, _now) = config_with_clock::<Item>(
        100,
        Duration::from_secs(5),
        Duration::from_secs(10),
        Duration::from_secs(1),
    );
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);

    let mut calls = 0;
    for _ in 0..3 {
        let value = by_id
            .get_or_create(1, |&key| {
                calls += 1;
                Ok::<_, Infallible>(Some((key, "loaded".to_string())))
            })
            .unwrap();
        assert_eq!(value.map(|(_, text)| text), Some("loaded".to_string()));
    }
    assert_eq!(calls, 1, "factory should only run on the first miss");
}

#[test]
fn entry_survives_well_before_max_age_elapses() {
    let max_age = Duration::from_secs(10);
    let check_interval = Duration::from_secs(1);
    let (config, now) =
        config_with_clock::<Item>(1000, Duration::from_secs(1), max_age, check_interval);
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);
    by_id
        .get_or_create(1, |&id| Ok::<_, Infallible>(Some((id, "v".to_string()))))
        .unwrap();

    // Advance most of the way to max_age, forcing an opportunistic cleanup
    // pass each tick through an unrelated key so entry 1 itself is never
    // touched.
    for _ in 0..8 {
        advance(&now, check_interval);
        let _ = by_id.get(&999);
    }

    assert!(by_id.get(&1).is_some(), "entry evicted well before max_age elapsed");
}

#[test]
fn untouched_entry_is_evicted_shortly_after_max_age_elapses() {
    let max_age = Duration::from_secs(10);
    let check_interval = Duration::from_secs(1);
    let (config, now) =
        config_with_clock::<Item>(1000, Duration::from_secs(1), max_age, check_interval);
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);
    by_id
        .get_or_create(1, |&id| Ok::<_, Infallible>(Some((id, "v".to_string()))))
        .unwrap();

    // max_age plus a handful of check_interval ticks of slack for cleanup
    // to actually retire the bag this entry lives in — nowhere near a full
    // trip around the ring.
    for _ in 0..13 {
        advance(&now, check_interval);
        let _ = by_id.get(&999);
    }

    assert_eq!(
        by_id.get(&1),
        None,
        "entry should have aged out within a few check_intervals of max_age"
    );
    assert_eq!(cache.statistics().current_count, 0);
}

#[test]
fn over_capacity_entries_are_evicted_once_past_min_age() {
    let min_age = Duration::from_secs(1);
    let max_age = Duration::from_secs(600);
    let check_interval = Duration::from_secs(1);
    let capacity = 10usize;
    let (config, now) = config_with_clock::<Item>(capacity, min_age, max_age, check_interval);
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);

    let total = capacity as u64 * 3;
    for id in 0..total {
        by_id
            .get_or_create(id, |&id| Ok::<_, Infallible>(Some((id, format!("v{id}")))))
            .unwrap();
        advance(&now, check_interval);
    }
    // Past min_age for everything inserted so far; give cleanup a few more
    // ticks to catch up on the capacity overshoot.
    for _ in 0..5 {
        advance(&now, check_interval);
        let _ = by_id.get(&999_999);
    }

    let stats = cache.statistics();
    assert!(
        stats.current_count < total,
        "capacity pressure should have evicted some entries well before max_age: current_count={}",
        stats.current_count
    );
}

#[test]
fn touching_an_entry_resets_its_age() {
    let (config, now) = config_with_clock::<Item>(
        100,
        Duration::from_secs(1),
        Duration::from_secs(5),
        Duration::from_secs(1),
    );
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);
    by_id
        .get_or_create(1, |&id| Ok::<_, Infallible>(Some((id, "v".to_string()))))
        .unwrap();

    for _ in 0..20 {
        advance(&now, Duration::from_secs(1));
        // Touching every tick should keep this entry alive well past what
        // max_age would otherwise allow for an untouched entry.
        assert_eq!(by_id.get(&1).map(|(_, text)| text), Some("v".to_string()));
    }
}

#[test]
fn tryadd_canonicalization_keeps_a_single_entry_per_key() {
    let (config, _now) = config_with_clock::<Item>(
        100,
        Duration::from_secs(5),
        Duration::from_secs(10),
        Duration::from_secs(1),
    );
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);

    // Simulate a race: insert once, then call get_or_create again for the
    // same key — the second call must not invoke the factory, since the
    // entry is still live.
    by_id
        .get_or_create(7, |&id| Ok::<_, Infallible>(Some((id, "first".to_string()))))
        .unwrap();
    let mut second_call_ran = false;
    let value = by_id
        .get_or_create(7, |&id| {
            second_call_ran = true;
            Ok::<_, Infallible>(Some((id, "second".to_string())))
        })
        .unwrap();
    assert_eq!(value.map(|(_, text)| text), Some("first".to_string()));
    assert!(!second_call_ran);
    assert_eq!(cache.statistics().current_count, 1);
}

#[test]
fn adding_the_same_value_through_two_indexes_shares_one_entry() {
    let (config, _now) = config_with_clock::<Item>(
        100,
        Duration::from_secs(5),
        Duration::from_secs(10),
        Duration::from_secs(1),
    );
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);
    let by_name = cache.add_index("by_name", |v: &Item| v.1.clone());

    let added = cache.add((1, "widget".to_string()));
    assert_eq!(added, (1, "widget".to_string()));

    assert_eq!(by_id.get(&1), Some((1, "widget".to_string())));
    assert_eq!(
        by_name.get(&"widget".to_string()),
        Some((1, "widget".to_string()))
    );
    assert_eq!(cache.statistics().current_count, 1);

    // Adding the same value again must not create a second entry.
    cache.add((1, "widget".to_string()));
    assert_eq!(cache.statistics().current_count, 1);
}

#[test]
fn get_index_retrieves_a_previously_registered_index() {
    let (config, _now) = config_with_clock::<Item>(
        100,
        Duration::from_secs(5),
        Duration::from_secs(10),
        Duration::from_secs(1),
    );
    let cache: FluidCache<Item> = FluidCache::new(config);
    cache.add_index("by_id", |v: &Item| v.0);

    let by_id = cache.get_index::<u64>("by_id").expect("index should be registered");
    by_id
        .get_or_create(1, |&id| Ok::<_, Infallible>(Some((id, "v".to_string()))))
        .unwrap();
    assert_eq!(cache.statistics().current_count, 1);

    assert!(cache.get_index::<String>("by_id").is_none());
    assert!(cache.get_index::<u64>("missing").is_none());
}

#[test]
fn validate_fn_rejects_bad_factory_output() {
    let (mut config, _now) = config_with_clock::<Item>(
        100,
        Duration::from_secs(5),
        Duration::from_secs(10),
        Duration::from_secs(1),
    );
    config.validate_fn = Some(Arc::new(|value: &Item| value.1.len() > 2));
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);

    let result = by_id.get_or_create(1, |&id| Ok::<_, Infallible>(Some((id, "no".to_string()))));
    assert!(result.is_err());
    assert_eq!(cache.statistics().current_count, 0);
}

#[test]
fn clear_drops_every_entry_across_indexes() {
    let (config, _now) = config_with_clock::<Item>(
        100,
        Duration::from_secs(5),
        Duration::from_secs(10),
        Duration::from_secs(1),
    );
    let cache: FluidCache<Item> = FluidCache::new(config);
    let by_id = cache.add_index("by_id", |v: &Item| v.0);
    let by_name = cache.add_index("by_name", |v: &Item| v.1.clone());
    by_id
        .get_or_create(1, |&id| Ok::<_, Infallible>(Some((id, "a".to_string()))))
        .unwrap();
    by_name
        .get_or_create("b".to_string(), |name| {
            Ok::<_, Infallible>(Some((2, name.clone())))
        })
        .unwrap();

    cache.clear();

    assert_eq!(by_id.get(&1), None);
    assert_eq!(by_name.get(&"b".to_string()), None);
    assert_eq!(cache.statistics().current_count, 0);
}

#[test]
fn concurrent_touches_do_not_lose_entries() {
    let (config, _now) = config_with_clock::<Item>(
        1000,
        Duration::from_secs(5),
        Duration::from_secs(30),
        Duration::from_secs(1),
    );
    let cache: Arc<FluidCache<Item>> = Arc::new(FluidCache::new(config));
    let by_id = cache.add_index("by_id", |v: &Item| v.0);
    for key in 0..50 {
        by_id
            .get_or_create(key, |&key| Ok::<_, Infallible>(Some((key, format!("v{key}")))))
            .unwrap();
    }

    let mut pool = scoped_threadpool::Pool::new(8);
    pool.scoped(|scope| {
        for _ in 0..8 {
            let by_id = &by_id;
            scope.execute(move || {
                for key in 0..50 {
                    let _ = by_id.get(&key);
                }
            });
        }
    });

    for key in 0..50 {
        assert_eq!(by_id.get(&key).map(|(_, text)| text), Some(format!("v{key}")));
    }
}
