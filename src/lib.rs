#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Quick start
//!
//! ```
//! use fluid_cache::{CacheConfig, FluidCache};
//! use std::num::NonZeroUsize;
//! use std::time::Duration;
//!
//! #[derive(Clone)]
//! struct Widget {
//!     id: u64,
//!     name: String,
//! }
//!
//! let config = CacheConfig::new(
//!     NonZeroUsize::new(100).unwrap(),
//!     Duration::from_secs(5),
//!     Duration::from_secs(30),
//! );
//! let cache: FluidCache<Widget> = FluidCache::new(config);
//! let by_id = cache.add_index("by_id", |w: &Widget| w.id);
//! let by_name = cache.add_index("by_name", |w: &Widget| w.name.clone());
//!
//! let loaded = by_name
//!     .get_or_create("widget".to_string(), |name| {
//!         Ok::<_, std::convert::Infallible>(Some(Widget { id: 1, name: name.clone() }))
//!     })
//!     .unwrap();
//! assert_eq!(loaded.map(|w| w.id), Some(1));
//!
//! // The value just created through `by_name` is visible through `by_id`
//! // too, sharing the one entry rather than creating a second one.
//! assert!(by_id.get(&1).is_some());
//! assert_eq!(cache.statistics().current_count, 1);
//! ```
//!
//! ## Concurrency model
//!
//! | Lock | Guards | Taken by |
//! |------|--------|----------|
//! | Index's own `Mutex` | one index's key→entry map | `get`, `get_or_create`, `remove` |
//! | Lifespan manager's maintenance `Mutex` | bag-advance bookkeeping | `check_validity` (via `try_lock`, never blocks) |
//! | Per-entry (arena slot) `Mutex` | one entry's value/bag/link | `touch`, `try_register`, cleanup's eviction check |
//!
//! `touch()` never takes the maintenance lock, so a busy cache's hot path
//! (lookups that hit) never contends with cleanup. Factories run with no
//! lock held at all.
//!
//! ## Tuning `min_age` / `max_age`
//!
//! `min_age` is a floor: nothing is evicted before it, regardless of
//! capacity pressure. `max_age` is a ceiling: an untouched entry is
//! eventually evicted once it crosses it, regardless of how empty the
//! cache is. Capacity only influences how eagerly bags between those two
//! bounds are retired.

mod arena;
mod bag;
pub mod cache;
pub mod config;
pub mod error;
mod entry;
pub mod index;
mod lifespan;
mod ring;
pub mod stats;

pub use cache::FluidCache;
pub use config::CacheConfig;
pub use error::CacheError;
pub use index::{GetError, Index};
pub use stats::StatisticsSnapshot;
