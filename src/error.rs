//! Error types returned by cache operations.

use core::fmt;

/// Errors a [`crate::FluidCache`] can report on its own behalf.
///
/// Factory failures are not represented here: a factory's own error type
/// propagates unchanged through [`crate::index::Index::get_or_create`],
/// since the cache has no opinion on what a factory considers a failure.
/// [`crate::FluidCache::add`] has no factory to fail, so it never returns
/// this type at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// A factory returned `Ok(Some(value))` but `value` failed the cache's
    /// configured `validate_fn`.
    InvalidFactoryResult,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::InvalidFactoryResult => {
                write!(f, "factory produced a value that failed validation")
            }
        }
    }
}

impl std::error::Error for CacheError {}
