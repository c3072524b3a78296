//! Example result cache.
//!
//! Memoizes serialization results per example value. Equality is pluggable through
//! [`ExampleComparer`]; [`DefaultComparer`] uses the example's own `Hash + Eq`. Entries live
//! in an LRU map of hash buckets, so lookups never clone the example and collisions are
//! resolved with the comparer.
//!
//! Misses are computed outside the lock. Two threads missing on the same example may both
//! compute; the first insert wins and both receive a valid result.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::context::SerializedExample;
use crate::error::{ConfigError, Result};

/// Equality contract used to match cached examples.
pub trait ExampleComparer<T>: Send + Sync {
    /// Whether two examples serialize identically.
    fn equals(&self, left: &T, right: &T) -> bool;

    /// Hash consistent with [`ExampleComparer::equals`].
    fn hash_of(&self, example: &T) -> u64;
}

/// Compares examples with their `Hash` and `Eq` implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparer;

impl<T: Hash + Eq> ExampleComparer<T> for DefaultComparer {
    fn equals(&self, left: &T, right: &T) -> bool {
        left == right
    }

    fn hash_of(&self, example: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        example.hash(&mut hasher);
        hasher.finish()
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that computed a result.
    pub misses: u64,
    /// Entries currently held.
    pub entries: usize,
}

struct CacheState<T, R> {
    buckets: LruCache<u64, Vec<(T, Arc<R>)>>,
    len: usize,
}

impl<T, R> CacheState<T, R> {
    fn lookup<C: ExampleComparer<T>>(&mut self, hash: u64, example: &T, comparer: &C) -> Option<Arc<R>> {
        self.buckets.get(&hash).and_then(|bucket| {
            bucket
                .iter()
                .find(|(cached, _)| comparer.equals(cached, example))
                .map(|(_, result)| Arc::clone(result))
        })
    }
}

/// Bounded memo table from examples to results.
pub struct ExampleCache<T, R, C = DefaultComparer> {
    comparer: C,
    max_entries: Option<NonZeroUsize>,
    state: Mutex<CacheState<T, R>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T, R, C> fmt::Debug for ExampleCache<T, R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExampleCache")
            .field("max_entries", &self.max_entries)
            .field("entries", &self.state.lock().len)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T, R, C: ExampleComparer<T>> ExampleCache<T, R, C> {
    /// Creates a cache holding at most `max_entries` results (`None` is unbounded).
    ///
    /// # Errors
    /// [`ConfigError::InvalidCacheSize`] for `Some(0)`.
    pub fn new(comparer: C, max_entries: Option<usize>) -> std::result::Result<Self, ConfigError> {
        let max_entries = match max_entries {
            Some(max) => Some(NonZeroUsize::new(max).ok_or(ConfigError::InvalidCacheSize(max))?),
            None => None,
        };
        Ok(Self {
            comparer,
            max_entries,
            state: Mutex::new(CacheState {
                buckets: LruCache::unbounded(),
                len: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Returns the cached result for `example`, computing and storing it on a miss.
    ///
    /// # Errors
    /// Errors from `compute`; nothing is cached then.
    pub fn get_or_compute<F>(&self, example: &T, compute: F) -> Result<Arc<R>>
    where
        T: Clone,
        F: FnOnce(&T) -> Result<R>,
    {
        let hash = self.comparer.hash_of(example);

        if let Some(hit) = self.state.lock().lookup(hash, example, &self.comparer) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(hash, "example cache hit");
            return Ok(hit);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(hash, "example cache miss");
        let computed = Arc::new(compute(example)?);

        let mut state = self.state.lock();
        if let Some(raced) = state.lookup(hash, example, &self.comparer) {
            return Ok(raced);
        }
        match state.buckets.get_mut(&hash) {
            Some(bucket) => bucket.push((example.clone(), Arc::clone(&computed))),
            None => {
                state
                    .buckets
                    .put(hash, vec![(example.clone(), Arc::clone(&computed))]);
            }
        }
        state.len += 1;

        if let Some(max) = self.max_entries {
            while state.len > max.get() {
                let Some((_, evicted)) = state.buckets.pop_lru() else {
                    break;
                };
                state.len -= evicted.len();
                tracing::trace!(count = evicted.len(), "evicted cached examples");
            }
        }

        Ok(computed)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.buckets.clear();
        state.len = 0;
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit and miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// Object-safe view of a serializer's result cache.
pub(crate) trait ResultCache<T>: Send + Sync {
    fn get_or_compute(
        &self,
        example: &T,
        compute: &mut dyn FnMut(&T) -> Result<SerializedExample>,
    ) -> Result<Arc<SerializedExample>>;

    fn stats(&self) -> CacheStats;

    fn clear(&self);
}

impl<T, C> ResultCache<T> for ExampleCache<T, SerializedExample, C>
where
    T: Clone + Send + Sync,
    C: ExampleComparer<T>,
{
    fn get_or_compute(
        &self,
        example: &T,
        compute: &mut dyn FnMut(&T) -> Result<SerializedExample>,
    ) -> Result<Arc<SerializedExample>> {
        ExampleCache::get_or_compute(self, example, |e| compute(e))
    }

    fn stats(&self) -> CacheStats {
        ExampleCache::stats(self)
    }

    fn clear(&self) {
        ExampleCache::clear(self);
    }
}
