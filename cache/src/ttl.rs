//! Time-bounded cache for read-mostly reference collections.
//!
//! Entries live in a [`LazyResourceCache`] keyed by `(key, generation)`. The
//! first caller that finds an expired entry drops it and bumps the key's
//! generation while holding the generation lock; everyone after that looks up
//! the new generation and joins its single in-flight computation. A whole
//! collection is one entry: there is no per-item invalidation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use depot_types::CacheKey;

use crate::{CacheError, CacheStats, Clock, LazyResourceCache, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Generational<K> {
    key: K,
    generation: u64,
}

impl<K: fmt::Display> fmt::Display for Generational<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.generation)
    }
}

#[derive(Clone)]
struct Stamped<V> {
    value: V,
    computed_at: Instant,
    ttl: Duration,
}

impl<V> Stamped<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.computed_at) < self.ttl
    }
}

/// Single-flight cache whose entries expire `ttl` after they were computed.
pub struct TtlCache<V, K = CacheKey> {
    inner: LazyResourceCache<Stamped<V>, Generational<K>>,
    generations: Arc<Mutex<HashMap<K, u64>>>,
    clock: Arc<dyn Clock>,
    hits: Arc<AtomicU64>,
    expired: Arc<AtomicU64>,
}

impl<V, K> Clone for TtlCache<V, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            generations: Arc::clone(&self.generations),
            clock: Arc::clone(&self.clock),
            hits: Arc::clone(&self.hits),
            expired: Arc::clone(&self.expired),
        }
    }
}

impl<V, K> fmt::Debug for TtlCache<V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("inner", &self.inner)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<V, K> Default for TtlCache<V, K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, K> TtlCache<V, K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: LazyResourceCache::new(),
            generations: Arc::new(Mutex::new(HashMap::new())),
            clock,
            hits: Arc::new(AtomicU64::new(0)),
            expired: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the value for `key` if it was computed less than `ttl` ago,
    /// otherwise compute it once with `factory` and store it for `ttl`.
    ///
    /// The `ttl` recorded is the one passed by the caller whose computation
    /// produced the entry.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        factory: F,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let slot = match self.fresh_or_slot(key) {
            Ok(value) => return Ok(value),
            Err(slot) => slot,
        };

        let clock = Arc::clone(&self.clock);
        let stamped = self
            .inner
            .get_or_create(slot, move || async move {
                let value = factory().await.map_err(Into::into)?;
                Ok::<_, anyhow::Error>(Stamped {
                    value,
                    computed_at: clock.now(),
                    ttl,
                })
            })
            .await?;
        Ok(stamped.value)
    }

    /// The value for `key` if present and not expired.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let generations = self.lock_generations();
        let generation = generations.get(key).copied().unwrap_or(0);
        let stamped = self.inner.get(&Generational {
            key: key.clone(),
            generation,
        })?;
        stamped.is_fresh(self.clock.now()).then_some(stamped.value)
    }

    /// Drop the entry for `key`. A computation already in flight still stores
    /// its result.
    pub fn invalidate(&self, key: &K) -> bool {
        let generations = self.lock_generations();
        let generation = generations.get(key).copied().unwrap_or(0);
        self.inner.invalidate(&Generational {
            key: key.clone(),
            generation,
        })
    }

    pub fn clear(&self) -> usize {
        self.inner.clear()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.inner.stats();
        stats.hits += self.hits.load(Ordering::Relaxed);
        stats.expired = self.expired.load(Ordering::Relaxed);
        stats
    }

    fn lock_generations(&self) -> std::sync::MutexGuard<'_, HashMap<K, u64>> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// A fresh value, or the generational key to compute under.
    fn fresh_or_slot(&self, key: K) -> Result<V, Generational<K>> {
        let mut generations = self.lock_generations();
        let generation = generations.entry(key.clone()).or_insert(0);
        let current = Generational {
            key,
            generation: *generation,
        };

        let Some(stamped) = self.inner.get(&current) else {
            return Err(current);
        };
        if stamped.is_fresh(self.clock.now()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(stamped.value);
        }

        self.inner.invalidate(&current);
        *generation += 1;
        self.expired.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            key = %current.key,
            generation = *generation,
            "cache entry expired; recomputing"
        );
        Err(Generational {
            key: current.key,
            generation: *generation,
        })
    }
}
