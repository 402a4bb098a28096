//! Single-flight lazy resource cache.
//!
//! The cache owns two maps behind one mutex: stored values and in-flight
//! computations. A miss creates an [`InFlightSlot`] holding a shared future;
//! later callers for the same key clone that future instead of calling their
//! own factory. The computation itself removes its slot and, on success,
//! stores the value inside the same critical section, so a key never has two
//! slots and a failed computation is never visible to the next caller.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use depot_types::CacheKey;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::{CacheError, CacheStats, ComputationError};

type Computation<V> = Shared<BoxFuture<'static, Result<V, ComputationError>>>;

struct InFlightSlot<V> {
    computation: Computation<V>,
    waiters: usize,
}

struct State<K, V> {
    entries: HashMap<K, V>,
    in_flight: HashMap<K, InFlightSlot<V>>,
    hits: u64,
    misses: u64,
    coalesced: u64,
}

impl<K, V> Default for State<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            hits: 0,
            misses: 0,
            coalesced: 0,
        }
    }
}

fn lock<K, V>(state: &Mutex<State<K, V>>) -> MutexGuard<'_, State<K, V>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Lookup<V> {
    Hit(V),
    Wait(Computation<V>),
}

/// Per-key memoized async factory with at most one computation in flight per key.
///
/// ```ignore
/// let services: LazyResourceCache<Arc<GpsClient>> = LazyResourceCache::new();
/// let gps = services
///     .get_or_create(CacheKey::new("service", "gps"), || GpsClient::connect(url))
///     .await?;
/// ```
pub struct LazyResourceCache<V, K = CacheKey> {
    state: Arc<Mutex<State<K, V>>>,
}

impl<V, K> Clone for LazyResourceCache<V, K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V, K> Default for LazyResourceCache<V, K> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }
}

impl<V, K> fmt::Debug for LazyResourceCache<V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("LazyResourceCache")
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

impl<V, K> LazyResourceCache<V, K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing it with `factory` on a miss.
    ///
    /// `factory` runs at most once per generation of `key` no matter how many
    /// callers race; callers that arrive while it runs receive the same value
    /// or the same [`ComputationError`].
    pub async fn get_or_create<F, Fut, E>(&self, key: K, factory: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        match self.begin(key, factory) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Wait(computation) => computation.await.map_err(CacheError::from),
        }
    }

    /// Like [`Self::get_or_create`], but this caller stops waiting after `timeout`.
    ///
    /// The computation is not cancelled: it keeps running for other waiters and
    /// still stores its value when it succeeds.
    pub async fn get_or_create_within<F, Fut, E>(
        &self,
        key: K,
        timeout: Duration,
        factory: F,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let display_key = key.to_string();
        match self.begin(key, factory) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Wait(computation) => match tokio::time::timeout(timeout, computation).await {
                Ok(outcome) => outcome.map_err(CacheError::from),
                Err(_) => {
                    tracing::debug!(key = %display_key, ?timeout, "gave up waiting for computation");
                    Err(CacheError::Timeout {
                        key: display_key,
                        after: timeout,
                    })
                }
            },
        }
    }

    /// The stored value for `key`, without computing anything.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        lock(&self.state).entries.get(key).cloned()
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.state).in_flight.contains_key(key)
    }

    /// Drop the stored value for `key`. A computation already in flight is
    /// left alone and will store its result when it finishes.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = lock(&self.state).entries.remove(key).is_some();
        if removed {
            tracing::debug!(key = %key, "cache entry invalidated");
        }
        removed
    }

    /// Drop every stored value. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = lock(&self.state);
        let removed = state.entries.len();
        state.entries.clear();
        removed
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        CacheStats {
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
            hits: state.hits,
            misses: state.misses,
            coalesced: state.coalesced,
            expired: 0,
        }
    }

    fn begin<F, Fut, E>(&self, key: K, factory: F) -> Lookup<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        if let Some(value) = state.entries.get(&key) {
            state.hits += 1;
            return Lookup::Hit(value.clone());
        }

        if let Some(slot) = state.in_flight.get_mut(&key) {
            slot.waiters += 1;
            state.coalesced += 1;
            tracing::debug!(key = %key, waiters = slot.waiters, "joined in-flight computation");
            return Lookup::Wait(slot.computation.clone());
        }

        state.misses += 1;
        let computation = compute(Arc::downgrade(&self.state), key.clone(), factory)
            .boxed()
            .shared();
        state.in_flight.insert(
            key.clone(),
            InFlightSlot {
                computation: computation.clone(),
                waiters: 1,
            },
        );
        drop(guard);

        tracing::debug!(key = %key, "cache miss; starting computation");
        // Driven by its own task so it finishes even if every waiter is dropped.
        tokio::spawn(computation.clone());
        Lookup::Wait(computation)
    }
}

async fn compute<K, V, F, Fut, E>(
    state: Weak<Mutex<State<K, V>>>,
    key: K,
    factory: F,
) -> Result<V, ComputationError>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
    E: Into<anyhow::Error>,
{
    let outcome = match AssertUnwindSafe(async move { factory().await })
        .catch_unwind()
        .await
    {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ComputationError::new(key.to_string(), err.into())),
        Err(payload) => Err(ComputationError::new(
            key.to_string(),
            anyhow::anyhow!("factory panicked: {}", panic_message(payload.as_ref())),
        )),
    };

    let Some(state) = state.upgrade() else {
        return outcome;
    };
    let waiters = {
        let mut state = lock(&state);
        let waiters = state.in_flight.remove(&key).map_or(0, |slot| slot.waiters);
        if let Ok(value) = &outcome {
            state.entries.insert(key.clone(), value.clone());
        }
        waiters
    };

    match &outcome {
        Ok(_) => tracing::debug!(key = %key, waiters, "computation stored"),
        Err(err) => tracing::warn!(key = %key, waiters, "{err}; nothing cached"),
    }
    outcome
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
