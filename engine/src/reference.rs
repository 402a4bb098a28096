//! Fleet reference data served from a TTL cache.
//!
//! Each collection is cached whole under one key; a refresh reloads the full
//! collection. Screens share the `Arc` slices handed out here, so warming the
//! cache during startup makes the first screen load free.

use std::sync::Arc;
use std::time::Duration;

use depot_cache::{CacheError, CacheStats, Clock, SystemClock, TtlCache};
use depot_types::CacheKey;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::parallel::{ParallelError, run_parallel};
use crate::services::Loader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bus {
    pub id: u32,
    pub registration: String,
    pub capacity: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Driver {
    pub id: u32,
    pub name: String,
    pub license_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: u32,
    pub name: String,
    pub stops: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: u32,
    pub name: String,
    pub route_id: Option<u32>,
}

/// Sources for each reference collection.
#[derive(Clone)]
pub struct ReferenceLoaders {
    pub buses: Arc<dyn Loader<Bus>>,
    pub drivers: Arc<dyn Loader<Driver>>,
    pub routes: Arc<dyn Loader<Route>>,
    pub students: Arc<dyn Loader<Student>>,
}

struct Collection<T> {
    key: CacheKey,
    loader: Arc<dyn Loader<T>>,
    cache: TtlCache<Arc<[T]>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            loader: Arc::clone(&self.loader),
            cache: self.cache.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Collection<T> {
    fn new(kind: &'static str, loader: Arc<dyn Loader<T>>, clock: &Arc<dyn Clock>) -> Self {
        Self {
            key: CacheKey::collection(kind),
            loader,
            cache: TtlCache::with_clock(Arc::clone(clock)),
        }
    }

    async fn get(&self, ttl: Duration, cancel: &CancellationToken) -> Result<Arc<[T]>, CacheError> {
        let loader = Arc::clone(&self.loader);
        let cancel = cancel.clone();
        let kind = self.key.kind().to_string();
        self.cache
            .get_or_compute(self.key.clone(), ttl, move || async move {
                let items = loader.load_all(&cancel).await?;
                tracing::debug!(collection = %kind, count = items.len(), "reference data loaded");
                Ok::<_, anyhow::Error>(Arc::from(items))
            })
            .await
    }
}

/// Typed, cached access to fleet reference collections.
#[derive(Clone)]
pub struct ReferenceData {
    buses: Collection<Bus>,
    drivers: Collection<Driver>,
    routes: Collection<Route>,
    students: Collection<Student>,
    ttl: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ReferenceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceData")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ReferenceData {
    pub fn new(loaders: ReferenceLoaders, ttl: Duration) -> Self {
        Self::with_clock(loaders, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(loaders: ReferenceLoaders, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            buses: Collection::new("buses", loaders.buses, &clock),
            drivers: Collection::new("drivers", loaders.drivers, &clock),
            routes: Collection::new("routes", loaders.routes, &clock),
            students: Collection::new("students", loaders.students, &clock),
            ttl,
            cancel: CancellationToken::new(),
        }
    }

    pub async fn buses(&self) -> Result<Arc<[Bus]>, CacheError> {
        self.buses.get(self.ttl, &self.cancel).await
    }

    pub async fn drivers(&self) -> Result<Arc<[Driver]>, CacheError> {
        self.drivers.get(self.ttl, &self.cancel).await
    }

    pub async fn routes(&self) -> Result<Arc<[Route]>, CacheError> {
        self.routes.get(self.ttl, &self.cancel).await
    }

    pub async fn students(&self) -> Result<Arc<[Student]>, CacheError> {
        self.students.get(self.ttl, &self.cancel).await
    }

    /// Load every collection concurrently, waiting for all of them.
    pub async fn preload(&self) -> Result<(), ParallelError> {
        let tasks: [(&str, BoxFuture<'static, anyhow::Result<()>>); 4] = [
            ("buses", {
                let data = self.clone();
                async move {
                    data.buses().await?;
                    Ok::<(), anyhow::Error>(())
                }
                .boxed()
            }),
            ("drivers", {
                let data = self.clone();
                async move {
                    data.drivers().await?;
                    Ok::<(), anyhow::Error>(())
                }
                .boxed()
            }),
            ("routes", {
                let data = self.clone();
                async move {
                    data.routes().await?;
                    Ok::<(), anyhow::Error>(())
                }
                .boxed()
            }),
            ("students", {
                let data = self.clone();
                async move {
                    data.students().await?;
                    Ok::<(), anyhow::Error>(())
                }
                .boxed()
            }),
        ];
        run_parallel(tasks).await
    }

    /// Drop every cached collection so the next access reloads it.
    pub fn invalidate_all(&self) {
        self.buses.cache.invalidate(&self.buses.key);
        self.drivers.cache.invalidate(&self.drivers.key);
        self.routes.cache.invalidate(&self.routes.key);
        self.students.cache.invalidate(&self.students.key);
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        [
            self.buses.cache.stats(),
            self.drivers.cache.stats(),
            self.routes.cache.stats(),
            self.students.cache.stats(),
        ]
        .into_iter()
        .sum()
    }

    /// Ask in-progress loads to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
