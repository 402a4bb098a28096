//! Collaborators the startup plan depends on.
//!
//! Everything here is injected through [`crate::StartupServices`]; nothing is
//! discovered at runtime. The in-memory implementations back the demo binary
//! and tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use depot_config::ConfigProvider;

/// Boxed future returned by collaborator methods.
pub type ServiceFut<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Source of one reference-data collection.
pub trait Loader<T>: Send + Sync {
    fn load_all<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFut<'a, Vec<T>>;
}

/// Database reachability and schema state.
pub trait ConnectivityProbe: Send + Sync {
    fn can_connect<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFut<'a, bool>;

    /// Names of migrations not yet applied.
    fn pending_migrations<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> ServiceFut<'a, Vec<String>>;
}

/// A service that needs a one-time async warm-up before the app is usable.
pub trait AsyncInitializable: Send + Sync {
    /// Stable name; initialization is deduplicated per name.
    fn name(&self) -> &str;

    fn initialize<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFut<'a, ()>;
}

// ============================================================================
// In-memory collaborators
// ============================================================================

/// Serves a fixed collection after an optional delay.
#[derive(Debug, Clone)]
pub struct StaticLoader<T> {
    items: Vec<T>,
    delay: Duration,
}

impl<T> StaticLoader<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl<T: Clone + Send + Sync> Loader<T> for StaticLoader<T> {
    fn load_all<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFut<'a, Vec<T>> {
        Box::pin(async move {
            pause(self.delay, cancel).await?;
            Ok(self.items.clone())
        })
    }
}

/// A probe with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    reachable: bool,
    pending: Vec<String>,
    delay: Duration,
}

impl StaticProbe {
    #[must_use]
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn with_pending(mut self, migrations: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.pending = migrations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ConnectivityProbe for StaticProbe {
    fn can_connect<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFut<'a, bool> {
        Box::pin(async move {
            pause(self.delay, cancel).await?;
            Ok(self.reachable)
        })
    }

    fn pending_migrations<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> ServiceFut<'a, Vec<String>> {
        Box::pin(async move {
            pause(self.delay, cancel).await?;
            if !self.reachable {
                anyhow::bail!("database unreachable");
            }
            Ok(self.pending.clone())
        })
    }
}

/// Sleep for `delay`, failing early if the run is cancelled.
pub(crate) async fn pause(delay: Duration, cancel: &CancellationToken) -> anyhow::Result<()> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = cancel.cancelled() => Err(anyhow::anyhow!("cancelled")),
    }
}
