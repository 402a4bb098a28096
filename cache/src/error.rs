use std::sync::Arc;
use std::time::Duration;

use depot_types::StartupError;

/// A factory failed. Every waiter of that computation receives a clone.
#[derive(Debug, Clone, thiserror::Error)]
#[error("computation for '{key}' failed: {cause:#}")]
pub struct ComputationError {
    key: String,
    cause: Arc<anyhow::Error>,
}

impl ComputationError {
    pub(crate) fn new(key: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            key: key.into(),
            cause: Arc::new(cause),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Whether two errors come from the same failed computation.
    #[must_use]
    pub fn same_failure(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause)
    }
}

/// Error types for cache lookups.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error("waiting for '{key}' timed out after {after:?}")]
    Timeout { key: String, after: Duration },
}

impl CacheError {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Computation(err) => err.key(),
            Self::Timeout { key, .. } => key,
        }
    }
}

impl From<CacheError> for StartupError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Computation(err) => StartupError::Computation {
                key: err.key.clone(),
                cause: format!("{:#}", err.cause),
            },
            CacheError::Timeout { key, after } => {
                StartupError::timeout(format!("cache lookup '{key}'"), after)
            }
        }
    }
}
