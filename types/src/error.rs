use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::duration_ms;

/// Failure kinds surfaced by a startup run.
///
/// Every variant is plain data so it can be stored inside a [`crate::PhaseResult`],
/// serialized for ops tooling, and compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartupError {
    #[error("validation check '{name}' failed: {message}")]
    ValidationFailure {
        name: String,
        critical: bool,
        message: String,
    },
    #[error("phase '{name}' failed: {cause}")]
    PhaseFailure {
        name: String,
        critical: bool,
        cause: String,
    },
    #[error("computation for '{key}' failed: {cause}")]
    Computation { key: String, cause: String },
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },
    #[error("startup cancelled")]
    Cancelled,
}

impl StartupError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms: duration_ms(after),
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
