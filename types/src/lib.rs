//! Core data model for Depot startup orchestration.
//!
//! This crate contains pure types with no IO, no async, and minimal dependencies.
//! The caches, the validation pipeline and the phase orchestrator all exchange
//! these values, and the checklist renderer reads nothing else.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod error;
mod key;
mod phase;
mod validation;

use std::time::Duration;

pub use error::StartupError;
pub use key::CacheKey;
pub use phase::{PhaseResult, StartupResult, StartupStatus};
pub use validation::{CheckCategory, Severity, ValidationResult};

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[must_use]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
