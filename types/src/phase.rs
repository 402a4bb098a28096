use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::{StartupError, ValidationResult, duration_ms};

/// Outcome of one phase execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    name: String,
    success: bool,
    critical: bool,
    duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<StartupError>,
}

impl PhaseResult {
    pub fn succeeded(name: impl Into<String>, critical: bool, duration: Duration) -> Self {
        Self {
            name: name.into(),
            success: true,
            critical,
            duration_ms: duration_ms(duration),
            error: None,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        critical: bool,
        duration: Duration,
        error: StartupError,
    ) -> Self {
        Self {
            name: name.into(),
            success: false,
            critical,
            duration_ms: duration_ms(duration),
            error: Some(error),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub const fn critical(&self) -> bool {
        self.critical
    }

    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    #[must_use]
    pub fn error(&self) -> Option<&StartupError> {
        self.error.as_ref()
    }
}

/// Terminal status of a startup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupStatus {
    Completed,
    Failed,
    Cancelled,
}

impl StartupStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StartupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal artifact of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupResult {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    status: StartupStatus,
    phase_results: Vec<PhaseResult>,
    validation_results: Vec<ValidationResult>,
    total_duration_ms: u64,
}

impl StartupResult {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        status: StartupStatus,
        phase_results: Vec<PhaseResult>,
        validation_results: Vec<ValidationResult>,
        total_duration: Duration,
    ) -> Self {
        Self {
            run_id,
            started_at,
            status,
            phase_results,
            validation_results,
            total_duration_ms: duration_ms(total_duration),
        }
    }

    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn status(&self) -> StartupStatus {
        self.status
    }

    /// Results of the phases that ran, in declaration order.
    #[must_use]
    pub fn phase_results(&self) -> &[PhaseResult] {
        &self.phase_results
    }

    #[must_use]
    pub fn validation_results(&self) -> &[ValidationResult] {
        &self.validation_results
    }

    #[must_use]
    pub const fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    /// Deployment gate: the run completed and no Critical check failed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == StartupStatus::Completed
            && !self
                .validation_results
                .iter()
                .any(ValidationResult::blocks_readiness)
    }

    /// The failed critical phase that stopped the run, if any.
    #[must_use]
    pub fn aborted_by(&self) -> Option<&PhaseResult> {
        self.phase_results
            .iter()
            .find(|phase| !phase.success() && phase.critical())
    }

    /// Every recorded failure: failed checks first, then failed phases.
    #[must_use]
    pub fn failures(&self) -> Vec<StartupError> {
        self.validation_results
            .iter()
            .filter_map(ValidationResult::failure)
            .chain(
                self.phase_results
                    .iter()
                    .filter_map(|phase| phase.error().cloned()),
            )
            .collect()
    }
}
