use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{StartupError, duration_ms};

/// How a failed check or phase affects readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Failure blocks startup.
    Critical,
    /// Failure is recorded and reported only.
    Warning,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
        }
    }

    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping used by the readiness checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckCategory {
    Database,
    Configuration,
    Licensing,
    Security,
    Environment,
}

impl CheckCategory {
    /// Checklist display order.
    pub const ALL: [Self; 5] = [
        Self::Database,
        Self::Configuration,
        Self::Licensing,
        Self::Security,
        Self::Environment,
    ];

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Database => "Database",
            Self::Configuration => "Configuration",
            Self::Licensing => "Licensing",
            Self::Security => "Security",
            Self::Environment => "Environment",
        }
    }
}

/// Outcome of exactly one validation check.
///
/// Built by the pipeline and never mutated after it leaves the pipeline; the
/// `with_*` methods consume the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    name: String,
    category: CheckCategory,
    severity: Severity,
    passed: bool,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remediation: Option<String>,
    duration_ms: u64,
}

impl ValidationResult {
    pub fn new(
        name: impl Into<String>,
        category: CheckCategory,
        severity: Severity,
        passed: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            severity,
            passed,
            message: message.into(),
            remediation: None,
            duration_ms: 0,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration_ms(duration);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn category(&self) -> CheckCategory {
        self.category
    }

    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn remediation(&self) -> Option<&str> {
        self.remediation.as_deref()
    }

    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// A failed Critical check.
    #[must_use]
    pub const fn blocks_readiness(&self) -> bool {
        !self.passed && self.severity.is_critical()
    }

    /// The failure as an error value, `None` when the check passed.
    #[must_use]
    pub fn failure(&self) -> Option<StartupError> {
        (!self.passed).then(|| StartupError::ValidationFailure {
            name: self.name.clone(),
            critical: self.severity.is_critical(),
            message: self.message.clone(),
        })
    }
}
