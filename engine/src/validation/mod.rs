//! Startup validation.
//!
//! Every registered check runs, concurrently, on every run. A check's own
//! error, panic or timeout turns into a failed [`ValidationResult`]; nothing
//! escapes the pipeline. The report is valid when every Critical check passed.

mod checks;

pub use checks::{
    CONNECTION_STRING_KEY, ConnectionSecurityCheck, DatabaseConnectivityCheck, LICENSE_KEY,
    LicenseKeyCheck, PendingMigrationsCheck, RequiredSettingsCheck,
};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use depot_types::{CheckCategory, Severity, ValidationResult};
use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::services::ServiceFut;
use crate::util::panic_payload_to_string;

/// What a check observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    passed: bool,
    message: String,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One independent readiness check.
pub trait ValidationCheck: Send + Sync {
    fn name(&self) -> &str;
    fn category(&self) -> CheckCategory;
    fn severity(&self) -> Severity;

    /// Shown under the check when it fails.
    fn remediation(&self) -> Option<&str> {
        None
    }

    fn check<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFut<'a, CheckOutcome>;
}

#[derive(Clone, Default)]
pub struct ValidationPipeline {
    checks: Vec<Arc<dyn ValidationCheck>>,
    check_timeout: Option<Duration>,
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("check_timeout", &self.check_timeout)
            .finish()
    }
}

impl ValidationPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check(mut self, check: impl ValidationCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Fail any check that has not finished within `timeout`.
    pub fn with_check_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.check_timeout = timeout;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check and collect results in registration order.
    pub async fn run(&self, cancel: &CancellationToken) -> ValidationReport {
        let started = Instant::now();
        let results = join_all(
            self.checks
                .iter()
                .map(|check| run_check(check.as_ref(), self.check_timeout, cancel)),
        )
        .await;

        let report = ValidationReport::new(results);
        tracing::info!(
            checks = report.results.len(),
            failed = report.failed().count(),
            valid = report.is_valid,
            elapsed_ms = depot_types::duration_ms(started.elapsed()),
            "validation finished"
        );
        report
    }
}

async fn run_check(
    check: &dyn ValidationCheck,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> ValidationResult {
    let started = Instant::now();
    let guarded = AssertUnwindSafe(check.check(cancel)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(Ok(CheckOutcome::fail(format!(
                "timed out after {}ms",
                depot_types::duration_ms(limit)
            )))),
        },
        None => guarded.await,
    };

    let outcome = match outcome {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => CheckOutcome::fail(format!("{err:#}")),
        Err(payload) => CheckOutcome::fail(format!(
            "check panicked: {}",
            panic_payload_to_string(&*payload)
        )),
    };

    let mut result = ValidationResult::new(
        check.name(),
        check.category(),
        check.severity(),
        outcome.passed,
        outcome.message,
    )
    .with_duration(started.elapsed());

    if result.passed() {
        tracing::debug!(check = check.name(), "{}", result.message());
    } else {
        if let Some(remediation) = check.remediation() {
            result = result.with_remediation(remediation);
        }
        tracing::warn!(
            check = check.name(),
            severity = %check.severity(),
            "validation failed: {}",
            result.message()
        );
    }
    result
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    results: Vec<ValidationResult>,
    is_valid: bool,
}

impl ValidationReport {
    #[must_use]
    pub fn new(results: Vec<ValidationResult>) -> Self {
        let is_valid = !results.iter().any(ValidationResult::blocks_readiness);
        Self { results, is_valid }
    }

    /// True when no Critical check failed. Warning failures never affect it.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.is_valid
    }

    #[must_use]
    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    #[must_use]
    pub fn into_results(self) -> Vec<ValidationResult> {
        self.results
    }

    pub fn failed(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.passed())
    }

    pub fn critical_failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.blocks_readiness())
    }

    /// Results grouped by category in display order. Empty categories are
    /// omitted.
    #[must_use]
    pub fn by_category(&self) -> Vec<(CheckCategory, Vec<&ValidationResult>)> {
        group_by_category(&self.results)
    }
}

pub(crate) fn group_by_category(
    results: &[ValidationResult],
) -> Vec<(CheckCategory, Vec<&ValidationResult>)> {
    CheckCategory::ALL
        .iter()
        .filter_map(|&category| {
            let group: Vec<_> = results
                .iter()
                .filter(|r| r.category() == category)
                .collect();
            (!group.is_empty()).then_some((category, group))
        })
        .collect()
}
