//! Human-readable readiness report.

use depot_types::{PhaseResult, StartupError, StartupResult, ValidationResult};

use crate::util::truncate_with_ellipsis;
use crate::validation::group_by_category;

const PASS: &str = "✅";
const FAIL: &str = "❌";
const MAX_DETAIL_CHARS: usize = 240;

/// Render a run as a checklist for operators.
///
/// Validation results are grouped by category, failures carry their message
/// and remediation, and phases that ran are listed last.
#[must_use]
pub fn generate_checklist(result: &StartupResult) -> String {
    let mut out = String::new();

    out.push_str("Depot startup checklist\n");
    out.push_str(&format!(
        "Status: {} ({})\n",
        result.status(),
        if result.is_ready() { "READY" } else { "NOT READY" }
    ));
    out.push_str(&format!("Run id: {}\n", result.run_id()));
    out.push_str(&format!(
        "Started: {}\n",
        result.started_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("Total duration: {} ms\n", result.total_duration_ms()));

    let groups = group_by_category(result.validation_results());
    if groups.is_empty() {
        out.push_str("\nNo validation checks ran\n");
    }
    for (category, checks) in groups {
        out.push('\n');
        out.push_str(category.title());
        out.push('\n');
        for check in checks {
            push_check(&mut out, check);
        }
    }

    if !result.phase_results().is_empty() {
        out.push_str("\nStartup phases\n");
        for phase in result.phase_results() {
            push_phase(&mut out, phase);
        }
    }

    out
}

fn push_check(out: &mut String, check: &ValidationResult) {
    if check.passed() {
        out.push_str(&format!("  {PASS} {}: {}\n", check.name(), check.message()));
        return;
    }

    let marker = if check.severity().is_critical() {
        ""
    } else {
        " (warning)"
    };
    out.push_str(&format!(
        "  {FAIL} {}{marker}: {}\n",
        check.name(),
        truncate_with_ellipsis(check.message(), MAX_DETAIL_CHARS)
    ));
    if let Some(remediation) = check.remediation() {
        out.push_str(&format!("     → {remediation}\n"));
    }
}

fn push_phase(out: &mut String, phase: &PhaseResult) {
    let Some(error) = phase.error() else {
        out.push_str(&format!(
            "  {PASS} {} ({} ms)\n",
            phase.name(),
            phase.duration_ms()
        ));
        return;
    };

    let marker = if phase.critical() || error.is_cancelled() {
        ""
    } else {
        " (warning)"
    };
    out.push_str(&format!(
        "  {FAIL} {}{marker} ({} ms): {}\n",
        phase.name(),
        phase.duration_ms(),
        truncate_with_ellipsis(&error.to_string(), MAX_DETAIL_CHARS)
    ));
    out.push_str(&format!("     → {}\n", phase_hint(phase.name(), error)));
}

fn phase_hint(name: &str, error: &StartupError) -> String {
    match error {
        StartupError::Timeout { .. } => format!(
            "Raise startup.phases.{name}.timeout_secs or investigate the slow dependency"
        ),
        StartupError::Cancelled => {
            "Startup was cancelled; run it again to finish the remaining phases".to_string()
        }
        StartupError::Computation { key, .. } => {
            format!("Loading '{key}' failed; check the data source behind it")
        }
        StartupError::PhaseFailure { .. } | StartupError::ValidationFailure { .. } => {
            format!("Check the log output for phase '{name}'")
        }
    }
}
