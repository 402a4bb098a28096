//! Sequential phase runner.
//!
//! Phases run strictly in declaration order. Before each phase the run checks
//! for cancellation; while a phase runs it races its action against the
//! phase timeout and the cancellation token. A failed critical phase ends the
//! run as `Failed`; a failed non-critical phase is recorded and the run moves
//! on. Each call to [`PhaseOrchestrator::run`] owns its own state.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use depot_types::{PhaseResult, StartupError, StartupResult, StartupStatus, ValidationResult};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::progress::{Immediate, ProgressSink, ProgressStrategy};
use crate::util::panic_payload_to_string;

pub const COMPLETE_MESSAGE: &str = "Startup complete";

type PhaseAction = Arc<dyn Fn(PhaseContext) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// A named unit of startup work.
///
/// The action resolves to `Ok(true)` on success. `Ok(false)`, an error, or a
/// panic mark the phase failed.
#[derive(Clone)]
pub struct Phase {
    name: String,
    start: u8,
    end: u8,
    critical: bool,
    timeout: Option<Duration>,
    action: PhaseAction,
}

impl Phase {
    /// A critical phase covering `start..=end` percent of the progress bar.
    pub fn new<F, Fut>(name: impl Into<String>, start: u8, end: u8, action: F) -> Self
    where
        F: Fn(PhaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let name = name.into();
        Self {
            name,
            start,
            end,
            critical: true,
            timeout: None,
            action: Arc::new(move |ctx| action(ctx).boxed()),
        }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_critical(&self) -> bool {
        self.critical
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("critical", &self.critical)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Handed to each phase action.
#[derive(Clone)]
pub struct PhaseContext {
    phase: Arc<str>,
    cancel: CancellationToken,
    validation: Arc<Mutex<Vec<ValidationResult>>>,
}

impl PhaseContext {
    #[must_use]
    pub fn phase_name(&self) -> &str {
        &self.phase
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Attach validation results to the run's [`StartupResult`].
    pub fn record_validation(&self, results: impl IntoIterator<Item = ValidationResult>) {
        self.validation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(results);
    }
}

impl fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseContext")
            .field("phase", &self.phase)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("phase '{name}' has invalid progress range {start}..{end} (need start <= end <= 100)")]
    InvalidWeight { name: String, start: u8, end: u8 },
    #[error("phase name '{name}' is used more than once")]
    DuplicatePhase { name: String },
}

pub struct PhaseOrchestrator {
    phases: Vec<Phase>,
    strategy: Arc<dyn ProgressStrategy>,
}

impl fmt::Debug for PhaseOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseOrchestrator")
            .field("phases", &self.phases)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl PhaseOrchestrator {
    pub fn new(phases: Vec<Phase>) -> Result<Self, OrchestratorError> {
        let mut seen = HashSet::new();
        for phase in &phases {
            if phase.start > phase.end || phase.end > 100 {
                return Err(OrchestratorError::InvalidWeight {
                    name: phase.name.clone(),
                    start: phase.start,
                    end: phase.end,
                });
            }
            if !seen.insert(phase.name.as_str()) {
                return Err(OrchestratorError::DuplicatePhase {
                    name: phase.name.clone(),
                });
            }
        }
        Ok(Self {
            phases,
            strategy: Arc::new(Immediate),
        })
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ProgressStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub async fn run(&self, cancel: &CancellationToken, sink: &dyn ProgressSink) -> StartupResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        let validation = Arc::new(Mutex::new(Vec::new()));
        let mut phase_results = Vec::with_capacity(self.phases.len());
        let mut status = StartupStatus::Completed;

        tracing::info!(%run_id, phases = self.phases.len(), "startup run starting");

        for phase in &self.phases {
            if cancel.is_cancelled() {
                tracing::info!(%run_id, next = %phase.name, "startup cancelled before phase");
                status = StartupStatus::Cancelled;
                break;
            }

            sink.report(phase.start, &phase.name);
            let ctx = PhaseContext {
                phase: Arc::from(phase.name.as_str()),
                cancel: cancel.clone(),
                validation: Arc::clone(&validation),
            };

            let phase_started = Instant::now();
            let outcome = execute(phase, ctx, cancel).await;
            let elapsed = phase_started.elapsed();

            match outcome {
                Ok(()) => {
                    tracing::info!(
                        %run_id,
                        phase = %phase.name,
                        elapsed_ms = depot_types::duration_ms(elapsed),
                        "phase succeeded"
                    );
                    phase_results.push(PhaseResult::succeeded(&phase.name, phase.critical, elapsed));
                    self.strategy
                        .advance(sink, phase.start, phase.end, &phase.name, cancel)
                        .await;
                }
                Err(err) => {
                    tracing::warn!(
                        %run_id,
                        phase = %phase.name,
                        critical = phase.critical,
                        "phase failed: {err}"
                    );
                    let cancelled = err.is_cancelled();
                    phase_results.push(PhaseResult::failed(
                        &phase.name,
                        phase.critical,
                        elapsed,
                        err,
                    ));
                    if cancelled {
                        status = StartupStatus::Cancelled;
                        break;
                    }
                    if phase.critical {
                        status = StartupStatus::Failed;
                        break;
                    }
                }
            }
        }

        if status == StartupStatus::Completed {
            sink.report(100, COMPLETE_MESSAGE);
        }

        let validation_results = std::mem::take(
            &mut *validation.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let result = StartupResult::new(
            run_id,
            started_at,
            status,
            phase_results,
            validation_results,
            started.elapsed(),
        );
        tracing::info!(
            %run_id,
            status = %result.status(),
            ready = result.is_ready(),
            total_ms = result.total_duration_ms(),
            "startup run finished"
        );
        result
    }
}

/// Run one phase action under its timeout and the run's cancellation token.
async fn execute(
    phase: &Phase,
    ctx: PhaseContext,
    cancel: &CancellationToken,
) -> Result<(), StartupError> {
    let action = AssertUnwindSafe((phase.action)(ctx)).catch_unwind();
    let guarded = async {
        match phase.timeout {
            Some(limit) => tokio::time::timeout(limit, action).await.map_err(|_| limit),
            None => Ok(action.await),
        }
    };

    let outcome = tokio::select! {
        biased;
        outcome = guarded => outcome,
        () = cancel.cancelled() => return Err(StartupError::Cancelled),
    };

    let cause = match outcome {
        Ok(Ok(Ok(true))) => return Ok(()),
        Err(limit) => {
            return Err(StartupError::timeout(
                format!("phase '{}'", phase.name),
                limit,
            ));
        }
        Ok(Ok(Ok(false))) => "phase reported failure".to_string(),
        Ok(Ok(Err(err))) => format!("{err:#}"),
        Ok(Err(payload)) => format!("panicked: {}", panic_payload_to_string(&*payload)),
    };

    // An action that gave up because the run was cancelled is a cancellation.
    if cancel.is_cancelled() {
        return Err(StartupError::Cancelled);
    }
    Err(StartupError::PhaseFailure {
        name: phase.name.clone(),
        critical: phase.critical,
        cause,
    })
}
