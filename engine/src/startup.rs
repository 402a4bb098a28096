//! The standard fleet startup plan.
//!
//! | phase                    | progress | critical |
//! |--------------------------|----------|----------|
//! | `validate`               | 0-30     | yes      |
//! | `initialize-services`    | 30-50    | yes      |
//! | `preload-reference-data` | 50-90    | no       |
//! | `finalize`               | 90-100   | no       |
//!
//! Criticality and timeouts can be overridden per phase from
//! `[startup.phases.<name>]`.

use std::sync::Arc;

use depot_cache::LazyResourceCache;
use depot_config::{DepotConfig, StartupConfig, ValidationConfig};
use depot_types::{CacheKey, StartupResult};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{OrchestratorError, Phase, PhaseContext, PhaseOrchestrator};
use crate::parallel::run_parallel;
use crate::progress::{Immediate, ProgressSink, ProgressStrategy, Smoothed};
use crate::reference::ReferenceData;
use crate::services::{AsyncInitializable, ConfigProvider, ConnectivityProbe};
use crate::validation::{
    ConnectionSecurityCheck, DatabaseConnectivityCheck, LicenseKeyCheck, PendingMigrationsCheck,
    RequiredSettingsCheck, ValidationPipeline,
};

pub const VALIDATE: &str = "validate";
pub const INITIALIZE_SERVICES: &str = "initialize-services";
pub const PRELOAD_REFERENCE_DATA: &str = "preload-reference-data";
pub const FINALIZE: &str = "finalize";

/// Everything the standard plan talks to.
#[derive(Clone)]
pub struct StartupServices {
    probe: Arc<dyn ConnectivityProbe>,
    config: Arc<dyn ConfigProvider>,
    reference: ReferenceData,
    initializables: Vec<Arc<dyn AsyncInitializable>>,
    initialized: LazyResourceCache<()>,
}

impl StartupServices {
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        config: Arc<dyn ConfigProvider>,
        reference: ReferenceData,
    ) -> Self {
        Self {
            probe,
            config,
            reference,
            initializables: Vec::new(),
            initialized: LazyResourceCache::new(),
        }
    }

    pub fn with_initializable(mut self, service: Arc<dyn AsyncInitializable>) -> Self {
        self.initializables.push(service);
        self
    }

    #[must_use]
    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// The validation pipeline with the built-in checks.
    #[must_use]
    pub fn validation_pipeline(&self, options: &ValidationConfig) -> ValidationPipeline {
        ValidationPipeline::new()
            .with_check_timeout(options.check_timeout())
            .with_check(DatabaseConnectivityCheck::new(Arc::clone(&self.probe)))
            .with_check(PendingMigrationsCheck::new(Arc::clone(&self.probe)))
            .with_check(RequiredSettingsCheck::new(
                Arc::clone(&self.config),
                options.required_settings.clone(),
            ))
            .with_check(LicenseKeyCheck::new(Arc::clone(&self.config)))
            .with_check(ConnectionSecurityCheck::new(Arc::clone(&self.config)))
    }

    /// Initialize every registered service once. Services already initialized
    /// by an earlier run are skipped; concurrent callers share one attempt.
    pub async fn initialize_all(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let tasks: Vec<(String, BoxFuture<'static, anyhow::Result<()>>)> = self
            .initializables
            .iter()
            .map(|service| {
                let name = service.name().to_string();
                let key = CacheKey::new("service", name.clone());
                let cache = self.initialized.clone();
                let service = Arc::clone(service);
                let cancel = cancel.clone();
                let task = async move {
                    cache
                        .get_or_create(key, move || async move {
                            service.initialize(&cancel).await?;
                            tracing::info!(service = service.name(), "service initialized");
                            Ok::<(), anyhow::Error>(())
                        })
                        .await?;
                    Ok::<(), anyhow::Error>(())
                }
                .boxed();
                (name, task)
            })
            .collect();
        run_parallel(tasks).await?;
        Ok(())
    }
}

impl std::fmt::Debug for StartupServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupServices")
            .field(
                "initializables",
                &self
                    .initializables
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>(),
            )
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

/// Run-level settings for the standard plan.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    pub startup: StartupConfig,
    pub validation: ValidationConfig,
}

impl StartupOptions {
    #[must_use]
    pub fn from_config(config: &DepotConfig) -> Self {
        Self {
            startup: config.startup.clone(),
            validation: config.validation.clone(),
        }
    }

    #[must_use]
    pub fn progress_strategy(&self) -> Arc<dyn ProgressStrategy> {
        if self.startup.smooth_progress {
            Arc::new(Smoothed::new(
                self.startup.progress_step,
                self.startup.progress_interval(),
            ))
        } else {
            Arc::new(Immediate)
        }
    }

    fn configure(&self, phase: Phase) -> Phase {
        let Some(overrides) = self.startup.phase(phase.name()) else {
            return phase;
        };
        let critical = overrides.critical.unwrap_or(phase.is_critical());
        phase.critical(critical).with_timeout(overrides.timeout())
    }
}

/// Build the four-phase plan.
pub fn standard_plan(
    services: &StartupServices,
    options: &StartupOptions,
) -> Result<PhaseOrchestrator, OrchestratorError> {
    let validate = {
        let services = services.clone();
        let validation = options.validation.clone();
        Phase::new(VALIDATE, 0, 30, move |ctx: PhaseContext| {
            let pipeline = services.validation_pipeline(&validation);
            async move {
                let report = pipeline.run(ctx.cancellation()).await;
                let blocking: Vec<String> = report
                    .critical_failures()
                    .map(|r| r.name().to_string())
                    .collect();
                ctx.record_validation(report.into_results());
                if !blocking.is_empty() {
                    anyhow::bail!("critical checks failed: {}", blocking.join(", "));
                }
                Ok(true)
            }
        })
    };

    let initialize = {
        let services = services.clone();
        Phase::new(INITIALIZE_SERVICES, 30, 50, move |ctx: PhaseContext| {
            let services = services.clone();
            async move {
                services.initialize_all(ctx.cancellation()).await?;
                Ok(true)
            }
        })
    };

    let preload = {
        let reference = services.reference.clone();
        Phase::new(PRELOAD_REFERENCE_DATA, 50, 90, move |_ctx: PhaseContext| {
            let reference = reference.clone();
            async move {
                reference.preload().await?;
                Ok(true)
            }
        })
        .critical(false)
    };

    let finalize = {
        let services = services.clone();
        Phase::new(FINALIZE, 90, 100, move |_ctx: PhaseContext| {
            let reference = services.reference.stats();
            let initialized = services.initialized.stats();
            async move {
                tracing::info!(
                    collections = reference.entries,
                    reference_hits = reference.hits,
                    reference_misses = reference.misses,
                    hit_rate = reference.hit_rate(),
                    services = initialized.entries,
                    "startup caches warmed"
                );
                Ok(true)
            }
        })
        .critical(false)
    };

    let phases = [validate, initialize, preload, finalize]
        .into_iter()
        .map(|phase| options.configure(phase))
        .collect();
    Ok(PhaseOrchestrator::new(phases)?.with_strategy(options.progress_strategy()))
}

/// Run the standard plan once.
pub async fn run_startup(
    services: &StartupServices,
    options: &StartupOptions,
    cancel: &CancellationToken,
    sink: &dyn ProgressSink,
) -> Result<StartupResult, OrchestratorError> {
    let plan = standard_plan(services, options)?;
    Ok(plan.run(cancel, sink).await)
}
