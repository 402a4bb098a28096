//! Startup engine for Depot: validation, phase orchestration, reference-data
//! warm-up and the readiness checklist.
//!
//! The engine has no IO of its own. Databases, configuration and data feeds
//! come in through the traits in [`services`].

mod checklist;
mod orchestrator;
mod parallel;
mod progress;
mod reference;
pub mod services;
mod startup;
mod util;
pub mod validation;

pub use checklist::generate_checklist;
pub use orchestrator::{
    COMPLETE_MESSAGE, OrchestratorError, Phase, PhaseContext, PhaseOrchestrator,
};
pub use parallel::{ParallelError, SubTaskFailure, run_parallel};
pub use progress::{
    Immediate, ProgressFut, ProgressSink, ProgressStrategy, Smoothed, TracingProgress,
};
pub use reference::{Bus, Driver, ReferenceData, ReferenceLoaders, Route, Student};
pub use services::{
    AsyncInitializable, ConfigProvider, ConnectivityProbe, Loader, ServiceFut, StaticLoader,
    StaticProbe,
};
pub use startup::{
    FINALIZE, INITIALIZE_SERVICES, PRELOAD_REFERENCE_DATA, StartupOptions, StartupServices,
    VALIDATE, run_startup, standard_plan,
};
pub use util::truncate_with_ellipsis;
pub use validation::{CheckOutcome, ValidationCheck, ValidationPipeline, ValidationReport};

// Data model re-exports so callers need only this crate.
pub use depot_cache::{CacheError, CacheStats, LazyResourceCache, TtlCache};
pub use depot_types::{
    CheckCategory, PhaseResult, Severity, StartupError, StartupResult, StartupStatus,
    ValidationResult,
};
pub use tokio_util::sync::CancellationToken;
