//! End-to-end runs of the standard plan.

use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use depot_config::DepotConfig;
use depot_engine::{
    AsyncInitializable, Bus, CancellationToken, FINALIZE, INITIALIZE_SERVICES,
    PRELOAD_REFERENCE_DATA, ReferenceData, ReferenceLoaders, ServiceFut, StartupOptions,
    StartupResult, StartupServices, StartupStatus, StaticProbe, VALIDATE, generate_checklist,
    run_startup,
};

use crate::common::{FlakyLoader, ProgressLog, buses, fleet_loaders, fleet_services, healthy_settings};

struct Dispatcher {
    starts: AtomicUsize,
}

impl AsyncInitializable for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn initialize<'a>(&'a self, _cancel: &'a CancellationToken) -> ServiceFut<'a, ()> {
        Box::pin(async move {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn phase_names(result: &StartupResult) -> Vec<&str> {
    result.phase_results().iter().map(|p| p.name()).collect()
}

#[tokio::test]
async fn healthy_startup_is_ready_and_warms_reference_data() {
    let dispatcher = Arc::new(Dispatcher {
        starts: AtomicUsize::new(0),
    });
    let services = fleet_services(StaticProbe::reachable(), Arc::new(healthy_settings()))
        .with_initializable(dispatcher.clone());
    let log = ProgressLog::default();

    let result = run_startup(
        &services,
        &StartupOptions::default(),
        &CancellationToken::new(),
        &log,
    )
    .await
    .unwrap();

    assert_eq!(result.status(), StartupStatus::Completed);
    assert!(result.is_ready());
    assert_eq!(
        phase_names(&result),
        [VALIDATE, INITIALIZE_SERVICES, PRELOAD_REFERENCE_DATA, FINALIZE]
    );
    assert_eq!(result.validation_results().len(), 5);
    assert_eq!(log.percentages(), [0, 30, 30, 50, 50, 90, 90, 100, 100]);
    assert_eq!(dispatcher.starts.load(Ordering::SeqCst), 1);

    let stats = services.reference().stats();
    assert_eq!(stats.entries, 4);
    let cached = services.reference().buses().await.unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(services.reference().stats().hits, 1);
}

#[tokio::test]
async fn failing_reference_feed_degrades_without_blocking() {
    let feed = Arc::new(FlakyLoader::new(buses()));
    feed.set_failing(true);
    let loaders = ReferenceLoaders {
        buses: feed.clone(),
        ..fleet_loaders(Duration::ZERO)
    };
    let services = StartupServices::new(
        Arc::new(StaticProbe::reachable()),
        Arc::new(healthy_settings()),
        ReferenceData::new(loaders, Duration::from_secs(300)),
    );
    let options = StartupOptions::default();

    let first = run_startup(&services, &options, &CancellationToken::new(), &ProgressLog::default())
        .await
        .unwrap();
    assert!(first.is_ready());
    let preload = &first.phase_results()[2];
    assert!(!preload.success());
    assert!(!preload.critical());

    let checklist = generate_checklist(&first);
    assert!(checklist.contains("Status: completed (READY)"));
    assert!(checklist.contains("❌ preload-reference-data (warning)"));
    assert!(checklist.contains("upstream feed returned 503"));

    feed.set_failing(false);
    let second = run_startup(&services, &options, &CancellationToken::new(), &ProgressLog::default())
        .await
        .unwrap();
    assert!(second.phase_results().iter().all(|p| p.success()));
    assert_eq!(feed.calls(), 2);

    let buses: Arc<[Bus]> = services.reference().buses().await.unwrap();
    assert_eq!(buses[0].registration, "FLT-001");
}

#[tokio::test]
async fn unreachable_database_aborts_with_a_checklist() {
    let services = fleet_services(StaticProbe::unreachable(), Arc::new(healthy_settings()));

    let result = run_startup(
        &services,
        &StartupOptions::default(),
        &CancellationToken::new(),
        &ProgressLog::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.status(), StartupStatus::Failed);
    assert_eq!(phase_names(&result), [VALIDATE]);
    assert_eq!(result.aborted_by().map(|p| p.name()), Some(VALIDATE));

    let checklist = generate_checklist(&result);
    assert!(checklist.contains("Status: failed (NOT READY)"));
    assert!(checklist.contains("❌ database-connectivity: Unable to connect to the database"));
    assert!(checklist.contains("→ Verify the database server is running"));
    assert_eq!(services.reference().stats().entries, 0);
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let services = fleet_services(StaticProbe::reachable(), Arc::new(healthy_settings()));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let log = ProgressLog::default();

    let result = run_startup(&services, &StartupOptions::default(), &cancel, &log)
        .await
        .unwrap();

    assert_eq!(result.status(), StartupStatus::Cancelled);
    assert!(result.phase_results().is_empty());
    assert!(log.percentages().is_empty());
    assert!(!result.is_ready());
}

#[tokio::test(start_paused = true)]
async fn file_config_sets_timeouts_and_criticality() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[startup]
reference_data_ttl_secs = 60

[startup.phases.preload-reference-data]
timeout_secs = 1
critical = true
"#
    )
    .unwrap();
    let config = DepotConfig::load_from(file.path()).unwrap();
    let options = StartupOptions::from_config(&config);
    assert_eq!(options.startup.reference_data_ttl(), Duration::from_secs(60));

    let services = StartupServices::new(
        Arc::new(StaticProbe::reachable()),
        Arc::new(healthy_settings()),
        ReferenceData::new(
            fleet_loaders(Duration::from_secs(5)),
            options.startup.reference_data_ttl(),
        ),
    );

    let result = run_startup(&services, &options, &CancellationToken::new(), &ProgressLog::default())
        .await
        .unwrap();

    assert_eq!(result.status(), StartupStatus::Failed);
    let preload = result.aborted_by().unwrap();
    assert_eq!(preload.name(), PRELOAD_REFERENCE_DATA);
    assert!(preload.error().is_some_and(|e| e.is_timeout()));
    assert!(generate_checklist(&result).contains("startup.phases.preload-reference-data.timeout_secs"));
}

#[tokio::test]
async fn startup_result_serializes_for_tooling() {
    let services = fleet_services(StaticProbe::reachable(), Arc::new(healthy_settings()));
    let result = run_startup(
        &services,
        &StartupOptions::default(),
        &CancellationToken::new(),
        &ProgressLog::default(),
    )
    .await
    .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["phase_results"].as_array().unwrap().len(), 4);

    let back: StartupResult = serde_json::from_value(json).unwrap();
    assert_eq!(back, result);
}
