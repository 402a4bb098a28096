//! Validation pipeline with the built-in fleet checks.

use std::sync::Arc;
use std::time::Duration;

use depot_config::{DepotConfig, MapConfig, ValidationConfig};
use depot_engine::{
    CancellationToken, CheckCategory, CheckOutcome, ConfigProvider, ServiceFut, Severity,
    StaticProbe, ValidationCheck, ValidationPipeline,
};

use crate::common::{fleet_services, healthy_settings};

fn required(keys: &[&str]) -> ValidationConfig {
    ValidationConfig {
        check_timeout_secs: Some(5),
        required_settings: keys.iter().map(ToString::to_string).collect(),
    }
}

#[tokio::test]
async fn healthy_environment_passes_every_check() {
    let services = fleet_services(StaticProbe::reachable(), Arc::new(healthy_settings()));
    let report = services
        .validation_pipeline(&required(&["fleet.depot_name"]))
        .run(&CancellationToken::new())
        .await;

    assert!(report.is_valid(), "{:?}", report.failed().collect::<Vec<_>>());
    let names: Vec<&str> = report.results().iter().map(|r| r.name()).collect();
    assert_eq!(
        names,
        [
            "database-connectivity",
            "pending-migrations",
            "required-settings",
            "license-key",
            "connection-security",
        ]
    );
}

#[tokio::test]
async fn warnings_do_not_invalidate_the_report() {
    let settings = healthy_settings()
        .with("license.key", "changeme")
        .with(
            "database.connection_string",
            "Server=db;Password=hunter2;TrustServerCertificate=true",
        );
    let services = fleet_services(
        StaticProbe::reachable().with_pending(["0042_add_stops"]),
        Arc::new(settings),
    );
    let report = services
        .validation_pipeline(&required(&[]))
        .run(&CancellationToken::new())
        .await;

    assert!(report.is_valid());
    let failed: Vec<&str> = report.failed().map(|r| r.name()).collect();
    assert_eq!(failed, ["pending-migrations", "license-key", "connection-security"]);
    assert!(report.failed().all(|r| r.severity() == Severity::Warning));
    assert!(report.failed().all(|r| r.remediation().is_some()));

    let security = report
        .results()
        .iter()
        .find(|r| r.name() == "connection-security")
        .unwrap();
    assert!(security.message().contains("certificate validation is disabled"));
    assert!(security.message().contains("plaintext password"));
}

#[tokio::test]
async fn unreachable_database_and_missing_settings_block_readiness() {
    let services = fleet_services(StaticProbe::unreachable(), Arc::new(healthy_settings()));
    let report = services
        .validation_pipeline(&required(&["fleet.depot_name", "fleet.timezone"]))
        .run(&CancellationToken::new())
        .await;

    assert!(!report.is_valid());
    let blocking: Vec<&str> = report.critical_failures().map(|r| r.name()).collect();
    assert_eq!(blocking, ["database-connectivity", "required-settings"]);

    let settings = &report.results()[2];
    assert_eq!(settings.message(), "Missing required settings: fleet.timezone");

    let groups = report.by_category();
    assert_eq!(groups[0].0, CheckCategory::Database);
    assert_eq!(groups[0].1.len(), 2);
}

#[tokio::test]
async fn settings_from_a_config_file_feed_the_checks() {
    let config = DepotConfig::parse(
        r#"
[database]
connection_string = "postgres://fleet@db.internal/depot?sslmode=disable"

[license]
key = "D3P0-7F1E-E7A9-44C2"

[validation]
required_settings = ["license.key", "database.connection_string"]
"#,
    )
    .unwrap();
    let validation = config.validation.clone();
    let services = fleet_services(StaticProbe::reachable(), Arc::new(config));

    let report = services
        .validation_pipeline(&validation)
        .run(&CancellationToken::new())
        .await;

    let failed: Vec<&str> = report.failed().map(|r| r.name()).collect();
    assert_eq!(failed, ["connection-security"]);
}

struct Stuck;

impl ValidationCheck for Stuck {
    fn name(&self) -> &str {
        "gps-gateway"
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Environment
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn check<'a>(&'a self, _cancel: &'a CancellationToken) -> ServiceFut<'a, CheckOutcome> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CheckOutcome::pass("reachable"))
        })
    }
}

struct SettingPresent {
    config: Arc<dyn ConfigProvider>,
}

impl ValidationCheck for SettingPresent {
    fn name(&self) -> &str {
        "depot-name"
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Configuration
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check<'a>(&'a self, _cancel: &'a CancellationToken) -> ServiceFut<'a, CheckOutcome> {
        Box::pin(async move {
            Ok(match self.config.get_non_blank("fleet.depot_name") {
                Some(name) => CheckOutcome::pass(format!("Depot is {name}")),
                None => CheckOutcome::fail("No depot name configured"),
            })
        })
    }
}

#[tokio::test(start_paused = true)]
async fn custom_checks_run_under_the_check_timeout() {
    let pipeline = ValidationPipeline::new()
        .with_check_timeout(Some(Duration::from_secs(3)))
        .with_check(Stuck)
        .with_check(SettingPresent {
            config: Arc::new(MapConfig::new().with("fleet.depot_name", "North Yard")),
        });

    let report = pipeline.run(&CancellationToken::new()).await;

    assert!(!report.is_valid());
    assert_eq!(report.results()[0].message(), "timed out after 3000ms");
    assert!(report.results()[1].passed());
    assert_eq!(report.results()[1].message(), "Depot is North Yard");
}
