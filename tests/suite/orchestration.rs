//! Phase ordering, progress and cancellation across a whole run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use depot_engine::{
    COMPLETE_MESSAGE, CancellationToken, Phase, PhaseContext, PhaseOrchestrator, Smoothed,
    StartupError, StartupStatus,
};

use crate::common::ProgressLog;

fn recording_phase(
    name: &'static str,
    start: u8,
    end: u8,
    trace: &Arc<Mutex<Vec<&'static str>>>,
    outcome: fn() -> anyhow::Result<bool>,
) -> Phase {
    let trace = Arc::clone(trace);
    Phase::new(name, start, end, move |_ctx: PhaseContext| {
        let trace = Arc::clone(&trace);
        async move {
            trace.lock().unwrap().push(name);
            outcome()
        }
    })
}

fn ok() -> anyhow::Result<bool> {
    Ok(true)
}

fn broken() -> anyhow::Result<bool> {
    anyhow::bail!("disk full")
}

#[tokio::test]
async fn phases_run_in_declaration_order_with_monotonic_progress() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let plan = PhaseOrchestrator::new(vec![
        recording_phase("one", 0, 40, &trace, ok),
        recording_phase("two", 40, 70, &trace, ok),
        recording_phase("three", 70, 100, &trace, ok),
    ])
    .unwrap()
    .with_strategy(Arc::new(Smoothed::new(10, Duration::from_millis(1))));
    let log = ProgressLog::default();

    let result = plan.run(&CancellationToken::new(), &log).await;

    assert_eq!(result.status(), StartupStatus::Completed);
    assert!(result.is_ready());
    assert_eq!(*trace.lock().unwrap(), ["one", "two", "three"]);

    let percentages = log.percentages();
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]), "{percentages:?}");
    assert_eq!(log.last(), Some((100, COMPLETE_MESSAGE.to_string())));
}

#[tokio::test]
async fn critical_failure_stops_the_run() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let plan = PhaseOrchestrator::new(vec![
        recording_phase("optional", 0, 30, &trace, broken).critical(false),
        recording_phase("required", 30, 60, &trace, broken),
        recording_phase("never", 60, 100, &trace, ok),
    ])
    .unwrap();
    let log = ProgressLog::default();

    let result = plan.run(&CancellationToken::new(), &log).await;

    assert_eq!(result.status(), StartupStatus::Failed);
    assert!(!result.is_ready());
    assert_eq!(*trace.lock().unwrap(), ["optional", "required"]);
    assert_eq!(result.phase_results().len(), 2);
    assert_eq!(result.aborted_by().map(|p| p.name()), Some("required"));
    assert!(log.percentages().iter().all(|p| *p < 100));
}

#[tokio::test]
async fn non_critical_failure_still_completes() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let plan = PhaseOrchestrator::new(vec![
        recording_phase("warm-up", 0, 50, &trace, broken).critical(false),
        recording_phase("serve", 50, 100, &trace, ok),
    ])
    .unwrap();

    let result = plan
        .run(&CancellationToken::new(), &ProgressLog::default())
        .await;

    assert_eq!(result.status(), StartupStatus::Completed);
    assert!(result.is_ready());
    assert_eq!(result.failures().len(), 1);
    assert!(result.failures()[0].to_string().contains("disk full"));
}

#[tokio::test]
async fn cancelling_mid_phase_ends_the_run_promptly() {
    let cancel = CancellationToken::new();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let slow = Phase::new("slow", 0, 50, |_ctx: PhaseContext| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(true)
    });
    let plan = PhaseOrchestrator::new(vec![
        slow,
        recording_phase("after", 50, 100, &trace, ok),
    ])
    .unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        plan.run(&cancel, &ProgressLog::default()),
    )
    .await
    .expect("run should stop once cancelled");

    assert_eq!(result.status(), StartupStatus::Cancelled);
    assert!(trace.lock().unwrap().is_empty());
    assert_eq!(result.phase_results()[0].error(), Some(&StartupError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn timed_out_phase_is_reported_with_its_limit() {
    let plan = PhaseOrchestrator::new(vec![
        Phase::new("hang", 0, 100, |_ctx: PhaseContext| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(true)
        })
        .with_timeout(Some(Duration::from_secs(2))),
    ])
    .unwrap();

    let result = plan
        .run(&CancellationToken::new(), &ProgressLog::default())
        .await;

    assert_eq!(result.status(), StartupStatus::Failed);
    let error = result.phase_results()[0].error().cloned();
    assert_eq!(
        error,
        Some(StartupError::Timeout {
            operation: "phase 'hang'".to_string(),
            after_ms: 2000,
        })
    );
}
