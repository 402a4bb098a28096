//! Progress reporting for startup runs.
//!
//! A [`ProgressSink`] receives `(percent, message)` pairs. A
//! [`ProgressStrategy`] decides how the orchestrator moves the bar from a
//! phase's start percentage to its end percentage once the phase succeeds.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Receives progress updates. Percentages never decrease within a run.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, message: &str) {
        self(percent, message);
    }
}

/// Logs progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, percent: u8, message: &str) {
        tracing::info!(percent, "{message}");
    }
}

pub type ProgressFut<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

pub trait ProgressStrategy: Send + Sync + std::fmt::Debug {
    /// Move from `from` to `to` percent. Must finish promptly once `cancel`
    /// fires.
    fn advance<'a>(
        &'a self,
        sink: &'a dyn ProgressSink,
        from: u8,
        to: u8,
        message: &'a str,
        cancel: &'a CancellationToken,
    ) -> ProgressFut<'a>;
}

/// Jump straight to the end percentage.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl ProgressStrategy for Immediate {
    fn advance<'a>(
        &'a self,
        sink: &'a dyn ProgressSink,
        _from: u8,
        to: u8,
        message: &'a str,
        _cancel: &'a CancellationToken,
    ) -> ProgressFut<'a> {
        sink.report(to, message);
        Box::pin(std::future::ready(()))
    }
}

/// Climb in `step` increments, pausing `interval` between updates.
///
/// Purely cosmetic. Abandoned as soon as the run is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct Smoothed {
    pub step: u8,
    pub interval: Duration,
}

impl Smoothed {
    #[must_use]
    pub const fn new(step: u8, interval: Duration) -> Self {
        Self { step, interval }
    }
}

impl ProgressStrategy for Smoothed {
    fn advance<'a>(
        &'a self,
        sink: &'a dyn ProgressSink,
        from: u8,
        to: u8,
        message: &'a str,
        cancel: &'a CancellationToken,
    ) -> ProgressFut<'a> {
        Box::pin(async move {
            let step = self.step.max(1);
            let mut percent = from;
            loop {
                percent = percent.saturating_add(step).min(to);
                sink.report(percent, message);
                if percent >= to {
                    return;
                }
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(self.interval) => {}
                }
            }
        })
    }
}
