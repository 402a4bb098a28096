//! Wait-all fan-out for phase sub-tasks.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::task::JoinSet;

use crate::util::panic_payload_to_string;

/// One failed sub-task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTaskFailure {
    pub name: String,
    pub error: String,
}

/// Every sub-task that failed, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelError {
    total: usize,
    failures: Vec<SubTaskFailure>,
}

impl ParallelError {
    #[must_use]
    pub fn failures(&self) -> &[SubTaskFailure] {
        &self.failures
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for ParallelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} sub-tasks failed: ", self.failures.len(), self.total)?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.name, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParallelError {}

/// Run named sub-tasks concurrently on the runtime and wait for all of them.
///
/// A failing or panicking sub-task does not stop the others. Dropping the
/// returned future aborts whatever is still running.
pub async fn run_parallel<N, F>(tasks: impl IntoIterator<Item = (N, F)>) -> Result<(), ParallelError>
where
    N: Into<String>,
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let started = Instant::now();
    let mut names = Vec::new();
    let mut set = JoinSet::new();

    for (index, (name, task)) in tasks.into_iter().enumerate() {
        names.push(name.into());
        set.spawn(async move { (index, AssertUnwindSafe(task).catch_unwind().await) });
    }

    let mut outcomes: Vec<Option<Result<(), String>>> = vec![None; names.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(Ok(())))) => outcomes[index] = Some(Ok(())),
            Ok((index, Ok(Err(err)))) => outcomes[index] = Some(Err(format!("{err:#}"))),
            Ok((index, Err(payload))) => {
                outcomes[index] = Some(Err(format!(
                    "panicked: {}",
                    panic_payload_to_string(&*payload)
                )));
            }
            Err(err) => tracing::warn!("sub-task did not complete: {err}"),
        }
    }

    let total = names.len();
    let failures: Vec<SubTaskFailure> = names
        .into_iter()
        .zip(outcomes)
        .filter_map(|(name, outcome)| match outcome {
            Some(Ok(())) => None,
            Some(Err(error)) => Some(SubTaskFailure { name, error }),
            None => Some(SubTaskFailure {
                name,
                error: "aborted".to_string(),
            }),
        })
        .collect();

    tracing::debug!(
        elapsed_ms = depot_types::duration_ms(started.elapsed()),
        failed = failures.len(),
        "parallel sub-tasks joined"
    );

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ParallelError { total, failures })
    }
}
