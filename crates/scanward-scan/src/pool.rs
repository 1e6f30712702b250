//! Bounded-concurrency execution of scan tasks.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use scanward_core::{ProgressEvent, ScanConfig, ScanError, ScanOutcome, ScanTask, Verdict};
use scanward_engine::AdapterSet;

use crate::backoff::{Backoff, BackoffPolicy};
use crate::filter::RiskFilter;

/// Counts reported by a finished pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Tasks handed to the pool.
    pub submitted: u64,
    /// Tasks that reached an engine, whatever the verdict.
    pub executed: u64,
    /// Tasks skipped by the filter or by cancellation.
    pub skipped: u64,
}

type TaskQueue = Arc<Mutex<VecDeque<ScanTask>>>;

/// Runs scan tasks through their engine adapters with at most
/// `max_workers` invocations in flight.
///
/// Outcomes are funnelled through a channel to a single collector, so the
/// callbacks passed to [`run`](Self::run) are never called concurrently.
#[derive(Debug, Clone)]
pub struct FileExecutionPool {
    max_workers: usize,
    filter: Arc<RiskFilter>,
    backoff: BackoffPolicy,
}

impl FileExecutionPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            filter: Arc::new(RiskFilter::allow_all()),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_filter(mut self, filter: RiskFilter) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    /// Build a pool from configuration, applying the quick-scan restriction
    /// when `quick` is set.
    pub fn from_config(config: &ScanConfig, quick: bool) -> Result<Self, ScanError> {
        Ok(Self::new(config.max_workers)
            .with_filter(RiskFilter::from_policy(&config.risk, quick)?)
            .with_backoff(BackoffPolicy::from_config(config)))
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Execute `tasks`, reporting every outcome and a progress event after it.
    ///
    /// Every submitted task yields exactly one outcome. Once `token` is
    /// cancelled no new invocation starts; tasks that never ran are
    /// reported as skipped.
    pub async fn run<F, P>(
        &self,
        tasks: Vec<ScanTask>,
        adapters: &AdapterSet,
        token: &CancellationToken,
        mut on_outcome: F,
        mut on_progress: P,
    ) -> Result<PoolSummary, ScanError>
    where
        F: FnMut(ScanOutcome),
        P: FnMut(ProgressEvent),
    {
        let total = tasks.len() as u64;
        let mut summary = PoolSummary {
            submitted: total,
            ..PoolSummary::default()
        };
        if tasks.is_empty() {
            on_progress(ProgressEvent::from_counts(0, 0, PathBuf::new()));
            return Ok(summary);
        }

        let workers = self.max_workers.min(tasks.len());
        let queue: TaskQueue = Arc::new(Mutex::new(tasks.into()));
        let backoff = Arc::new(Backoff::new(self.backoff));
        let (tx, mut rx) = mpsc::channel::<ScanOutcome>(workers * 2);

        tracing::debug!(tasks = total, workers, "starting execution pool");

        let mut join_set = JoinSet::new();
        for _ in 0..workers {
            join_set.spawn(worker_loop(
                Arc::clone(&queue),
                adapters.clone(),
                Arc::clone(&self.filter),
                Arc::clone(&backoff),
                token.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut done = 0u64;
        let mut deliver = |outcome: ScanOutcome, summary: &mut PoolSummary| {
            done += 1;
            if outcome.verdict == Verdict::Skipped {
                summary.skipped += 1;
            } else {
                summary.executed += 1;
            }
            let path = outcome.path.clone();
            on_outcome(outcome);
            on_progress(ProgressEvent::from_counts(done, total, path));
        };

        while let Some(outcome) = rx.recv().await {
            deliver(outcome, &mut summary);
        }

        let joined = join_workers(&mut join_set).await;
        let reason = if joined.is_err() {
            "worker failed"
        } else {
            "cancelled"
        };

        let leftover: Vec<ScanTask> = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if !leftover.is_empty() {
            tracing::debug!(count = leftover.len(), reason, "skipping unclaimed tasks");
        }
        for task in leftover {
            deliver(ScanOutcome::skipped(&task, reason), &mut summary);
        }

        joined.map(|()| summary)
    }
}

/// Wait for every worker, returning the first failure.
async fn join_workers(join_set: &mut JoinSet<()>) -> Result<(), ScanError> {
    let mut failure = None;
    while let Some(joined) = join_set.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "pool worker failed");
            failure.get_or_insert(ScanError::Worker {
                message: e.to_string(),
            });
        }
    }
    failure.map_or(Ok(()), Err)
}

impl Default for FileExecutionPool {
    fn default() -> Self {
        Self::new(ScanConfig::default().max_workers)
    }
}

async fn worker_loop(
    queue: TaskQueue,
    adapters: AdapterSet,
    filter: Arc<RiskFilter>,
    backoff: Arc<Backoff>,
    token: CancellationToken,
    tx: mpsc::Sender<ScanOutcome>,
) {
    loop {
        if token.is_cancelled() {
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(task) = next else {
            break;
        };

        let outcome = execute(task, &adapters, &filter, &backoff, &token).await;
        if tx.send(outcome).await.is_err() {
            break;
        }
    }
}

async fn execute(
    task: ScanTask,
    adapters: &AdapterSet,
    filter: &RiskFilter,
    backoff: &Backoff,
    token: &CancellationToken,
) -> ScanOutcome {
    if let Some(reason) = filter.skip_reason(&task) {
        return ScanOutcome::skipped(&task, reason);
    }
    let Some(adapter) = adapters.get(task.engine) else {
        return ScanOutcome::error(
            &task,
            format!("no adapter for {} engine", task.engine),
            std::time::Duration::ZERO,
        );
    };

    backoff.wait(token).await;
    if token.is_cancelled() {
        return ScanOutcome::skipped(&task, "cancelled");
    }

    let started = Instant::now();
    let blocking_task = task.clone();
    let blocking_token = token.clone();
    let invoked =
        tokio::task::spawn_blocking(move || adapter.invoke(&blocking_task, &blocking_token)).await;

    match invoked {
        Ok(Ok(outcome)) => {
            backoff.record_available();
            outcome
        }
        Ok(Err(e)) => {
            if e.is_unavailable() {
                backoff.record_unavailable();
            } else {
                backoff.record_available();
            }
            tracing::warn!(path = %task.path.display(), error = %e, "engine invocation failed");
            ScanOutcome::error(&task, e.to_string(), started.elapsed())
        }
        Err(e) => {
            tracing::error!(path = %task.path.display(), error = %e, "engine adapter panicked");
            ScanOutcome::error(&task, "engine adapter panicked", started.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_workers_waits_for_all_and_keeps_failure() {
        let mut join_set = JoinSet::new();
        join_set.spawn(async { panic!("worker blew up") });
        join_set.spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        });

        let err = join_workers(&mut join_set).await.unwrap_err();
        assert!(matches!(err, ScanError::Worker { .. }));
        assert!(join_set.is_empty());
    }

    #[tokio::test]
    async fn test_join_workers_ok() {
        let mut join_set = JoinSet::new();
        join_set.spawn(async {});
        assert!(join_workers(&mut join_set).await.is_ok());
    }
}
