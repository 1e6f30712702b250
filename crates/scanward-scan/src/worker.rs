//! Background execution of one scan session.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use scanward_core::{ScanConfig, ScanError, ScanRequest, ScanResult, SessionId};
use scanward_engine::AdapterSet;

use crate::aggregate::{ProgressAggregator, ResultAggregator, resolve_scan_type};
use crate::enumerate::enumerate_tasks;
use crate::pool::FileExecutionPool;

/// What a finished worker hands back.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub result: ScanResult,
    /// Whether the session's token was cancelled when the run ended.
    pub cancelled: bool,
}

/// Runs one session off the control path: enumerate, execute, aggregate.
pub struct ScanWorker {
    session_id: SessionId,
    request: ScanRequest,
    config: Arc<ScanConfig>,
    adapters: AdapterSet,
    token: CancellationToken,
    progress: Arc<ProgressAggregator>,
}

impl ScanWorker {
    pub fn new(
        session_id: SessionId,
        request: ScanRequest,
        config: Arc<ScanConfig>,
        adapters: AdapterSet,
        token: CancellationToken,
        progress: Arc<ProgressAggregator>,
    ) -> Self {
        Self {
            session_id,
            request,
            config,
            adapters,
            token,
            progress,
        }
    }

    /// Run the session to completion.
    ///
    /// Failures before any task ran are reported through
    /// [`ScanResult::failure`] rather than as an error.
    pub async fn run(self) -> WorkerReport {
        let (scan_type, warning) = resolve_scan_type(&self.request);
        let mut aggregator =
            ResultAggregator::new(self.session_id, scan_type, &self.request.target);
        if let Some(warning) = warning {
            aggregator.warn(warning);
        }

        tracing::info!(
            session = %self.session_id,
            %scan_type,
            target = %self.request.target.display(),
            "scan session started"
        );

        let target = self.request.target.clone();
        let config = Arc::clone(&self.config);
        let engine = scan_type.engine();
        let token = self.token.clone();
        let enumerated = tokio::task::spawn_blocking(move || {
            enumerate_tasks(&target, &config, engine, &token)
        })
        .await;

        let enumeration = match enumerated {
            Ok(Ok(enumeration)) => enumeration,
            Ok(Err(e)) => {
                tracing::warn!(session = %self.session_id, error = %e, "enumeration failed");
                aggregator.fail(e.to_string());
                return self.report(aggregator);
            }
            Err(e) => {
                tracing::error!(session = %self.session_id, error = %e, "enumeration panicked");
                aggregator.fail(format!("enumeration task failed: {e}"));
                return self.report(aggregator);
            }
        };

        if enumeration.cancelled {
            tracing::info!(
                session = %self.session_id,
                found = enumeration.tasks.len(),
                "enumeration cut short by cancellation"
            );
        }
        for warning in enumeration.warnings {
            aggregator.warn(warning);
        }
        aggregator.set_total(enumeration.tasks.len() as u64);

        let pool = match FileExecutionPool::from_config(&self.config, scan_type.is_quick()) {
            Ok(pool) => pool,
            Err(e) => {
                aggregator.fail(e.to_string());
                return self.report(aggregator);
            }
        };

        let progress = Arc::clone(&self.progress);
        let run = pool
            .run(
                enumeration.tasks,
                &self.adapters,
                &self.token,
                |outcome| aggregator.record(outcome),
                |event| {
                    progress.publish(event);
                },
            )
            .await;
        if let Err(e) = run {
            aggregator.fail(e.to_string());
        }

        self.report(aggregator)
    }

    fn report(&self, aggregator: ResultAggregator) -> WorkerReport {
        let result = aggregator.finish();
        let cancelled = self.token.is_cancelled();
        tracing::info!(
            session = %self.session_id,
            cancelled,
            "{}",
            result.summary()
        );
        WorkerReport { result, cancelled }
    }

    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let report = self.run().await;
            let _ = tx.send(report);
        });
        WorkerHandle { rx, join }
    }
}

/// Non-blocking handle on a spawned [`ScanWorker`].
#[derive(Debug)]
pub struct WorkerHandle {
    rx: oneshot::Receiver<WorkerReport>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Take the report if the worker has finished.
    ///
    /// Returns `None` while it is still running. A worker that went away
    /// without reporting yields [`ScanError::Worker`].
    pub fn try_finish(&mut self) -> Option<Result<WorkerReport, ScanError>> {
        match self.rx.try_recv() {
            Ok(report) => Some(Ok(report)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(ScanError::Worker {
                message: "scan worker exited without a report".to_string(),
            })),
        }
    }

    pub fn abort(&self) {
        self.join.abort();
    }
}
