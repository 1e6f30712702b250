//! Result and progress aggregation for a single session.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use scanward_core::{ProgressEvent, ScanOutcome, ScanRequest, ScanResult, ScanType, SessionId, Verdict};

/// Pick the scan type for a request.
///
/// An explicit category wins. When it disagrees with the quick-scan flag the
/// disagreement is returned as a warning for the result.
pub fn resolve_scan_type(request: &ScanRequest) -> (ScanType, Option<String>) {
    let from_flag = if request.quick_scan {
        ScanType::Quick
    } else {
        ScanType::Full
    };
    let Some(category) = request.category else {
        return (from_flag, None);
    };

    let conflicting = match category {
        ScanType::Quick => !request.quick_scan,
        _ => request.quick_scan,
    };
    if !conflicting {
        return (category, None);
    }

    tracing::warn!(
        %category,
        quick_scan = request.quick_scan,
        "scan category disagrees with quick-scan flag, using category"
    );
    let warning = format!(
        "category {category} overrides quick_scan={}",
        request.quick_scan
    );
    (category, Some(warning))
}

/// Accumulates outcomes into a [`ScanResult`].
#[derive(Debug)]
pub struct ResultAggregator {
    result: ScanResult,
    started: Instant,
}

impl ResultAggregator {
    pub fn new(session_id: SessionId, scan_type: ScanType, target: impl Into<PathBuf>) -> Self {
        Self {
            result: ScanResult::new(session_id, scan_type, target),
            started: Instant::now(),
        }
    }

    pub fn set_total(&mut self, total: u64) {
        self.result.total_files = total;
    }

    /// Fold one outcome into the counters.
    pub fn record(&mut self, outcome: ScanOutcome) {
        match outcome.verdict {
            Verdict::Clean => self.result.scanned_count += 1,
            Verdict::Infected | Verdict::Suspicious => {
                self.result.scanned_count += 1;
                self.result.threats.push(outcome);
            }
            Verdict::Error => self.result.errors.push(outcome),
            Verdict::Skipped => self.result.skipped_count += 1,
        }
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.result.warnings.push(warning.into());
    }

    /// Mark the session as failed.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.result.failure = Some(reason.into());
    }

    pub fn result(&self) -> &ScanResult {
        &self.result
    }

    pub fn finish(mut self) -> ScanResult {
        self.result.duration_seconds = self.started.elapsed().as_secs_f64();
        self.result
    }
}

/// Callback receiving published progress.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Debug, Default)]
struct ProgressState {
    last: ProgressEvent,
    closed: bool,
}

/// Forwards progress to a sink while keeping the percentage monotonic.
///
/// After [`reset`](Self::reset) the aggregator is closed and later worker
/// updates are dropped, so a stopping session cannot overwrite the reset.
pub struct ProgressAggregator {
    state: Mutex<ProgressState>,
    sink: ProgressSink,
}

impl ProgressAggregator {
    pub fn new(sink: ProgressSink) -> Self {
        Self {
            state: Mutex::new(ProgressState::default()),
            sink,
        }
    }

    /// An aggregator that only records the latest event.
    pub fn detached() -> Self {
        Self::new(Arc::new(|_| {}))
    }

    /// Publish a worker update. Returns `false` when it was dropped.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        let event = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return false;
            }
            let event = if event.percent < state.last.percent {
                ProgressEvent {
                    percent: state.last.percent,
                    ..event
                }
            } else {
                event
            };
            state.last = event.clone();
            event
        };
        (self.sink)(event);
        true
    }

    /// Close the aggregator and emit a zero-percent event carrying `message`.
    pub fn reset(&self, message: impl Into<String>) {
        let event = ProgressEvent::reset(message);
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            state.last = event.clone();
        }
        (self.sink)(event);
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    pub fn latest(&self) -> ProgressEvent {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .clone()
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("latest", &self.latest())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanward_core::{EngineKind, ScanTask};
    use std::time::Duration;

    #[test]
    fn test_resolve_scan_type() {
        assert_eq!(resolve_scan_type(&ScanRequest::new("/")), (ScanType::Full, None));
        assert_eq!(resolve_scan_type(&ScanRequest::quick("/")), (ScanType::Quick, None));

        let agreeing = ScanRequest::new("/").with_category(ScanType::Integrity);
        assert_eq!(resolve_scan_type(&agreeing), (ScanType::Integrity, None));

        let conflicting = ScanRequest::quick("/").with_category(ScanType::Full);
        let (scan_type, warning) = resolve_scan_type(&conflicting);
        assert_eq!(scan_type, ScanType::Full);
        assert!(warning.is_some());
    }

    #[test]
    fn test_record_counts() {
        let task = ScanTask::new("/tmp/x", EngineKind::Signature);
        let mut aggregator = ResultAggregator::new(SessionId::new(1), ScanType::Full, "/tmp");
        aggregator.set_total(4);
        aggregator.record(ScanOutcome::clean(&task, Duration::ZERO));
        aggregator.record(ScanOutcome::infected(&task, "Test.A", Duration::ZERO));
        aggregator.record(ScanOutcome::error(&task, "boom", Duration::ZERO));
        aggregator.record(ScanOutcome::skipped(&task, "cancelled"));

        let result = aggregator.finish();
        assert_eq!(result.scanned_count, 2);
        assert_eq!(result.threat_count(), 1);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.skipped_count, 1);
        assert!(result.is_consistent());
    }

    #[test]
    fn test_progress_never_regresses() {
        let progress = ProgressAggregator::detached();
        progress.publish(ProgressEvent::new(40.0, "a", "/a"));
        progress.publish(ProgressEvent::new(30.0, "b", "/b"));

        let latest = progress.latest();
        assert_eq!(latest.percent, 40.0);
        assert_eq!(latest.message, "b");
    }

    #[test]
    fn test_reset_suppresses_later_updates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let progress = ProgressAggregator::new(Arc::new(move |event: ProgressEvent| {
            sink_seen.lock().unwrap().push(event.percent);
        }));

        assert!(progress.publish(ProgressEvent::new(50.0, "", "")));
        progress.reset("Stopping");
        assert!(!progress.publish(ProgressEvent::new(60.0, "", "")));

        assert_eq!(*seen.lock().unwrap(), vec![50.0, 0.0]);
        assert_eq!(progress.latest().message, "Stopping");
        assert!(progress.is_closed());
    }
}
