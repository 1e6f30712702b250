//! The session state machine driven by the control surface.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::broadcast;

use scanward_core::{
    PendingPolicy, ProgressEvent, ScanConfig, ScanError, ScanRequest, ScanResult, SessionId,
};
use scanward_engine::AdapterSet;
use scanward_scan::{
    CancellationController, ProgressAggregator, ScanWorker, WorkerHandle, WorkerReport,
    resolve_scan_type,
};

use crate::event::SessionEvent;
use crate::report::{ReportSink, SessionOutcome, SessionReport};
use crate::session::{PendingRequest, ScanSession, SessionState};

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Answer to [`ScanSessionController::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session was spawned.
    Started(SessionId),
    /// A session is already scanning; nothing was queued.
    AlreadyRunning,
    /// The request was parked until the stopping session finishes.
    Queued,
    /// The pending slot is taken and the policy refuses to replace it.
    Rejected,
}

/// A pending request released after teardown, waiting for the settle delay.
#[derive(Debug, Clone)]
struct DeferredStart {
    request: ScanRequest,
    due: Instant,
}

/// Owns the single active scan session.
///
/// Every method is non-blocking. The control surface calls [`tick`] on its
/// own cadence to detect worker completion and to release deferred starts.
///
/// [`tick`]: Self::tick
pub struct ScanSessionController {
    config: Arc<ScanConfig>,
    adapters: AdapterSet,
    reporter: Arc<dyn ReportSink>,
    cancel: CancellationController,
    session: Option<ScanSession>,
    worker: Option<WorkerHandle>,
    progress: Arc<ProgressAggregator>,
    pending: Option<PendingRequest>,
    deferred: Option<DeferredStart>,
    next_poll: Option<Instant>,
    next_id: u64,
    last_report: Option<SessionReport>,
    events: broadcast::Sender<SessionEvent>,
}

impl ScanSessionController {
    pub fn new(config: ScanConfig, adapters: AdapterSet, reporter: Arc<dyn ReportSink>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config: Arc::new(config),
            adapters,
            reporter,
            cancel: CancellationController::new(),
            session: None,
            worker: None,
            progress: Arc::new(ProgressAggregator::detached()),
            pending: None,
            deferred: None,
            next_poll: None,
            next_id: 1,
            last_report: None,
            events,
        }
    }

    /// Subscribe to progress and lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |session| session.state)
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Whether a released pending request is waiting for the settle delay.
    pub fn has_deferred_start(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    pub fn latest_progress(&self) -> ProgressEvent {
        self.progress.latest()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Request a new session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, request: ScanRequest) -> StartOutcome {
        match self.state() {
            SessionState::Idle => {
                if let Some(deferred) = self.deferred.take() {
                    let quick_scan = deferred.request.quick_scan;
                    tracing::info!(quick_scan, "direct start supersedes the released pending request");
                    self.emit(SessionEvent::PendingDropped { quick_scan });
                }
                StartOutcome::Started(self.launch(request))
            }
            SessionState::Scanning => {
                tracing::info!("start ignored, a session is already running");
                StartOutcome::AlreadyRunning
            }
            SessionState::Stopping => self.queue(request),
        }
    }

    fn queue(&mut self, request: ScanRequest) -> StartOutcome {
        if self.pending.is_some() && self.config.pending_policy == PendingPolicy::Reject {
            tracing::info!("start rejected, a request is already pending");
            return StartOutcome::Rejected;
        }

        let quick_scan = request.quick_scan;
        let replaced = self.pending.replace(PendingRequest::new(request)).is_some();
        tracing::info!(quick_scan, replaced, "start queued until the session stops");
        self.emit(SessionEvent::Queued {
            quick_scan,
            replaced,
        });
        StartOutcome::Queued
    }

    fn launch(&mut self, request: ScanRequest) -> SessionId {
        let id = SessionId::new(self.next_id);
        self.next_id += 1;

        let token = self.cancel.new_token();
        let events = self.events.clone();
        self.progress = Arc::new(ProgressAggregator::new(Arc::new(move |event: ProgressEvent| {
            let _ = events.send(SessionEvent::Progress(event));
        })));

        let (scan_type, _) = resolve_scan_type(&request);
        let worker = ScanWorker::new(
            id,
            request.clone(),
            Arc::clone(&self.config),
            self.adapters.clone(),
            token,
            Arc::clone(&self.progress),
        );
        self.worker = Some(worker.spawn());
        self.session = Some(ScanSession::new(id, scan_type, request));
        self.next_poll = None;

        tracing::info!(session = %id, %scan_type, "session scanning");
        self.emit(SessionEvent::Started {
            session_id: id,
            scan_type,
        });
        id
    }

    /// Ask the running session to stop. Returns `false` when there was
    /// nothing to stop.
    pub fn stop(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.state != SessionState::Scanning {
            return false;
        }

        session.manual_stop = true;
        session.state = SessionState::Stopping;
        let id = session.id;

        self.cancel.request_cancel();
        self.progress.reset("Stopping");
        self.next_poll = Some(Instant::now() + self.config.poll_interval);

        tracing::info!(session = %id, "session stopping");
        self.emit(SessionEvent::Stopping { session_id: id });
        true
    }

    /// Advance the state machine without blocking.
    ///
    /// Returns the report of a session that finished during this tick.
    pub fn tick(&mut self) -> Option<SessionReport> {
        let report = match self.state() {
            SessionState::Scanning => self.poll_worker(),
            SessionState::Stopping => {
                let now = Instant::now();
                match self.next_poll {
                    Some(due) if now < due => None,
                    _ => {
                        self.next_poll = Some(now + self.config.poll_interval);
                        self.poll_worker()
                    }
                }
            }
            SessionState::Idle => None,
        };

        if self.state() == SessionState::Idle {
            self.release_deferred();
        }
        report
    }

    fn poll_worker(&mut self) -> Option<SessionReport> {
        let finished = self.worker.as_mut()?.try_finish()?;
        let session = self.session.take()?;
        Some(self.finish(session, finished))
    }

    fn finish(
        &mut self,
        mut session: ScanSession,
        finished: Result<WorkerReport, ScanError>,
    ) -> SessionReport {
        self.worker = None;
        self.next_poll = None;
        let ended_at = Utc::now();
        session.ended_at = Some(ended_at);
        session.state = SessionState::Idle;
        self.cancel.new_token();

        let (result, cancelled) = match finished {
            Ok(report) => (report.result, report.cancelled),
            Err(e) => {
                tracing::error!(session = %session.id, error = %e, "scan worker lost");
                let mut result =
                    ScanResult::new(session.id, session.scan_type, &session.request.target);
                result.failure = Some(e.to_string());
                (result, false)
            }
        };

        let outcome = if result.is_failed() {
            SessionOutcome::Failed
        } else if session.manual_stop || cancelled {
            SessionOutcome::Stopped
        } else {
            SessionOutcome::Completed
        };

        let report = SessionReport {
            session_id: session.id,
            scan_type: session.scan_type,
            outcome,
            manual_stop: session.manual_stop,
            started_at: session.started_at,
            ended_at,
            result,
        };

        tracing::info!(session = %report.session_id, %outcome, "session idle");
        self.reporter.deliver(&report);
        self.emit(match outcome {
            SessionOutcome::Completed => SessionEvent::Completed(report.clone()),
            SessionOutcome::Stopped => SessionEvent::Stopped(report.clone()),
            SessionOutcome::Failed => SessionEvent::Failed(report.clone()),
        });
        self.last_report = Some(report.clone());

        if let Some(pending) = self.pending.take() {
            tracing::info!(
                quick_scan = pending.quick_scan(),
                waited_ms = pending.queued_at.elapsed().as_millis() as u64,
                settle_ms = self.config.settle_delay.as_millis() as u64,
                "releasing pending request after settle delay"
            );
            self.deferred = Some(DeferredStart {
                request: pending.request,
                due: Instant::now() + self.config.settle_delay,
            });
        }

        report
    }

    fn release_deferred(&mut self) {
        let due = match &self.deferred {
            Some(deferred) => Instant::now() >= deferred.due,
            None => false,
        };
        if !due {
            return;
        }
        if let Some(deferred) = self.deferred.take() {
            self.launch(deferred.request);
        }
    }

    /// Cancel everything and return to idle without reporting.
    ///
    /// Used when the control surface exits.
    pub fn shutdown(&mut self) {
        self.pending = None;
        self.deferred = None;
        self.next_poll = None;
        if self.session.take().is_some() {
            self.cancel.request_cancel();
            self.progress.reset("Shutting down");
            tracing::info!("session abandoned on shutdown");
        }
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for ScanSessionController {
    fn drop(&mut self) {
        self.cancel.request_cancel();
    }
}

impl std::fmt::Debug for ScanSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSessionController")
            .field("state", &self.state())
            .field("session", &self.session)
            .field("pending", &self.pending)
            .field("deferred", &self.deferred)
            .finish_non_exhaustive()
    }
}
