//! Reporting boundary.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use scanward_core::{ScanResult, ScanType, SessionId};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionOutcome {
    /// Ran to the end on its own, possibly with per-file errors.
    Completed,
    /// Ended by an explicit stop; the result is partial.
    Stopped,
    /// The target could not be enumerated.
    Failed,
}

/// Everything handed to the reporting collaborator for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub scan_type: ScanType,
    pub outcome: SessionOutcome,
    pub manual_stop: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub result: ScanResult,
}

impl SessionReport {
    /// One-line description for logs and terminals.
    pub fn headline(&self) -> String {
        format!(
            "session {} {}: {}",
            self.session_id,
            self.outcome,
            self.result.summary()
        )
    }
}

/// Receives one report per finished session.
///
/// Called from the control surface's thread; implementations should hand
/// heavy work off rather than block.
pub trait ReportSink: Send + Sync {
    fn deliver(&self, report: &SessionReport);
}

/// Writes reports to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn deliver(&self, report: &SessionReport) {
        match report.outcome {
            SessionOutcome::Failed => tracing::warn!("{}", report.headline()),
            _ if report.result.has_threats() => {
                for threat in &report.result.threats {
                    tracing::warn!(
                        path = %threat.path.display(),
                        threat = threat.threat_name.as_deref().unwrap_or("unknown"),
                        "threat detected"
                    );
                }
                tracing::info!("{}", report.headline());
            }
            _ => tracing::info!("{}", report.headline()),
        }
    }
}

/// Keeps every delivered report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<SessionReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<SessionReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for MemorySink {
    fn deliver(&self, report: &SessionReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }
}
