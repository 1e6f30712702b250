//! Per-file scan outcomes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::task::{EngineKind, ScanTask};

/// Classification of one scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Verdict {
    Clean,
    Infected,
    Suspicious,
    Error,
    Skipped,
}

impl Verdict {
    /// Infected or suspicious.
    pub fn is_threat(self) -> bool {
        matches!(self, Self::Infected | Self::Suspicious)
    }

    /// Whether an engine actually produced a classification for the file.
    pub fn is_scanned(self) -> bool {
        matches!(self, Self::Clean | Self::Infected | Self::Suspicious)
    }
}

/// Result of executing (or skipping) one [`ScanTask`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// File the outcome refers to.
    pub path: PathBuf,
    /// Engine the task was routed to.
    pub engine: EngineKind,
    /// Classification.
    pub verdict: Verdict,
    /// Threat name reported by the engine, for threats.
    pub threat_name: Option<String>,
    /// Error or skip reason.
    pub detail: Option<String>,
    /// Time spent on the file.
    pub duration: Duration,
}

impl ScanOutcome {
    fn for_task(task: &ScanTask, verdict: Verdict, duration: Duration) -> Self {
        Self {
            path: task.path.clone(),
            engine: task.engine,
            verdict,
            threat_name: None,
            detail: None,
            duration,
        }
    }

    pub fn clean(task: &ScanTask, duration: Duration) -> Self {
        Self::for_task(task, Verdict::Clean, duration)
    }

    pub fn infected(task: &ScanTask, threat: impl Into<String>, duration: Duration) -> Self {
        Self {
            threat_name: Some(threat.into()),
            ..Self::for_task(task, Verdict::Infected, duration)
        }
    }

    pub fn suspicious(task: &ScanTask, threat: impl Into<String>, duration: Duration) -> Self {
        Self {
            threat_name: Some(threat.into()),
            ..Self::for_task(task, Verdict::Suspicious, duration)
        }
    }

    pub fn error(task: &ScanTask, detail: impl Into<String>, duration: Duration) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::for_task(task, Verdict::Error, duration)
        }
    }

    pub fn skipped(task: &ScanTask, reason: impl Into<String>) -> Self {
        Self {
            detail: Some(reason.into()),
            ..Self::for_task(task, Verdict::Skipped, Duration::ZERO)
        }
    }

    /// Whether this outcome is a threat.
    pub fn is_threat(&self) -> bool {
        self.verdict.is_threat()
    }
}
