//! Session and pending-request types.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use scanward_core::{ScanRequest, ScanType, SessionId};

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
    Stopping,
}

/// The one active scan session.
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub id: SessionId,
    pub state: SessionState,
    pub scan_type: ScanType,
    pub request: ScanRequest,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set when the session was ended by an explicit stop.
    pub manual_stop: bool,
}

impl ScanSession {
    pub fn new(id: SessionId, scan_type: ScanType, request: ScanRequest) -> Self {
        Self {
            id,
            state: SessionState::Scanning,
            scan_type,
            request,
            started_at: Utc::now(),
            ended_at: None,
            manual_stop: false,
        }
    }
}

/// A start request held while the active session winds down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request: ScanRequest,
    pub queued_at: Instant,
}

impl PendingRequest {
    pub fn new(request: ScanRequest) -> Self {
        Self {
            request,
            queued_at: Instant::now(),
        }
    }

    pub fn quick_scan(&self) -> bool {
        self.request.quick_scan
    }
}
