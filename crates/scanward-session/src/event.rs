//! Events broadcast by the session controller.

use scanward_core::{ProgressEvent, ScanType, SessionId};

use crate::report::SessionReport;

/// Progress and lifecycle notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started {
        session_id: SessionId,
        scan_type: ScanType,
    },
    Progress(ProgressEvent),
    Stopping {
        session_id: SessionId,
    },
    /// A start request was parked until the current session winds down.
    Queued {
        quick_scan: bool,
        replaced: bool,
    },
    /// A released pending request was discarded in favour of a direct start.
    PendingDropped {
        quick_scan: bool,
    },
    Completed(SessionReport),
    Stopped(SessionReport),
    Failed(SessionReport),
}
