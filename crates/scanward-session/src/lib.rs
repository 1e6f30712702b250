//! Scan session lifecycle for scanward.
//!
//! [`ScanSessionController`] is the state machine the control surface talks
//! to. It keeps at most one session active, parks at most one start request
//! while a session is stopping, and detects worker completion through a
//! non-blocking [`tick`](ScanSessionController::tick).
//!
//! ```text
//!            start                 stop
//!   Idle ───────────▶ Scanning ───────────▶ Stopping
//!    ▲                   │                     │
//!    │    completed      │      worker done    │
//!    └───────────────────┴─────────────────────┘
//! ```
//!
//! Finished sessions are handed to a [`ReportSink`]; progress and lifecycle
//! notifications are broadcast as [`SessionEvent`]s.

mod controller;
mod event;
mod report;
mod session;

pub use controller::{ScanSessionController, StartOutcome};
pub use event::SessionEvent;
pub use report::{LogSink, MemorySink, ReportSink, SessionOutcome, SessionReport};
pub use session::{PendingRequest, ScanSession, SessionState};
