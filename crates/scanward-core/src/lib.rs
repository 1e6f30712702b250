//! Core types and configuration for scanward.
//!
//! This crate provides the data model shared by every other scanward crate:
//! scan requests and tasks, per-file outcomes, the aggregated scan result,
//! progress events, the error taxonomy and the session configuration.

mod config;
mod error;
mod outcome;
mod progress;
mod result;
mod task;

pub use config::{PendingPolicy, RiskPolicy, ScanConfig, ScanConfigBuilder};
pub use error::{ConfigError, EngineError, ScanError};
pub use outcome::{ScanOutcome, Verdict};
pub use progress::ProgressEvent;
pub use result::ScanResult;
pub use task::{EngineKind, ScanRequest, ScanTask, ScanType, SessionId};
