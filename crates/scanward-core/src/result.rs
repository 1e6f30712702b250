//! Aggregated scan result.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::outcome::ScanOutcome;
use crate::task::{ScanType, SessionId};

/// Aggregated result of one scan session.
///
/// `scanned_count + skipped_count + errors.len() == total_files` holds for
/// every result built by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Session that produced the result.
    pub session_id: SessionId,
    /// Resolved scan type.
    pub scan_type: ScanType,
    /// Target of the scan.
    pub target: PathBuf,
    /// Number of tasks submitted.
    pub total_files: u64,
    /// Files classified as clean, infected or suspicious.
    pub scanned_count: u64,
    /// Files skipped by the risk filter or by cancellation.
    pub skipped_count: u64,
    /// Infected and suspicious outcomes, in arrival order.
    pub threats: Vec<ScanOutcome>,
    /// Error outcomes, in arrival order.
    pub errors: Vec<ScanOutcome>,
    /// Wall-clock duration of the session.
    pub duration_seconds: f64,
    /// Session-level failure, e.g. the target could not be enumerated.
    pub failure: Option<String>,
    /// Non-fatal notes recorded during the session.
    pub warnings: Vec<String>,
}

impl ScanResult {
    /// Create an empty result.
    pub fn new(session_id: SessionId, scan_type: ScanType, target: impl Into<PathBuf>) -> Self {
        Self {
            session_id,
            scan_type,
            target: target.into(),
            total_files: 0,
            scanned_count: 0,
            skipped_count: 0,
            threats: Vec::new(),
            errors: Vec::new(),
            duration_seconds: 0.0,
            failure: None,
            warnings: Vec::new(),
        }
    }

    pub fn threat_count(&self) -> usize {
        self.threats.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_threats(&self) -> bool {
        !self.threats.is_empty()
    }

    /// Whether the session failed before any task ran.
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Check the count invariant.
    pub fn is_consistent(&self) -> bool {
        self.scanned_count + self.skipped_count + self.errors.len() as u64 == self.total_files
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        if let Some(failure) = &self.failure {
            return format!("{} scan failed: {failure}", self.scan_type);
        }
        format!(
            "{} scan: {} of {} files scanned, {} threats, {} errors, {} skipped in {:.2}s",
            self.scan_type,
            self.scanned_count,
            self.total_files,
            self.threats.len(),
            self.errors.len(),
            self.skipped_count,
            self.duration_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_consistent() {
        let result = ScanResult::new(SessionId::new(1), ScanType::Full, "/tmp");
        assert!(result.is_consistent());
        assert!(!result.has_threats());
        assert!(!result.is_failed());
    }

    #[test]
    fn test_summary_mentions_failure() {
        let mut result = ScanResult::new(SessionId::new(1), ScanType::Quick, "/missing");
        result.failure = Some("Path not found: /missing".to_string());
        assert!(result.summary().contains("failed"));
    }
}
