//! Progress events.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Progress of a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion percentage in `[0, 100]`.
    pub percent: f64,
    /// Human-readable status line.
    pub message: String,
    /// File most recently finished (empty when not applicable).
    pub current_path: PathBuf,
}

impl ProgressEvent {
    /// Create a progress event, clamping the percentage to `[0, 100]`.
    pub fn new(percent: f64, message: impl Into<String>, current_path: impl Into<PathBuf>) -> Self {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        Self {
            percent,
            message: message.into(),
            current_path: current_path.into(),
        }
    }

    /// Build an event from completed/total counts.
    pub fn from_counts(done: u64, total: u64, current_path: impl Into<PathBuf>) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            done as f64 / total as f64 * 100.0
        };
        Self::new(percent, format!("{done}/{total} files"), current_path)
    }

    /// An event that resets progress to zero.
    pub fn reset(message: impl Into<String>) -> Self {
        Self::new(0.0, message, PathBuf::new())
    }

    /// Whether the event reports completion.
    pub fn is_complete(&self) -> bool {
        self.percent >= 100.0
    }
}

impl Default for ProgressEvent {
    fn default() -> Self {
        Self::reset("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_clamped() {
        assert_eq!(ProgressEvent::new(140.0, "", "").percent, 100.0);
        assert_eq!(ProgressEvent::new(-3.0, "", "").percent, 0.0);
        assert_eq!(ProgressEvent::new(f64::NAN, "", "").percent, 0.0);
    }

    #[test]
    fn test_from_counts() {
        let event = ProgressEvent::from_counts(1, 4, "/tmp/x");
        assert_eq!(event.percent, 25.0);
        assert_eq!(event.message, "1/4 files");
        assert!(ProgressEvent::from_counts(0, 0, "").is_complete());
    }
}
