//! Error types for engines, sessions and configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a single engine invocation.
///
/// All of these are per-file and non-fatal: the pool records them as
/// error outcomes and carries on.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine process or daemon could not be reached.
    #[error("Engine unavailable: {reason}")]
    Unavailable { reason: String },

    /// The per-file ceiling was exceeded.
    #[error("Engine timed out after {}ms on {path}", .elapsed.as_millis())]
    Timeout { path: PathBuf, elapsed: Duration },

    /// Generic I/O error while reading the file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine answered with output that could not be interpreted.
    #[error("Unexpected engine output: {message}")]
    Protocol { message: String },

    /// Signature or baseline definitions could not be loaded.
    #[error("Invalid definitions in {path}: {message}")]
    Definitions { path: PathBuf, message: String },
}

impl EngineError {
    /// Create an unavailability error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error signals that the engine itself is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Session-level errors.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A background worker failed.
    #[error("Worker failed: {message}")]
    Worker { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));

        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_engine_error_messages() {
        let err = EngineError::Timeout {
            path: PathBuf::from("/tmp/big.iso"),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "Engine timed out after 1500ms on /tmp/big.iso");
        assert!(!err.is_unavailable());
        assert!(EngineError::unavailable("clamd not running").is_unavailable());
    }
}
