//! Scan requests, session identifiers and units of work.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a scan session, unique within one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Create a new session ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which detection engine a task is routed to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EngineKind {
    /// Signature-based malware detection.
    Signature,
    /// File integrity verification against a known-good baseline.
    Integrity,
}

/// Category of a scan session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScanType {
    /// Signature scan restricted to high-risk files.
    Quick,
    /// Signature scan of every file.
    Full,
    /// Integrity check against a baseline.
    Integrity,
    /// Signature scan of a user-chosen target, no risk restriction.
    Custom,
}

impl ScanType {
    /// The engine that serves this scan type.
    pub fn engine(self) -> EngineKind {
        match self {
            Self::Integrity => EngineKind::Integrity,
            Self::Quick | Self::Full | Self::Custom => EngineKind::Signature,
        }
    }

    /// Whether the quick risk restriction applies.
    pub fn is_quick(self) -> bool {
        matches!(self, Self::Quick)
    }
}

/// A request to start a scan session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// File or directory to scan.
    pub target: PathBuf,
    /// Quick-scan flag as set by the caller.
    pub quick_scan: bool,
    /// Explicit category, which wins over `quick_scan` when both are given.
    #[serde(default)]
    pub category: Option<ScanType>,
}

impl ScanRequest {
    /// Create a full scan request for a target.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            quick_scan: false,
            category: None,
        }
    }

    /// Create a quick scan request for a target.
    pub fn quick(target: impl Into<PathBuf>) -> Self {
        Self {
            quick_scan: true,
            ..Self::new(target)
        }
    }

    /// Set the quick-scan flag.
    pub fn with_quick_scan(mut self, quick_scan: bool) -> Self {
        self.quick_scan = quick_scan;
        self
    }

    /// Set an explicit category.
    pub fn with_category(mut self, category: ScanType) -> Self {
        self.category = Some(category);
        self
    }
}

/// A unit of work submitted to the execution pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTask {
    /// File to scan.
    pub path: PathBuf,
    /// Engine the task is routed to.
    pub engine: EngineKind,
    /// File size observed at enumeration time.
    pub size: u64,
}

impl ScanTask {
    /// Create a task with an unknown size.
    pub fn new(path: impl Into<PathBuf>, engine: EngineKind) -> Self {
        Self {
            path: path.into(),
            engine,
            size: 0,
        }
    }

    /// Set the observed size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Path of the file to scan.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}
