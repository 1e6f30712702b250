//! In-process integrity engine comparing digests against a baseline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use scanward_core::{EngineError, EngineKind, ScanOutcome, ScanTask};

use crate::adapter::EngineAdapter;
use crate::digest::hash_file;

/// Threat label attached to files whose digest drifted from the baseline.
const MODIFIED_LABEL: &str = "Integrity.Modified";

/// Known-good digests of a set of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Path to lowercase hex BLAKE3 digest.
    pub entries: BTreeMap<PathBuf, String>,
}

impl Baseline {
    /// Create an empty baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash `paths` in parallel. Files that cannot be read are returned
    /// separately and left out of the baseline.
    pub fn build(paths: &[PathBuf]) -> (Self, Vec<(PathBuf, EngineError)>) {
        let hashed: Vec<(PathBuf, Result<blake3::Hash, EngineError>)> = paths
            .par_iter()
            .map(|path| (path.clone(), hash_file(path, None)))
            .collect();

        let mut baseline = Self::new();
        let mut failures = Vec::new();
        for (path, result) in hashed {
            match result {
                Ok(hash) => {
                    baseline.entries.insert(path, hash.to_hex().to_string());
                }
                Err(e) => failures.push((path, e)),
            }
        }
        (baseline, failures)
    }

    /// Load a JSON baseline.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| EngineError::Definitions {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write the baseline as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| EngineError::Definitions {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| EngineError::io(path, e))
    }

    /// Recorded digest for a path.
    pub fn digest_for(&self, path: &Path) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Integrity engine backed by a [`Baseline`].
pub struct IntegrityAdapter {
    source: Option<PathBuf>,
    baseline: RwLock<Arc<Baseline>>,
    timeout: Duration,
}

impl IntegrityAdapter {
    pub fn new(baseline: Baseline, timeout: Duration) -> Self {
        Self {
            source: None,
            baseline: RwLock::new(Arc::new(baseline)),
            timeout,
        }
    }

    /// Create an adapter that loads, and later reloads, a baseline file.
    pub fn from_file(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self, EngineError> {
        let path = path.into();
        let baseline = Baseline::load(&path)?;
        tracing::debug!(path = %path.display(), entries = baseline.len(), "baseline loaded");
        Ok(Self {
            source: Some(path),
            baseline: RwLock::new(Arc::new(baseline)),
            timeout,
        })
    }

    fn snapshot(&self) -> Arc<Baseline> {
        self.baseline.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl EngineAdapter for IntegrityAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Integrity
    }

    fn name(&self) -> &str {
        "integrity"
    }

    fn invoke(
        &self,
        task: &ScanTask,
        token: &CancellationToken,
    ) -> Result<ScanOutcome, EngineError> {
        if token.is_cancelled() {
            return Ok(ScanOutcome::skipped(task, "cancelled"));
        }

        let baseline = self.snapshot();
        let started = Instant::now();
        let Some(expected) = baseline.digest_for(&task.path) else {
            return Ok(ScanOutcome::clean(task, started.elapsed()));
        };

        let actual = hash_file(&task.path, Some(started + self.timeout))?;
        if actual.to_hex().as_str() == expected {
            Ok(ScanOutcome::clean(task, started.elapsed()))
        } else {
            let mut outcome = ScanOutcome::suspicious(task, MODIFIED_LABEL, started.elapsed());
            outcome.detail = Some("digest changed since baseline".to_string());
            Ok(outcome)
        }
    }

    fn update_definitions(&self) -> bool {
        let Some(path) = &self.source else {
            return false;
        };
        match Baseline::load(path) {
            Ok(baseline) => {
                *self.baseline.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(baseline);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "baseline reload failed");
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        !self.snapshot().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_skips_unreadable() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good");
        fs::write(&good, b"content").unwrap();
        let missing = temp.path().join("missing");

        let (baseline, failures) = Baseline::build(&[good.clone(), missing.clone()]);
        assert_eq!(baseline.len(), 1);
        assert!(baseline.digest_for(&good).is_some());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, missing);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a");
        fs::write(&file, b"a").unwrap();
        let (baseline, _) = Baseline::build(&[file]);

        let manifest = temp.path().join("baseline.json");
        baseline.save(&manifest).unwrap();
        assert_eq!(Baseline::load(&manifest).unwrap(), baseline);
    }
}
