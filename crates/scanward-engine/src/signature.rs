//! In-process signature engine matching BLAKE3 digests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use scanward_core::{EngineError, EngineKind, ScanOutcome, ScanTask};

use crate::adapter::EngineAdapter;
use crate::digest::hash_file;

/// Known-bad digests mapped to threat names.
///
/// The text format is one `<hex-digest> <threat-name>` pair per line;
/// blank lines and lines starting with `#` are ignored.
#[derive(Debug, Clone, Default)]
pub struct SignatureDb {
    entries: HashMap<blake3::Hash, String>,
}

impl SignatureDb {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text format. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, EngineError> {
        let mut db = Self::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (digest, name) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| EngineError::Definitions {
                    path: origin.to_path_buf(),
                    message: format!("line {}: expected `<digest> <name>`", number + 1),
                })?;
            let hash = blake3::Hash::from_hex(digest).map_err(|e| EngineError::Definitions {
                path: origin.to_path_buf(),
                message: format!("line {}: {e}", number + 1),
            })?;
            db.insert(hash, name.trim());
        }
        Ok(db)
    }

    /// Load a database file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::parse(&content, path)
    }

    /// Add or replace a signature.
    pub fn insert(&mut self, hash: blake3::Hash, threat: impl Into<String>) {
        self.entries.insert(hash, threat.into());
    }

    /// Threat name for a digest, if known.
    pub fn lookup(&self, hash: &blake3::Hash) -> Option<&str> {
        self.entries.get(hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Signature engine backed by a [`SignatureDb`].
pub struct SignatureAdapter {
    source: Option<PathBuf>,
    db: RwLock<Arc<SignatureDb>>,
    timeout: Duration,
}

impl SignatureAdapter {
    /// Create an adapter over an in-memory database.
    pub fn new(db: SignatureDb, timeout: Duration) -> Self {
        Self {
            source: None,
            db: RwLock::new(Arc::new(db)),
            timeout,
        }
    }

    /// Create an adapter that loads, and later reloads, a database file.
    pub fn from_file(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self, EngineError> {
        let path = path.into();
        let db = SignatureDb::load(&path)?;
        tracing::debug!(path = %path.display(), signatures = db.len(), "signature database loaded");
        Ok(Self {
            source: Some(path),
            db: RwLock::new(Arc::new(db)),
            timeout,
        })
    }

    /// Number of loaded signatures.
    pub fn signature_count(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Arc<SignatureDb> {
        self.db.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl EngineAdapter for SignatureAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Signature
    }

    fn name(&self) -> &str {
        "signature"
    }

    fn invoke(
        &self,
        task: &ScanTask,
        token: &CancellationToken,
    ) -> Result<ScanOutcome, EngineError> {
        if token.is_cancelled() {
            return Ok(ScanOutcome::skipped(task, "cancelled"));
        }

        let db = self.snapshot();
        if db.is_empty() {
            return Err(EngineError::unavailable("no signatures loaded"));
        }

        let started = Instant::now();
        let hash = hash_file(&task.path, Some(started + self.timeout))?;
        let outcome = match db.lookup(&hash) {
            Some(threat) => ScanOutcome::infected(task, threat, started.elapsed()),
            None => ScanOutcome::clean(task, started.elapsed()),
        };
        Ok(outcome)
    }

    fn update_definitions(&self) -> bool {
        let Some(path) = &self.source else {
            return false;
        };
        match SignatureDb::load(path) {
            Ok(db) => {
                tracing::info!(signatures = db.len(), "signature database reloaded");
                *self.db.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(db);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "signature database reload failed");
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
    fn test_parse_skips_comments() {
        let hash = blake3::hash(b"payload");
        let content = format!("# test db\n\n{} Test.Payload\n", hash.to_hex());

        let db = SignatureDb::parse(&content, Path::new("test.db")).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.lookup(&hash), Some("Test.Payload"));
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = SignatureDb::parse("# ok\nnot-hex Name\n", Path::new("bad.db")).unwrap_err();
        match err {
            EngineError::Definitions { message, .. } => assert!(message.starts_with("line 2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_db_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"x").unwrap();

        let adapter = SignatureAdapter::new(SignatureDb::new(), Duration::from_secs(1));
        assert!(!adapter.is_available());

        let task = ScanTask::new(&path, EngineKind::Signature);
        let err = adapter.invoke(&task, &CancellationToken::new()).unwrap_err();
        assert!(err.is_unavailable());
    }
}
