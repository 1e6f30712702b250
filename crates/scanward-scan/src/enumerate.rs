//! Target enumeration using jwalk.

use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use tokio_util::sync::CancellationToken;

use scanward_core::{EngineKind, ScanConfig, ScanError, ScanTask};

/// Files discovered under a scan target.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    /// Canonical target path.
    pub root: PathBuf,
    /// One task per regular file, in sorted path order.
    pub tasks: Vec<ScanTask>,
    /// Entries that could not be read.
    pub warnings: Vec<String>,
    /// The walk stopped early because the token was cancelled.
    pub cancelled: bool,
}

/// Enumerate every regular file under `target`, routed to `engine`.
///
/// A file target yields a single task. Unreadable entries below the root are
/// recorded as warnings; an unreadable root is an error. The token is checked
/// before each entry and a cancelled walk returns what it found so far.
pub fn enumerate_tasks(
    target: &Path,
    config: &ScanConfig,
    engine: EngineKind,
    token: &CancellationToken,
) -> Result<Enumeration, ScanError> {
    let root = target
        .canonicalize()
        .map_err(|e| ScanError::io(target, e))?;
    let metadata = std::fs::metadata(&root).map_err(|e| ScanError::io(&root, e))?;

    if metadata.is_file() {
        let task = ScanTask::new(&root, engine).with_size(metadata.len());
        return Ok(Enumeration {
            root,
            tasks: vec![task],
            warnings: Vec::new(),
            cancelled: false,
        });
    }

    let walker = WalkDir::new(&root)
        .skip_hidden(!config.include_hidden)
        .follow_links(config.follow_symlinks)
        .max_depth(config.max_depth.map(|d| d as usize).unwrap_or(usize::MAX))
        .sort(true);

    let mut tasks = Vec::new();
    let mut warnings = Vec::new();
    let mut cancelled = false;

    for entry_result in walker {
        if token.is_cancelled() {
            cancelled = true;
            break;
        }
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                warnings.push(format!("{}: {err}", path.display()));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(err) => {
                warnings.push(format!("{}: {err}", path.display()));
                0
            }
        };
        tasks.push(ScanTask::new(path, engine).with_size(size));
    }

    tracing::debug!(
        root = %root.display(),
        files = tasks.len(),
        warnings = warnings.len(),
        cancelled,
        "enumerated scan target"
    );

    Ok(Enumeration {
        root,
        tasks,
        warnings,
        cancelled,
    })
}
