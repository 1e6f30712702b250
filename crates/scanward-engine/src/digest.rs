//! Chunked BLAKE3 hashing with a deadline.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use blake3::Hasher;

use scanward_core::EngineError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Hash a file, giving up with [`EngineError::Timeout`] once `deadline`
/// passes. The deadline is checked between chunks.
pub fn hash_file(path: &Path, deadline: Option<Instant>) -> Result<blake3::Hash, EngineError> {
    let started = Instant::now();
    let mut file = File::open(path).map_err(|e| EngineError::io(path, e))?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(EngineError::Timeout {
                path: path.to_path_buf(),
                elapsed: started.elapsed(),
            });
        }

        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(EngineError::io(path, e)),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hash_matches_one_shot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        let content = vec![7u8; CHUNK_SIZE * 2 + 13];
        fs::write(&path, &content).unwrap();

        let hash = hash_file(&path, None).unwrap();
        assert_eq!(hash, blake3::hash(&content));
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        fs::write(&path, b"hello").unwrap();

        let deadline = Instant::now() - std::time::Duration::from_millis(1);
        let err = hash_file(&path, Some(deadline)).unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = hash_file(Path::new("/definitely/not/here"), None).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
