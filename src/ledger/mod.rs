//! Durable record of already-uploaded paths.
//!
//! The ledger is the source of truth for deduplication: a path present in
//! the ledger is never re-enqueued or re-uploaded. It is persisted as a JSON
//! array of absolute paths, loaded once at startup and fully rewritten after
//! every successful upload (write-then-ack: a crash before the write
//! completes means the path is re-processed on the next run, so a re-upload
//! is an acceptable outcome of the crash window).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading or persisting the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error on ledger file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted ledger exists but cannot be parsed. This is fatal at
    /// startup: silently discarding upload history would cause mass
    /// re-uploads.
    #[error("Corrupt ledger file {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistent set of already-uploaded file paths.
///
/// Thread-safe: admission checks and recording go through an internal lock.
/// The persisted form is only ever written by the upload worker, so there
/// are no concurrent writers of the file itself.
pub struct UploadLedger {
    file_path: PathBuf,
    entries: Mutex<BTreeSet<PathBuf>>,
}

impl UploadLedger {
    /// Load the ledger from `file_path`.
    ///
    /// An absent file is an empty ledger, not an error. A file that exists
    /// but does not parse is a fatal [`LedgerError::Corrupt`].
    pub fn load(file_path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let file_path = file_path.into();

        let entries = if file_path.exists() {
            let content = std::fs::read_to_string(&file_path).map_err(|source| LedgerError::Io {
                path: file_path.clone(),
                source,
            })?;
            let paths: Vec<PathBuf> =
                serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
                    path: file_path.clone(),
                    source,
                })?;
            paths.into_iter().collect()
        } else {
            BTreeSet::new()
        };

        debug!(
            "Loaded ledger from {:?} with {} entries",
            file_path,
            entries.len()
        );

        Ok(Self {
            file_path,
            entries: Mutex::new(entries),
        })
    }

    /// Returns true if `path` has already been uploaded.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().unwrap().contains(path)
    }

    /// Number of recorded uploads.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `path` as uploaded and persist the updated set before
    /// returning. Idempotent: recording a known path rewrites the file with
    /// unchanged contents.
    pub fn record(&self, path: &Path) -> Result<(), LedgerError> {
        let snapshot: Vec<PathBuf> = {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(path.to_path_buf());
            entries.iter().cloned().collect()
        };
        self.write_snapshot(&snapshot)
    }

    /// Persist the current set. Used for the best-effort flush at shutdown;
    /// a no-op in content terms since `record` already persisted.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let snapshot: Vec<PathBuf> = self.entries.lock().unwrap().iter().cloned().collect();
        self.write_snapshot(&snapshot)
    }

    fn write_snapshot(&self, snapshot: &[PathBuf]) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(snapshot).map_err(|source| LedgerError::Corrupt {
            path: self.file_path.clone(),
            source,
        })?;
        std::fs::write(&self.file_path, json).map_err(|source| LedgerError::Io {
            path: self.file_path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_path(temp: &TempDir) -> PathBuf {
        temp.path().join("uploaded.json")
    }

    #[test]
    fn test_load_absent_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = UploadLedger::load(ledger_path(&temp)).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.contains(Path::new("/media/a.mp4")));
    }

    #[test]
    fn test_record_then_reload() {
        let temp = TempDir::new().unwrap();
        let path = ledger_path(&temp);

        let ledger = UploadLedger::load(&path).unwrap();
        ledger.record(Path::new("/media/a.mp4")).unwrap();
        ledger.record(Path::new("/media/b.mkv")).unwrap();

        let reloaded = UploadLedger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(Path::new("/media/a.mp4")));
        assert!(reloaded.contains(Path::new("/media/b.mkv")));
        assert!(!reloaded.contains(Path::new("/media/c.avi")));
    }

    #[test]
    fn test_record_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let ledger = UploadLedger::load(ledger_path(&temp)).unwrap();
        ledger.record(Path::new("/media/a.mp4")).unwrap();
        ledger.record(Path::new("/media/a.mp4")).unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let path = ledger_path(&temp);
        std::fs::write(&path, "not json {{{").unwrap();

        let result = UploadLedger::load(&path);
        assert!(matches!(result, Err(LedgerError::Corrupt { .. })));
    }

    #[test]
    fn test_persist_writes_current_set() {
        let temp = TempDir::new().unwrap();
        let path = ledger_path(&temp);

        let ledger = UploadLedger::load(&path).unwrap();
        ledger.record(Path::new("/media/a.mp4")).unwrap();
        ledger.persist().unwrap();

        let reloaded = UploadLedger::load(&path).unwrap();
        assert!(reloaded.contains(Path::new("/media/a.mp4")));
    }
}
