//! One-shot directory scan for candidate media files.
//!
//! Walks the watch root recursively at startup, skipping excluded staging
//! directories, and produces the backlog of media files ordered by
//! filesystem creation time (oldest first) so long backlogs drain in the
//! order they appeared rather than in traversal order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recognized media file extensions (matched case-insensitively).
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "wmv", "flv"];

/// Directory names treated as "not ready" staging areas by upstream tooling.
/// Any subtree rooted at one of these names is skipped entirely.
pub const EXCLUDED_DIRS: &[&str] = &["unsorted"];

/// A discovered media file not yet known to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Filesystem creation time (falls back to modification time where the
    /// platform does not report creation time).
    pub created_at: SystemTime,
}

impl CandidateFile {
    /// Build a candidate from a path, reading its timestamps from disk.
    pub fn from_path(path: PathBuf) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(&path)?;
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or_else(|_| SystemTime::now());
        Ok(Self { path, created_at })
    }

    /// Upload title derived from the file name (file stem, extension dropped).
    pub fn title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Upload tag derived from the parent directory name, if any.
    pub fn tag(&self) -> Option<String> {
        self.path
            .parent()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().into_owned())
    }
}

/// Returns true if the path has a recognized media extension.
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Returns true if the directory name is an excluded staging sentinel.
pub fn is_excluded_dir_name(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

/// Returns true if any path component is an excluded staging directory.
///
/// Used by the live watch feed, which sees individual file paths rather
/// than directory entries it could prune during traversal.
pub fn is_under_excluded_dir(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(is_excluded_dir_name)
            .unwrap_or(false)
    })
}

/// Scan `root` recursively for candidate media files.
///
/// - Subtrees whose directory name is an excluded sentinel are skipped.
/// - Only recognized media extensions are yielded (case-insensitive).
/// - Results are deduplicated by canonical path, so a file reachable via
///   two symlinked routes counts once.
/// - Results are sorted by creation time ascending, path as tie-break.
pub fn scan(root: &Path) -> Result<Vec<CandidateFile>> {
    if !root.is_dir() {
        bail!("Watch root is not a directory: {:?}", root);
    }

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut candidates = Vec::new();

    let walker = WalkDir::new(root).follow_links(true).into_iter();
    for entry in walker.filter_entry(|e| {
        // Prune excluded staging subtrees; never prune the root itself.
        !(e.file_type().is_dir()
            && e.depth() > 0
            && e.file_name()
                .to_str()
                .map(is_excluded_dir_name)
                .unwrap_or(false))
    }) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry during scan: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if !is_media_file(entry.path()) {
            continue;
        }

        let path = match entry.path().canonicalize() {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to resolve path {:?}: {}", entry.path(), e);
                continue;
            }
        };
        if !seen.insert(path.clone()) {
            debug!("Duplicate route to {:?}, already counted", path);
            continue;
        }

        match CandidateFile::from_path(path) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!("Failed to read metadata for {:?}: {}", entry.path(), e),
        }
    }

    candidates.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.path.cmp(&b.path))
    });

    debug!("Scan of {:?} found {} candidate(s)", root, candidates.len());
    Ok(candidates)
}
