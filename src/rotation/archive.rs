//! Archiving the degraded transcript before anything destructive happens.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::store::sanitize_handle;
use super::transcript::{is_well_formed, read_lossy};
use crate::errors::{Result, RotationError};

/// Extension used for archived transcripts.
pub const ARCHIVE_EXTENSION: &str = "jsonl";

/// Archive location for rotation `ordinal` of `context_id` under `archive_dir`.
///
/// The id comes from the host, so it is reduced to a plain file name and can
/// never point outside `archive_dir`. The ordinal keeps every rotation of the
/// same context in its own file.
pub fn archive_path_for(archive_dir: &Path, context_id: &str, ordinal: usize) -> PathBuf {
    archive_dir.join(format!(
        "{}-{}.{}",
        sanitize_handle(context_id),
        ordinal,
        ARCHIVE_EXTENSION
    ))
}

/// Copy `old_file` byte-for-byte to `archive_path`.
pub fn archive(old_file: &Path, archive_path: &Path) -> Result<PathBuf> {
    let copy_err = |source| RotationError::ArchiveCopy {
        from: old_file.to_path_buf(),
        to: archive_path.to_path_buf(),
        source,
    };

    if let Some(dir) = archive_path.parent() {
        fs::create_dir_all(dir).map_err(copy_err)?;
    }
    // Copying a file onto itself truncates it.
    if same_file(old_file, archive_path) {
        return Err(copy_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "archive target is the transcript itself",
        )));
    }
    let bytes = fs::copy(old_file, archive_path).map_err(copy_err)?;
    debug!(from = %old_file.display(), to = %archive_path.display(), bytes, "transcript archived");
    Ok(archive_path.to_path_buf())
}

/// Check that `archive_path` is a complete copy of `original`.
///
/// Valid means: the archive exists and is non-empty, its first and last
/// records parse as JSON, and it holds exactly as many records as the
/// original. Blank lines are not records. Invalid UTF-8 is read lossily.
pub fn validate(archive_path: &Path, original: &Path) -> bool {
    let Ok(archived) = read_lossy(archive_path) else {
        return false;
    };
    let archived_records = records(&archived);
    let (Some(first), Some(last)) = (archived_records.first(), archived_records.last()) else {
        return false;
    };
    if !is_well_formed(first) || !is_well_formed(last) {
        return false;
    }

    let Ok(source) = read_lossy(original) else {
        return false;
    };
    archived_records.len() == records(&source).len()
}

/// Delete a partial archive. A missing file is not an error.
pub fn discard(archive_path: &Path) -> std::io::Result<()> {
    match fs::remove_file(archive_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete the oldest archives so at most `retain` remain. `keep` is never
/// deleted. A `retain` of 0 disables pruning. Returns the removed paths.
pub fn prune(archive_dir: &Path, retain: usize, keep: &Path) -> Vec<PathBuf> {
    if retain == 0 {
        return Vec::new();
    }

    let Ok(entries) = fs::read_dir(archive_dir) else {
        return Vec::new();
    };
    let mut archives: Vec<(std::time::SystemTime, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext == ARCHIVE_EXTENSION)
                .unwrap_or(false)
        })
        .filter_map(|p| {
            let modified = p.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .collect();

    if archives.len() <= retain {
        return Vec::new();
    }

    // Oldest first.
    archives.sort();
    let excess = archives.len() - retain;
    let mut removed = Vec::new();
    for (_, path) in archives.into_iter().filter(|(_, p)| p != keep).take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to prune archive"),
        }
    }
    removed
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn records(content: &str) -> Vec<&str> {
    content.lines().filter(|l| !l.trim().is_empty()).collect()
}
