//! Low-level file publication helpers.
//!
//! Archives, sidecar files and data-set modules are always published
//! atomically: content goes to a temporary sibling, is flushed to disk, and
//! is renamed into place. A reader never observes a half-written artifact.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::{ArchiveError, Result};

/// Writes `bytes` to `path` via a temporary sibling, fsync and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::Internal(format!("bad target path {path:?}")))?;
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

/// Writes UTF-8 text atomically.
pub fn write_text_atomic(path: &Path, text: &str) -> Result<()> {
    write_atomic(path, text.as_bytes())
}

/// Creates `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}
