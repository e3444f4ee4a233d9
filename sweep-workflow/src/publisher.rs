//! Write-to-temp-then-rename publication.
//!
//! A final path only ever names a complete artifact: producers write to
//! `<final>.tmp`, and the rename happens only after validation succeeded.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use sweep_core::{temp_path_for, StageError};

use crate::validator;

/// Make `final_path` ready to be produced: create its directory and remove
/// a stale temp file from an earlier crashed run. Returns the temp path the
/// producer must write to.
pub fn prepare(final_path: &Path) -> Result<PathBuf, StageError> {
    if let Some(parent) = final_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StageError::io(parent, &e))?;
        }
    }

    let temp = temp_path_for(final_path);
    if validator::discard(&temp).map_err(|e| StageError::io(&temp, &e))? {
        tracing::warn!("Removed stale temp file {}", temp.display());
    }
    Ok(temp)
}

/// Atomically move a validated temp file onto its final name.
pub fn publish(temp: &Path, final_path: &Path) -> Result<(), StageError> {
    fs::rename(temp, final_path).map_err(|e| StageError::io(final_path, &e))?;
    sync_parent(final_path);
    Ok(())
}

/// Best-effort removal of temp files after a failed stage.
pub fn discard_temps<'a>(temps: impl IntoIterator<Item = &'a PathBuf>) {
    for temp in temps {
        if let Err(e) = validator::discard(temp) {
            tracing::warn!("Could not remove temp file {}: {}", temp.display(), e);
        }
    }
}

/// Write `bytes` under `final_path` atomically. Used for files produced in
/// process (campaign report).
pub fn write_atomic(final_path: &Path, bytes: &[u8]) -> Result<(), StageError> {
    let temp = prepare(final_path)?;
    write_synced(&temp, bytes).map_err(|e| StageError::io(&temp, &e))?;
    publish(&temp, final_path)
}

pub(crate) fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}
