//! Blocking file helpers; callers run these on the blocking pool

use crate::error::{MeterbookError, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Path of the staging file used while replacing `path`
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Read a file, treating "not found" as absent
pub(crate) fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MeterbookError::io(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Replace `path` with `bytes` so readers see either the old or the new file.
///
/// The payload goes to a sibling temp file which is flushed to disk before a
/// single rename over the target.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                MeterbookError::io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    let staging = temp_path(path);
    {
        let mut file = File::create(&staging)
            .map_err(|e| MeterbookError::io(format!("Failed to create temp file: {}", e)))?;
        file.write_all(bytes)
            .map_err(|e| MeterbookError::io(format!("Failed to write temp file: {}", e)))?;
        file.sync_all()
            .map_err(|e| MeterbookError::io(format!("Failed to sync temp file: {}", e)))?;
    }

    fs::rename(&staging, path)
        .map_err(|e| MeterbookError::io(format!("Failed to rename temp file: {}", e)))?;
    Ok(())
}
