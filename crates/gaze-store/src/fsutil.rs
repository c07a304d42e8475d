//! Owner-only file helpers: private directories, atomic writes, one retry on I/O failure.

use crate::error::StorageError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const PRIVATE_DIR_MODE: u32 = 0o700;
const PRIVATE_FILE_MODE: u32 = 0o600;

/// Run `op`, and run it once more if the first attempt hits an I/O error.
pub(crate) fn retry_once<T>(
    what: &str,
    mut op: impl FnMut() -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    match op() {
        Err(StorageError::Io { path, source }) => {
            tracing::warn!(
                op = what,
                path = %path.display(),
                error = %source,
                "storage operation failed; retrying once"
            );
            op()
        }
        other => other,
    }
}

/// Create `dir` (and parents) and restrict it to the owner.
pub(crate) fn ensure_private_dir(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
    set_mode(dir, PRIVATE_DIR_MODE)
}

/// Write `bytes` to `path` via a temp file in the same directory, then rename.
///
/// A crash mid-write leaves the previous file intact. The result is owner-only.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    retry_once("write", || write_atomic_once(path, bytes))
}

fn write_atomic_once(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| StorageError::io(path, e))?;

    set_mode(tmp.path(), PRIVATE_FILE_MODE)?;
    {
        let file = tmp.as_file_mut();
        file.write_all(bytes).map_err(|e| StorageError::io(path, e))?;
        file.sync_all().map_err(|e| StorageError::io(path, e))?;
    }

    tmp.persist(path)
        .map_err(|err| StorageError::io(path, err.error))?;
    set_mode(path, PRIVATE_FILE_MODE)
}

/// Read a file, treating "not found" as `None`.
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    retry_once("read", || match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    })
}

/// Remove a file if present. Returns whether it existed.
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool, StorageError> {
    retry_once("remove", || match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| StorageError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), StorageError> {
    Ok(())
}
