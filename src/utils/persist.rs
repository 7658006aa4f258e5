//! JSON files that survive being killed mid-write.
//!
//! A save serializes to `<name>.tmp`, moves the current file to `<name>.bak` and then
//! renames the temporary file into place. Loading prefers the primary file and falls
//! back to the backup when the primary is missing or unreadable.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::StoreError;

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// `results.json` -> `results.json.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serialize `value` to `path`, keeping the previous contents as a backup
pub fn write_with_backup<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let tmp = with_suffix(path, ".tmp");
    fs::write(&tmp, &json).map_err(|e| io_error(&tmp, e))?;

    if path.exists() {
        let backup = backup_path(path);
        fs::rename(path, &backup).map_err(|e| io_error(&backup, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;

    tracing::debug!("Saved {} ({} bytes)", path.display(), json.len());
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `path`, or its backup when the primary is missing or corrupt.
///
/// Returns `Ok(None)` only when neither file exists. If files exist but none can be
/// read, the primary's error is returned so nothing is silently overwritten.
pub fn read_with_fallback<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let backup = backup_path(path);
    let primary_exists = path.exists();
    let backup_exists = backup.exists();

    if !primary_exists && !backup_exists {
        return Ok(None);
    }

    let primary_error = if primary_exists {
        match read_json(path) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => {
                tracing::warn!("{} is unreadable: {}", path.display(), e);
                Some(e)
            }
        }
    } else {
        None
    };

    if backup_exists {
        match read_json(&backup) {
            Ok(value) => {
                tracing::warn!("Recovered {} from {}", path.display(), backup.display());
                return Ok(Some(value));
            }
            Err(e) => {
                tracing::warn!("{} is unreadable: {}", backup.display(), e);
                return Err(primary_error.unwrap_or(e));
            }
        }
    }

    Err(primary_error.unwrap_or_else(|| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: "no readable copy".to_string(),
    }))
}
