//! JSON artifact files (checkpoint records, maintenance reports).
//!
//! Files are named `<yyyymmddThhmmss.nnnnnnnnnZ>-<id>.json` so that the
//! lexicographically last name is the most recent artifact.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name for an artifact created at `created_at`.
#[must_use]
pub fn artifact_file_name(created_at: &DateTime<Utc>, id: &str) -> String {
    format!("{}-{id}.json", created_at.format("%Y%m%dT%H%M%S%.9fZ"))
}

/// Writes `value` into `dir` via a temp file and rename; mode 0600.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] on serialization or I/O failure.
pub fn write_artifact<T: Serialize>(
    dir: &Path,
    created_at: &DateTime<Utc>,
    id: &str,
    value: &T,
) -> Result<PathBuf> {
    crate::services::path_manager::ensure_dir(dir)?;
    let path = dir.join(artifact_file_name(created_at, id));
    let tmp = dir.join(format!(".{id}.tmp"));
    let body = serde_json::to_vec_pretty(value).map_err(|e| Error::storage("encode_artifact", e))?;

    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let written = options
        .open(&tmp)
        .and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, &path));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::OperationFailed {
            operation: "write_artifact".to_string(),
            cause: format!("{}: {e}", path.display()),
        });
    }
    Ok(path)
}

/// Reads the most recent artifact in `dir`.
///
/// Unparseable files are skipped with a warning, falling back to the next
/// most recent one.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory exists but cannot be
/// listed.
pub fn latest_artifact<T: DeserializeOwned>(dir: &Path) -> Result<Option<T>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut names: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| Error::storage("list_artifacts", e))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "json")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'))
        })
        .collect();
    names.sort();

    for path in names.iter().rev() {
        match fs::read(path).map(|body| serde_json::from_slice::<T>(&body)) {
            Ok(Ok(value)) => return Ok(Some(value)),
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping malformed artifact");
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable artifact");
            },
        }
    }
    Ok(None)
}
