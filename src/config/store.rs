//! JSON config file persistence with a `.bak` rollback copy.

use super::{ConfigFile, MemoryConfig};
use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads and writes [`MemoryConfig`] files.
pub struct ConfigStore;

impl ConfigStore {
    /// Loads a config file.
    ///
    /// A missing file yields the defaults. A corrupt file falls back to its
    /// `.bak` sibling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if neither the file nor its backup
    /// parse, or [`Error::OperationFailed`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<MemoryConfig> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file missing, using defaults");
            return Ok(MemoryConfig::default());
        }

        match Self::read_file(path) {
            Ok(file) => Ok(MemoryConfig::from_config_file(file)),
            Err(primary) => {
                let backup = backup_path(path);
                tracing::warn!(
                    path = %path.display(),
                    error = %primary,
                    "Config file unreadable, trying backup"
                );
                Self::read_file(&backup)
                    .map(MemoryConfig::from_config_file)
                    .map_err(|_| primary)
            },
        }
    }

    /// Writes a config file atomically.
    ///
    /// The new content goes to a temp file in the same directory, the current
    /// file (if any) is copied to `<path>.bak`, then the temp file is renamed
    /// over `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on any filesystem failure.
    pub fn save(path: &Path, config: &MemoryConfig) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| Error::storage("create_config_dir", e))?;

        let body = serde_json::to_vec_pretty(&config.to_config_file())
            .map_err(|e| Error::storage("serialize_config", e))?;

        let tmp = parent.join(format!(
            ".{}.tmp-{}",
            path.file_name().map_or_else(|| "config".into(), |n| n.to_string_lossy()),
            uuid::Uuid::new_v4().simple()
        ));
        let result = write_tmp(&tmp, &body).and_then(|()| {
            if path.exists() {
                fs::copy(path, backup_path(path)).map_err(|e| Error::storage("backup_config", e))?;
            }
            fs::rename(&tmp, path).map_err(|e| Error::storage("replace_config", e))
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn read_file(path: &Path) -> Result<ConfigFile> {
        let contents =
            fs::read_to_string(path).map_err(|e| Error::storage("read_config_file", e))?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::InvalidInput(format!("invalid config file {}: {e}", path.display()))
        })
    }
}

fn write_tmp(tmp: &Path, body: &[u8]) -> Result<()> {
    let mut file = fs::File::create(tmp).map_err(|e| Error::storage("write_config", e))?;
    file.write_all(body)
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::storage("write_config", e))
}

/// `<path>.bak`.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigStore::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(config.journal.buffer_size, 256);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = MemoryConfig::default().with_root_dir(dir.path().join("root"));
        config.journal.buffer_size = 12;
        ConfigStore::save(&path, &config).unwrap();

        let loaded = ConfigStore::load(&path).unwrap();
        assert_eq!(loaded.journal.buffer_size, 12);
        assert_eq!(loaded.root_dir, dir.path().join("root"));
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = MemoryConfig::default();
        config.checkpoint_max_events = 40;
        ConfigStore::save(&path, &config).unwrap();
        config.checkpoint_max_events = 41;
        ConfigStore::save(&path, &config).unwrap();
        assert!(backup_path(&path).exists());

        fs::write(&path, "{not json").unwrap();
        let loaded = ConfigStore::load(&path).unwrap();
        assert_eq!(loaded.checkpoint_max_events, 40);
    }

    #[test]
    fn test_corrupt_without_backup_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{\"journal\": 5").unwrap();
        let err = ConfigStore::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }
}
