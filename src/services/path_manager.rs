//! Per-agent path layout.
//!
//! Every agent owns one directory tree under the configured root:
//!
//! ```text
//! <root>/<agent_id>/memory/
//!     memory.db
//!     events/<YYYY-MM-DD>.jsonl
//!     checkpoints/<stamp>-<id>.json
//!     maintenance/<stamp>-<id>.json
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use agentmem::services::AgentPaths;
//!
//! let paths = AgentPaths::new("/var/lib/agentmem", "planner")?;
//! paths.ensure_dirs()?;
//! let db = paths.db_path();
//! ```

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-agent memory directory.
pub const MEMORY_DIR_NAME: &str = "memory";

/// Name of the `SQLite` item database file.
pub const ITEM_DB_NAME: &str = "memory.db";

/// Journal partition directory.
pub const EVENTS_DIR_NAME: &str = "events";

/// Checkpoint record directory.
pub const CHECKPOINTS_DIR_NAME: &str = "checkpoints";

/// Maintenance report directory.
pub const MAINTENANCE_DIR_NAME: &str = "maintenance";

/// Validates an agent id.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the id is empty, is `.`, contains
/// `..`, or contains a path separator.
pub fn validate_agent_id(agent_id: &str) -> Result<&str> {
    let trimmed = agent_id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("agent_id is required".to_string()));
    }
    if trimmed == "." {
        return Err(Error::InvalidInput(
            "agent_id '.' does not name a directory".to_string(),
        ));
    }
    if trimmed.contains("..") || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(Error::InvalidInput(format!(
            "agent_id '{trimmed}' must not contain '..' or path separators"
        )));
    }
    Ok(trimmed)
}

/// Paths for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPaths {
    agent_id: String,
    memory_dir: PathBuf,
}

impl AgentPaths {
    /// Creates the layout for `agent_id` under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid agent id.
    pub fn new(root: impl AsRef<Path>, agent_id: &str) -> Result<Self> {
        let agent_id = validate_agent_id(agent_id)?.to_string();
        let memory_dir = root.as_ref().join(&agent_id).join(MEMORY_DIR_NAME);
        Ok(Self {
            agent_id,
            memory_dir,
        })
    }

    /// The validated agent id.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// `<root>/<agent>/memory`.
    #[must_use]
    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    /// The item database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.memory_dir.join(ITEM_DB_NAME)
    }

    /// The journal partition directory.
    #[must_use]
    pub fn events_dir(&self) -> PathBuf {
        self.memory_dir.join(EVENTS_DIR_NAME)
    }

    /// The checkpoint record directory.
    #[must_use]
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.memory_dir.join(CHECKPOINTS_DIR_NAME)
    }

    /// The maintenance report directory.
    #[must_use]
    pub fn maintenance_dir(&self) -> PathBuf {
        self.memory_dir.join(MAINTENANCE_DIR_NAME)
    }

    /// Creates every directory in the layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if a directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.memory_dir.clone(),
            self.events_dir(),
            self.checkpoints_dir(),
            self.maintenance_dir(),
        ] {
            ensure_dir(&dir)?;
        }
        Ok(())
    }
}

/// Creates a directory (and parents) with mode 0755.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory cannot be created.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir).map_err(|e| Error::OperationFailed {
        operation: "create_dir".to_string(),
        cause: format!("{}: {e}", dir.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("." ; "current dir")]
    #[test_case(" . " ; "padded current dir")]
    #[test_case(".." ; "parent dir")]
    #[test_case("../etc" ; "parent traversal")]
    #[test_case("a/b" ; "forward slash")]
    #[test_case("a\\b" ; "backslash")]
    fn test_invalid_agent_ids(agent_id: &str) {
        assert!(matches!(
            AgentPaths::new("/tmp", agent_id),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_layout() {
        let paths = AgentPaths::new("/data", " planner ").unwrap();
        assert_eq!(paths.agent_id(), "planner");
        assert_eq!(paths.db_path(), PathBuf::from("/data/planner/memory/memory.db"));
        assert_eq!(paths.events_dir(), PathBuf::from("/data/planner/memory/events"));
        assert_eq!(
            paths.checkpoints_dir(),
            PathBuf::from("/data/planner/memory/checkpoints")
        );
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = TempDir::new().unwrap();
        let paths = AgentPaths::new(dir.path(), "a").unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.events_dir().is_dir());
        assert!(paths.maintenance_dir().is_dir());
        paths.ensure_dirs().unwrap();
    }
}
