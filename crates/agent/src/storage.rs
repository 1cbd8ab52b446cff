//! Persisted run state
//!
//! The client remembers a few things between runs: when the catalog was last
//! compiled, the facts it was compiled for, and the node's splay delay. They
//! live in one TOML file under the `configuration` namespace.

use crate::error::{Error, Result};
use crate::facts::Facts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// State remembered between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Unix time of the last successful compile.
    pub compile_time: Option<i64>,
    /// Facts the last catalog was compiled for.
    pub facts: Option<Facts>,
    /// Splay delay chosen for this node, in seconds.
    pub splay_time: Option<u64>,
    /// When the last run finished.
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    configuration: RunState,
}

/// Run state bound to its file.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    state: RunState,
}

impl Storage {
    /// Load the state file.
    ///
    /// A missing file gives empty state. A corrupt file is removed and empty
    /// state returned; failing to remove it is fatal.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match read_state(&path) {
            Ok(state) => state,
            Err(err @ Error::StateCorruption { .. }) => {
                log::error!("{err}");
                fs::remove_file(&path).map_err(|source| Error::StateUnrecoverable {
                    path: path.clone(),
                    source,
                })?;
                read_state(&path)?
            }
            Err(err) => return Err(err),
        };
        Ok(Self { path, state })
    }

    /// Read the state file without touching it.
    ///
    /// A corrupt file is reported as [`Error::StateCorruption`] and left in
    /// place.
    pub fn peek(path: impl AsRef<Path>) -> Result<RunState> {
        read_state(path.as_ref())
    }

    /// State file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    /// Write the state file atomically.
    pub fn save(&self) -> Result<()> {
        let file = StateFile {
            configuration: self.state.clone(),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| Error::Protocol(format!("could not serialize state: {e}")))?;
        write_atomic(&self.path, content.as_bytes())?;
        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

fn read_state(path: &Path) -> Result<RunState> {
    if !path.exists() {
        log::debug!("State file does not exist, using default state");
        return Ok(RunState::default());
    }
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let file: StateFile = toml::from_str(&content).map_err(|e| Error::StateCorruption {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    log::debug!("Loaded state from {}", path.display());
    Ok(file.configuration)
}

/// Write to a temporary file next to `path`, then rename it into place.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(content).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::load(dir.path().join("state.toml")).unwrap();
        assert_eq!(storage.state(), &RunState::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.toml");
        let mut storage = Storage::load(&path).unwrap();
        storage.state_mut().compile_time = Some(1_700_000_000);
        storage.state_mut().splay_time = Some(7);
        storage.state_mut().facts = Some(Facts::from([("role".to_string(), "web".to_string())]));
        storage.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[configuration]"));

        let reloaded = Storage::load(&path).unwrap();
        assert_eq!(reloaded.state(), storage.state());
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "this is [not toml").unwrap();

        let storage = Storage::load(&path).unwrap();
        assert_eq!(storage.state(), &RunState::default());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_corrupt_file_that_cannot_be_removed_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        let path = locked.join("state.toml");
        fs::write(&path, "configuration = [").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        let result = Storage::load(&path);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Root can remove files from read-only directories
        if let Err(err) = result {
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_peek_leaves_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "configuration = [[[").unwrap();

        let err = Storage::peek(&path).unwrap_err();
        assert!(matches!(err, Error::StateCorruption { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "configuration = [[[");
    }

    #[test]
    fn test_peek_reads_saved_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        assert_eq!(Storage::peek(&path).unwrap(), RunState::default());

        let mut storage = Storage::load(&path).unwrap();
        storage.state_mut().compile_time = Some(42);
        storage.save().unwrap();
        assert_eq!(Storage::peek(&path).unwrap().compile_time, Some(42));
    }
}
