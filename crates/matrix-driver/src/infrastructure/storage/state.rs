//! Persisted runtime state that is not configuration.
//!
//! The driver remembers whether its first run has completed and which
//! displays it has already identified, so the identification flash only
//! happens once per device.  State lives next to the config file as
//! `state.toml`, behind the [`StateStore`] trait so tests and callers can
//! swap in an in-memory store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::platform_config_dir;

/// Error type for state persistence.
#[derive(Debug, Error)]
pub enum StateError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Facts the driver remembers between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppState {
    #[serde(default)]
    pub first_run_complete: bool,
    /// Serial numbers of displays that have been identified at least once.
    #[serde(default)]
    pub identified_serials: Vec<String>,
}

impl AppState {
    pub fn is_identified(&self, serial: &str) -> bool {
        self.identified_serials.iter().any(|known| known == serial)
    }

    /// Records `serial` as identified.  Returns `false` if it already was.
    pub fn mark_identified(&mut self, serial: &str) -> bool {
        if self.is_identified(serial) {
            return false;
        }
        self.identified_serials.push(serial.to_string());
        true
    }
}

/// Load/save access to [`AppState`].
pub trait StateStore: Send + Sync {
    /// Loads the state; a store that has never been saved yields the default.
    fn load(&self) -> Result<AppState, StateError>;

    fn save(&self, state: &AppState) -> Result<(), StateError>;

    /// Loads, lets `mutate` change the state, and saves only if `mutate`
    /// returns `true`.  Returns the (possibly updated) state.
    fn update<F>(&self, mutate: F) -> Result<AppState, StateError>
    where
        F: FnOnce(&mut AppState) -> bool,
        Self: Sized,
    {
        let mut state = self.load()?;
        if mutate(&mut state) {
            self.save(&state)?;
        }
        Ok(state)
    }
}

/// [`StateStore`] backed by a TOML file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `state.toml` in the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NoPlatformConfigDir`] if the directory cannot be
    /// determined.
    pub fn in_config_dir() -> Result<Self, StateError> {
        platform_config_dir()
            .map(|dir| Self::new(dir.join("state.toml")))
            .ok_or(StateError::NoPlatformConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<AppState, StateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppState::default()),
            Err(e) => Err(StateError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    fn save(&self, state: &AppState) -> Result<(), StateError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(state)?;
        std::fs::write(&self.path, content).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// [`StateStore`] held in memory; counts saves for assertions.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<AppState>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<AppState, StateError> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, state: &AppState) -> Result<(), StateError> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_mark_identified_is_idempotent() {
        let mut state = AppState::default();
        assert!(state.mark_identified("SN1"));
        assert!(!state.mark_identified("SN1"));
        assert_eq!(state.identified_serials, vec!["SN1".to_string()]);
    }

    #[test]
    fn test_update_saves_only_when_mutated() {
        // Arrange
        let store = MemoryStateStore::default();

        // Act
        store.update(|_| false).unwrap();
        let state = store
            .update(|state| {
                state.first_run_complete = true;
                true
            })
            .unwrap();

        // Assert
        assert!(state.first_run_complete);
        assert_eq!(store.save_count(), 1);
        assert!(store.load().unwrap().first_run_complete);
    }

    #[test]
    fn test_file_store_missing_file_yields_default() {
        let store = FileStateStore::new("/nonexistent/path/that/cannot/exist/state.toml");
        assert_eq!(store.load().unwrap(), AppState::default());
    }

    #[test]
    fn test_file_store_round_trips_state() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("ledmatrix_state_{}", Uuid::new_v4()));
        let store = FileStateStore::new(dir.join("state.toml"));
        let mut state = AppState::default();
        state.first_run_complete = true;
        state.mark_identified("FRAK01");

        // Act
        store.save(&state).unwrap();
        let loaded = store.load().unwrap();

        // Assert
        assert_eq!(loaded, state);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_file_store_reports_malformed_toml() {
        let dir = std::env::temp_dir().join(format!("ledmatrix_state_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.toml");
        std::fs::write(&path, "first_run_complete = \"maybe").unwrap();

        let result = FileStateStore::new(&path).load();

        assert!(matches!(result, Err(StateError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
