//! Settings store implementations
//!
//! [`FileStore`] keeps the persisted state as a TOML file next to the client
//! configuration and writes through on every change. [`MemoryStore`] keeps
//! it in memory, for embedding and tests.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config;
use crate::error::StoreError;
use crate::traits::SettingsStore;
use crate::types::ResourceEnablement;

/// Default state file name
const STATE_FILE_NAME: &str = "state.toml";

/// Get the default state file path
pub fn default_store_path() -> PathBuf {
    config::default_config_dir().join(STATE_FILE_NAME)
}

/// Everything the client persists between sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredState {
    /// Authentication token
    pub token: Option<String>,
    /// Stable device identifier
    pub device_id: Option<String>,
    /// Display name of the signed-in actor
    pub actor_name: Option<String>,
    /// Enablement of the internet resource
    pub internet_resource: ResourceEnablement,
}

/// Return the stored device ID, generating and saving a new one on first use
pub fn ensure_device_id(store: &dyn SettingsStore) -> Result<String, StoreError> {
    if let Some(device_id) = store.device_id()? {
        return Ok(device_id);
    }

    let device_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("Generated new device ID {}", device_id);
    store.save_device_id(&device_id)?;
    Ok(device_id)
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoredState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given state
    pub fn with_state(state: StoredState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> StoredState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, StoredState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemoryStore {
    fn token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.lock().token.clone())
    }

    fn clear_token(&self) -> Result<(), StoreError> {
        self.lock().token = None;
        Ok(())
    }

    fn clear_actor_name(&self) -> Result<(), StoreError> {
        self.lock().actor_name = None;
        Ok(())
    }

    fn device_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.lock().device_id.clone())
    }

    fn save_device_id(&self, device_id: &str) -> Result<(), StoreError> {
        self.lock().device_id = Some(device_id.to_string());
        Ok(())
    }

    fn internet_resource_state(&self) -> Result<ResourceEnablement, StoreError> {
        Ok(self.lock().internet_resource)
    }

    fn save_internet_resource_state(&self, state: ResourceEnablement) -> Result<(), StoreError> {
        self.lock().internet_resource = state;
        Ok(())
    }
}

/// TOML file backed settings store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<StoredState>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No state file at {:?}, starting empty", path);
                StoredState::default()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Apply `change` and write the result to disk
    fn update(&self, change: impl FnOnce(&mut StoredState)) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        change(&mut state);

        let content = toml::to_string_pretty(&*state)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&StoredState) -> T) -> T {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&*state)
    }
}

impl SettingsStore for FileStore {
    fn token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read(|s| s.token.clone()))
    }

    fn clear_token(&self) -> Result<(), StoreError> {
        self.update(|s| s.token = None)
    }

    fn clear_actor_name(&self) -> Result<(), StoreError> {
        self.update(|s| s.actor_name = None)
    }

    fn device_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read(|s| s.device_id.clone()))
    }

    fn save_device_id(&self, device_id: &str) -> Result<(), StoreError> {
        self.update(|s| s.device_id = Some(device_id.to_string()))
    }

    fn internet_resource_state(&self) -> Result<ResourceEnablement, StoreError> {
        Ok(self.read(|s| s.internet_resource))
    }

    fn save_internet_resource_state(&self, state: ResourceEnablement) -> Result<(), StoreError> {
        self.update(|s| s.internet_resource = state)
    }
}
