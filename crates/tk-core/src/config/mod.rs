//! Configuration management for tunnelkeeper
//!
//! Configuration is TOML. A missing client configuration is not an error:
//! every field has a default.

mod client;

pub use client::ClientConfig;

use crate::error::ConfigError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunnelkeeper")
}

/// Get the default client configuration path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("client.toml")
}

/// Load configuration from a TOML file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::Invalid(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    Ok(toml::from_str(&content)?)
}

/// Load the client configuration, using defaults if the file does not exist
pub fn load_client_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match load_config(path) {
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(ClientConfig::default())
        }
        other => other,
    }
}

/// Save configuration to a TOML file.
///
/// The file is written next to its destination and renamed into place, so
/// readers never observe a partial file.
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::Invalid(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let staging = path.with_extension("toml.tmp");
    std::fs::write(&staging, content)
        .and_then(|()| std::fs::rename(&staging, path))
        .map_err(|e| ConfigError::Invalid(format!("Failed to write {}: {}", path.display(), e)))
}
