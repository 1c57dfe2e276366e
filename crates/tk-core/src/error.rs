//! Core error types for tunnelkeeper

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the tunnelkeeper crates
#[derive(Error, Debug)]
pub enum TkError {
    /// Tunnel engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Malformed event from the engine
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Interface provisioning error
    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// Settings store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session lifecycle error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by the tunnel engine or while talking to it
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine could not open a session
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    /// A command payload could not be serialized
    #[error("Failed to serialize command payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The engine session is already closed
    #[error("Engine session closed")]
    Closed,
}

/// A single engine event that could not be decoded.
///
/// Never fatal to a session: the event is logged and skipped.
#[derive(Error, Debug)]
pub enum EventError {
    /// A JSON payload field did not match its schema
    #[error("Malformed {field} payload: {source}")]
    MalformedPayload {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// An address field did not parse
    #[error("Invalid {field} address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },
}

/// The OS refused the interface configuration
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The platform refused to establish the interface
    #[error("Interface establishment refused: {0}")]
    Refused(String),
}

/// Settings store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error reading or writing the store file
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// A coordinator loop is already running
    #[error("A session is already running")]
    AlreadyRunning,

    /// No token in managed configuration or store
    #[error("No token available")]
    MissingToken,
}
