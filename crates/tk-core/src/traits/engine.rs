//! Tunnel engine traits
//!
//! The engine is opaque: it performs the actual tunneling, emits events
//! whose payloads are JSON documents it owns, and accepts a small set of
//! commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::EngineError;
use crate::types::TunDescriptor;

/// Excludes the engine's own sockets from the tunnel
pub trait SocketProtector: Send + Sync {
    /// Protect a socket; returns false if the platform refused
    fn protect(&self, fd: i32) -> bool;
}

/// Protector for platforms where sockets never route through the tunnel
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProtector;

impl SocketProtector for NoopProtector {
    fn protect(&self, _fd: i32) -> bool {
        true
    }
}

/// Device metadata forwarded to the control plane
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Push-notification installation ID, if the platform has one
    pub installation_id: Option<String>,
}

/// Everything the engine needs to open a session
pub struct ConnectParams {
    /// Control plane URL
    pub api_url: String,
    /// Authentication token
    pub token: String,
    /// Account slug
    pub account_slug: String,
    /// Stable device identifier
    pub device_id: String,
    /// Human-readable device name
    pub device_name: String,
    /// OS name and version
    pub platform_info: String,
    /// Directory for engine logs
    pub log_dir: PathBuf,
    /// Initial engine log filter
    pub log_filter: String,
    /// Socket protector for engine sockets
    pub socket_protector: Arc<dyn SocketProtector>,
    /// Serialized [`DeviceInfo`]
    pub device_info: String,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("account_slug", &self.account_slug)
            .field("device_id", &self.device_id)
            .field("device_name", &self.device_name)
            .field("platform_info", &self.platform_info)
            .field("log_dir", &self.log_dir)
            .field("log_filter", &self.log_filter)
            .field("device_info", &self.device_info)
            .finish_non_exhaustive()
    }
}

/// An event as the engine emits it, with JSON-encoded payload fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    /// Complete resource list (JSON array)
    ResourcesUpdated { resources: String },

    /// New interface shape
    TunInterfaceUpdated {
        ipv4: String,
        ipv6: String,
        /// JSON array of DNS server addresses
        dns: String,
        search_domain: Option<String>,
        /// JSON array of `{address, prefix}`
        ipv4_routes: String,
        /// JSON array of `{address, prefix}`
        ipv6_routes: String,
    },

    /// The engine ended the session
    Disconnected {
        error: Option<String>,
        #[serde(default)]
        authentication: bool,
    },
}

/// Opens engine sessions
#[async_trait]
pub trait TunnelEngine: Send + Sync {
    /// The session type produced by this engine
    type Session: EngineSession;

    /// Open a new session
    async fn connect(&self, params: ConnectParams) -> Result<Self::Session, EngineError>;
}

/// A live engine session.
///
/// `next_event` is polled from a dedicated task while the command methods
/// are called from the coordinator loop, so implementations must tolerate
/// both concurrently.
#[async_trait]
pub trait EngineSession: Send + Sync + 'static {
    /// Wait for the next event; `None` once the event stream has ended
    async fn next_event(&self) -> Option<RawEvent>;

    /// Ask the engine to end the session
    fn disconnect(&self) -> Result<(), EngineError>;

    /// Replace the disabled-resource set (JSON array of IDs)
    fn set_disabled_resources(&self, disabled_resources: &str) -> Result<(), EngineError>;

    /// Replace the upstream DNS servers (JSON array of addresses)
    fn set_dns(&self, dns_servers: &str) -> Result<(), EngineError>;

    /// Replace the engine's log directives
    fn set_log_directives(&self, directives: &str) -> Result<(), EngineError>;

    /// Hand over a freshly established tunnel interface
    fn set_tun(&self, descriptor: TunDescriptor) -> Result<(), EngineError>;

    /// Force the engine to reconnect (network roam)
    fn reset(&self, reason: &str) -> Result<(), EngineError>;
}
