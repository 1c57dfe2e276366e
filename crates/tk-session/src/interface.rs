//! Interface builder
//!
//! Translates the tunnel topology and per-application rules into the
//! configuration the OS needs to bring up the tunnel interface. Building is
//! pure; committing the result is the job of an [`InterfaceProvisioner`],
//! which returns the raw descriptor of the new interface.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use tk_core::config::ClientConfig;
use tk_core::error::ProvisionError;
use tk_core::{Cidr, TunDescriptor, TunnelTopology};

/// Session name shown by the OS for the tunnel interface
pub const SESSION_NAME: &str = "tunnelkeeper";

/// MTU of the tunnel interface
pub const MTU: u16 = 1280;

/// Packages that deliver push notifications.
///
/// Always excluded from the tunnel so wake-up signals keep arriving whatever
/// the tunnel state.
pub const PUSH_NOTIFICATION_PACKAGES: [&str; 3] = [
    "com.google.android.gms",
    "com.google.firebase.messaging",
    "com.google.android.gsf",
];

/// Per-application tunnel rules from managed configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRules {
    /// Applications routed through the tunnel
    pub allowed: Vec<String>,
    /// Applications that bypass the tunnel
    pub disallowed: Vec<String>,
}

impl AppRules {
    /// Parse the comma-separated lists used by managed configuration
    pub fn from_managed(allowed: Option<&str>, disallowed: Option<&str>) -> Self {
        Self {
            allowed: split_list(allowed),
            disallowed: split_list(disallowed),
        }
    }

    /// Rules configured in the client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::from_managed(
            config.allowed_applications.as_deref(),
            config.disallowed_applications.as_deref(),
        )
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Platform capabilities that affect the interface configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformConstraints {
    /// Whether metered status can be inherited from the underlying networks
    pub supports_metered: bool,
}

impl Default for PlatformConstraints {
    fn default() -> Self {
        Self {
            supports_metered: true,
        }
    }
}

/// Complete configuration of the tunnel interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    /// Session name shown by the OS
    pub session_name: String,
    /// Interface MTU
    pub mtu: u16,
    /// Leave metered status to the underlying networks
    pub inherit_metered: bool,
    /// Let other traffic bypass the tunnel (always-on mode)
    pub allow_bypass: bool,
    /// Use every available underlying network
    pub use_all_underlying_networks: bool,
    /// Applications routed through the tunnel
    pub allowed_applications: Vec<String>,
    /// Applications excluded from the tunnel
    pub disallowed_applications: Vec<String>,
    /// Interface addresses
    pub addresses: Vec<Cidr>,
    /// Routes, IPv4 first
    pub routes: Vec<Cidr>,
    /// DNS servers in priority order
    pub dns_servers: Vec<IpAddr>,
    /// Search domain
    pub search_domain: Option<String>,
}

/// Builds [`InterfaceConfig`]s for a given platform
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceBuilder {
    platform: PlatformConstraints,
}

impl InterfaceBuilder {
    /// Create a builder for the given platform
    pub fn new(platform: PlatformConstraints) -> Self {
        Self { platform }
    }

    /// Build the interface configuration.
    ///
    /// Bypass is only permitted while no route covers a whole address
    /// family: a full-route tunnel must not leak traffic around itself.
    pub fn build(&self, topology: &TunnelTopology, rules: &AppRules) -> InterfaceConfig {
        let mut disallowed: Vec<String> = Vec::new();
        for package in rules
            .disallowed
            .iter()
            .map(String::as_str)
            .chain(PUSH_NOTIFICATION_PACKAGES)
        {
            if !disallowed.iter().any(|p| p == package) {
                disallowed.push(package.to_string());
            }
        }

        InterfaceConfig {
            session_name: SESSION_NAME.to_string(),
            mtu: MTU,
            inherit_metered: self.platform.supports_metered,
            allow_bypass: !topology.has_default_route(),
            use_all_underlying_networks: true,
            allowed_applications: rules.allowed.clone(),
            disallowed_applications: disallowed,
            addresses: vec![Cidr::host_v4(topology.ipv4), Cidr::host_v6(topology.ipv6)],
            routes: topology.routes.clone(),
            dns_servers: topology.dns_servers.clone(),
            search_domain: topology.search_domain.clone(),
        }
    }
}

/// Commits interface configurations to the OS
pub trait InterfaceProvisioner: Send + Sync {
    /// Establish the interface and return its raw descriptor
    fn establish(&self, config: &InterfaceConfig) -> Result<TunDescriptor, ProvisionError>;
}
