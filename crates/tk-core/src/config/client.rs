//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the tunnel client.
///
/// Fields mirror what a managed (MDM) configuration may push: a token,
/// a device name and per-application tunnel rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Control plane URL handed to the engine
    pub api_url: String,

    /// Account the device signs in to
    pub account_slug: String,

    /// Managed token; takes precedence over the stored token
    pub token: Option<String>,

    /// Device name override (defaults to hostname)
    pub device_name: Option<String>,

    /// Engine log filter, in `EnvFilter` syntax
    pub log_filter: String,

    /// Directory the engine writes its logs to
    pub log_dir: PathBuf,

    /// Comma-separated applications that are routed through the tunnel
    pub allowed_applications: Option<String>,

    /// Comma-separated applications that bypass the tunnel
    pub disallowed_applications: Option<String>,

    /// Whether the platform can inherit metered status from underlying networks
    pub supports_metered: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "wss://localhost:8443".to_string(),
            account_slug: String::new(),
            token: None,
            device_name: None,
            log_filter: "info".to_string(),
            log_dir: super::default_config_dir().join("logs"),
            allowed_applications: None,
            disallowed_applications: None,
            supports_metered: true,
        }
    }
}

impl ClientConfig {
    /// Get the device name, falling back to the hostname.
    ///
    /// Managed configurations sometimes deliver the literal string `"null"`;
    /// that is treated as unset.
    pub fn device_name(&self) -> String {
        self.device_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != "null")
            .map(str::to_string)
            .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned())
    }

    /// Managed token, if one is configured and not blank
    pub fn managed_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_name_override() {
        let config = ClientConfig {
            device_name: Some("laptop-42".to_string()),
            ..ClientConfig::default()
        };
        assert_eq!(config.device_name(), "laptop-42");
    }

    #[test]
    fn test_device_name_null_falls_back_to_hostname() {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        for value in ["null", "", "   "] {
            let config = ClientConfig {
                device_name: Some(value.to_string()),
                ..ClientConfig::default()
            };
            assert_eq!(config.device_name(), hostname);
        }
    }

    #[test]
    fn test_managed_token_ignores_blank() {
        let mut config = ClientConfig::default();
        assert!(config.managed_token().is_none());

        config.token = Some("  ".to_string());
        assert!(config.managed_token().is_none());

        config.token = Some("secret".to_string());
        assert_eq!(config.managed_token(), Some("secret"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(r#"account_slug = "acme""#).unwrap();
        assert_eq!(config.account_slug, "acme");
        assert_eq!(config.log_filter, "info");
        assert!(config.supports_metered);
    }
}
