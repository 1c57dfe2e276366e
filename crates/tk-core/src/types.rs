//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Opaque identifier of a resource, unique within one resource list
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Create a new resource ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of a resource.
///
/// The engine reports a `type` per resource (`dns`, `cidr`, `ip`, `internet`).
/// Only the internet catch-all is treated specially; every other type is
/// a normal routable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// The "route all internet traffic" resource
    Internet,
    /// Any other routable destination
    #[serde(other)]
    Normal,
}

/// A routable destination exposed by the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique identifier
    pub id: ResourceId,
    /// Display name
    pub name: String,
    /// Resource kind
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// Address as shown to the user, if the engine provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Resource {
    /// Create a normal resource
    pub fn new(id: impl Into<ResourceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ResourceKind::Normal,
            address: None,
        }
    }

    /// Create the internet catch-all resource
    pub fn internet(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            name: "Internet".to_string(),
            kind: ResourceKind::Internet,
            address: None,
        }
    }

    /// Whether this is the internet catch-all resource
    pub fn is_internet(&self) -> bool {
        self.kind == ResourceKind::Internet
    }
}

/// Coarse session lifecycle marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Engine session opened, no interface applied yet
    Connecting,
    /// Interface configuration applied
    Up,
    /// No session; initial and terminal state of every attempt
    #[default]
    Down,
}

impl SessionPhase {
    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// Re-entering the current phase is allowed for `Connecting` and `Up`
    /// (a second topology update keeps the session `Up`). Nothing leaves
    /// `Down`; a new attempt starts from a fresh session.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        matches!(
            (self, next),
            (SessionPhase::Connecting, _) | (SessionPhase::Up, SessionPhase::Up | SessionPhase::Down)
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Connecting => write!(f, "connecting"),
            SessionPhase::Up => write!(f, "up"),
            SessionPhase::Down => write!(f, "down"),
        }
    }
}

/// User preference for the internet catch-all resource.
///
/// Persisted across sessions by the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceEnablement {
    /// User never toggled the resource
    #[default]
    Unset,
    /// Explicitly enabled
    Enabled,
    /// Explicitly disabled
    Disabled,
}

impl ResourceEnablement {
    /// Whether the user explicitly disabled the resource
    pub fn is_disabled(self) -> bool {
        self == ResourceEnablement::Disabled
    }
}

/// An IP network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CidrRepr")]
pub struct Cidr {
    /// Network address
    pub address: IpAddr,
    /// Prefix length
    pub prefix: u8,
}

#[derive(Deserialize)]
struct CidrRepr {
    address: IpAddr,
    prefix: u8,
}

impl TryFrom<CidrRepr> for Cidr {
    type Error = String;

    fn try_from(repr: CidrRepr) -> Result<Self, Self::Error> {
        Cidr::new(repr.address, repr.prefix)
    }
}

impl Cidr {
    /// Create a new CIDR, validating the prefix length against the address family
    pub fn new(address: IpAddr, prefix: u8) -> Result<Self, String> {
        let max = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(format!(
                "prefix length {} is invalid for {} (max {})",
                prefix, address, max
            ));
        }
        Ok(Self { address, prefix })
    }

    /// Host route for a single IPv4 address
    pub fn host_v4(address: Ipv4Addr) -> Self {
        Self {
            address: IpAddr::V4(address),
            prefix: 32,
        }
    }

    /// Host route for a single IPv6 address
    pub fn host_v6(address: Ipv6Addr) -> Self {
        Self {
            address: IpAddr::V6(address),
            prefix: 128,
        }
    }

    /// Whether this network covers the whole address family (`0.0.0.0/0` or `::/0`)
    pub fn is_default_route(&self) -> bool {
        self.prefix == 0
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("missing prefix length in {:?}", s))?;
        let address: IpAddr = address
            .parse()
            .map_err(|e| format!("invalid address in {:?}: {}", s, e))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| format!("invalid prefix in {:?}: {}", s, e))?;
        Cidr::new(address, prefix)
    }
}

/// Network shape of the tunnel as last reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelTopology {
    /// Tunnel IPv4 address
    pub ipv4: Ipv4Addr,
    /// Tunnel IPv6 address
    pub ipv6: Ipv6Addr,
    /// DNS servers, in priority order
    pub dns_servers: Vec<IpAddr>,
    /// Search domain, if any
    pub search_domain: Option<String>,
    /// IPv4 routes followed by IPv6 routes
    pub routes: Vec<Cidr>,
}

impl TunnelTopology {
    /// Whether any route covers a whole address family
    pub fn has_default_route(&self) -> bool {
        self.routes.iter().any(Cidr::is_default_route)
    }
}

/// Raw OS descriptor of an established tunnel interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunDescriptor(pub i32);

impl TunDescriptor {
    /// Get the raw descriptor value
    pub fn as_raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for TunDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_from_engine_types() {
        let json = r#"[
            {"id": "r1", "name": "Wiki", "type": "dns", "address": "wiki.corp"},
            {"id": "r2", "name": "Lab", "type": "cidr"},
            {"id": "internet", "name": "Internet", "type": "internet"}
        ]"#;
        let resources: Vec<Resource> = serde_json::from_str(json).unwrap();

        assert_eq!(resources[0].kind, ResourceKind::Normal);
        assert_eq!(resources[0].address.as_deref(), Some("wiki.corp"));
        assert_eq!(resources[1].kind, ResourceKind::Normal);
        assert!(resources[2].is_internet());
    }

    #[test]
    fn test_phase_transitions() {
        assert!(SessionPhase::Connecting.can_transition_to(SessionPhase::Up));
        assert!(SessionPhase::Connecting.can_transition_to(SessionPhase::Down));
        assert!(SessionPhase::Up.can_transition_to(SessionPhase::Down));
        assert!(SessionPhase::Up.can_transition_to(SessionPhase::Up));
        assert!(!SessionPhase::Up.can_transition_to(SessionPhase::Connecting));
        assert!(!SessionPhase::Down.can_transition_to(SessionPhase::Up));
        assert!(!SessionPhase::Down.can_transition_to(SessionPhase::Connecting));
    }

    #[test]
    fn test_cidr_parse_and_display() {
        let cidr: Cidr = "10.0.0.0/8".parse().unwrap();
        assert_eq!(cidr.prefix, 8);
        assert_eq!(cidr.to_string(), "10.0.0.0/8");

        let v6: Cidr = "::/0".parse().unwrap();
        assert!(v6.is_default_route());
    }

    #[test]
    fn test_cidr_rejects_oversized_prefix() {
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("fd00::/129".parse::<Cidr>().is_err());
        assert!(serde_json::from_str::<Cidr>(r#"{"address":"1.2.3.4","prefix":40}"#).is_err());
    }

    #[test]
    fn test_topology_default_route() {
        let mut topology = TunnelTopology {
            ipv4: Ipv4Addr::new(100, 64, 0, 1),
            ipv6: "fd00::1".parse().unwrap(),
            dns_servers: vec![],
            search_domain: None,
            routes: vec!["10.0.0.0/8".parse().unwrap()],
        };
        assert!(!topology.has_default_route());

        topology.routes.push("::/0".parse().unwrap());
        assert!(topology.has_default_route());
    }

    #[test]
    fn test_enablement_default_is_unset() {
        assert_eq!(ResourceEnablement::default(), ResourceEnablement::Unset);
        assert!(!ResourceEnablement::Unset.is_disabled());
        assert!(ResourceEnablement::Disabled.is_disabled());
    }
}
