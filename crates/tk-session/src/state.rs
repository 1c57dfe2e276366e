//! Session state
//!
//! The mutable record of one engine session. Owned by the coordinator task
//! and never shared; sinks receive [`SessionSnapshot`]s.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tk_core::{
    compute_disabled_set, Cidr, Resource, ResourceEnablement, ResourceId, SessionPhase,
    TunnelTopology,
};

use crate::interface::AppRules;

/// State of the running session
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: SessionPhase,
    topology: Option<TunnelTopology>,
    resources: Vec<Resource>,
    enablement: ResourceEnablement,
    app_rules: AppRules,
}

/// Read-only copy of the observable parts of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current phase
    pub phase: SessionPhase,
    /// Last applied topology
    pub topology: Option<TunnelTopology>,
    /// Current resource list
    pub resources: Vec<Resource>,
    /// Enablement of the internet resource
    pub enablement: ResourceEnablement,
}

impl SessionState {
    /// Create the state of a session that is starting to connect
    pub fn new(enablement: ResourceEnablement, app_rules: AppRules) -> Self {
        Self {
            phase: SessionPhase::Connecting,
            topology: None,
            resources: Vec::new(),
            enablement,
            app_rules,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn topology(&self) -> Option<&TunnelTopology> {
        self.topology.as_ref()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn enablement(&self) -> ResourceEnablement {
        self.enablement
    }

    pub fn app_rules(&self) -> &AppRules {
        &self.app_rules
    }

    /// Move to `next` if that is a legal forward transition.
    ///
    /// Returns whether the phase changed.
    pub fn transition(&mut self, next: SessionPhase) -> bool {
        if !self.phase.can_transition_to(next) {
            tracing::warn!("Ignoring phase transition {} -> {}", self.phase, next);
            return false;
        }
        let changed = self.phase != next;
        self.phase = next;
        changed
    }

    /// Replace the resource list wholesale
    pub fn replace_resources(&mut self, resources: Vec<Resource>) {
        self.resources = resources;
    }

    /// Replace the topology wholesale.
    ///
    /// IPv4 and IPv6 routes are concatenated in that order, never merged.
    pub fn apply_topology(
        &mut self,
        ipv4: Ipv4Addr,
        ipv6: Ipv6Addr,
        dns_servers: Vec<IpAddr>,
        search_domain: Option<String>,
        ipv4_routes: Vec<Cidr>,
        ipv6_routes: Vec<Cidr>,
    ) -> &TunnelTopology {
        let mut routes = ipv4_routes;
        routes.extend(ipv6_routes);

        self.topology.insert(TunnelTopology {
            ipv4,
            ipv6,
            dns_servers,
            search_domain,
            routes,
        })
    }

    pub fn set_enablement(&mut self, enablement: ResourceEnablement) {
        self.enablement = enablement;
    }

    pub fn set_app_rules(&mut self, rules: AppRules) {
        self.app_rules = rules;
    }

    /// Disabled-resource set derived from the current resources and enablement
    pub fn disabled_resources(&self) -> BTreeSet<ResourceId> {
        compute_disabled_set(&self.resources, self.enablement)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            topology: self.topology.clone(),
            resources: self.resources.clone(),
            enablement: self.enablement,
        }
    }
}
