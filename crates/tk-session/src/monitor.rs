//! Session monitors
//!
//! Monitors watch the platform while a session runs and turn what they see
//! into commands. They are started after the engine session is up and
//! stopped when the coordinator loop exits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::command::{Command, CommandQueue};

/// Reason passed to the engine when the underlying network changes
pub const ROAM_REASON: &str = "roam";

/// Platform watcher bound to the lifetime of a session
pub trait SessionMonitor: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Start forwarding observations to `commands`
    fn start(&self, commands: CommandQueue);

    /// Stop forwarding; idempotent
    fn stop(&self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct LinkState {
    commands: Option<CommandQueue>,
    network: Option<u64>,
    dns_servers: Option<Vec<String>>,
}

/// Watches the default network.
///
/// A change of upstream DNS servers becomes [`Command::SetDns`]; a change of
/// the network itself becomes [`Command::Reset`] so the engine reconnects
/// over the new path.
#[derive(Debug, Default)]
pub struct ConnectivityMonitor {
    state: Mutex<LinkState>,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the current default network and its DNS servers
    pub fn on_link_changed(&self, network: u64, dns_servers: Vec<String>) {
        let mut state = lock(&self.state);
        let Some(commands) = state.commands.clone() else {
            tracing::debug!("Connectivity monitor not started, ignoring link change");
            return;
        };

        if state.dns_servers.as_ref() != Some(&dns_servers) {
            tracing::info!("Upstream DNS servers changed: {:?}", dns_servers);
            state.dns_servers = Some(dns_servers.clone());
            commands.enqueue(Command::SetDns(dns_servers));
        }

        if state.network != Some(network) {
            tracing::info!("Default network changed to {}", network);
            state.network = Some(network);
            commands.enqueue(Command::Reset(ROAM_REASON.to_string()));
        }
    }
}

impl SessionMonitor for ConnectivityMonitor {
    fn name(&self) -> &'static str {
        "connectivity"
    }

    fn start(&self, commands: CommandQueue) {
        let mut state = lock(&self.state);
        *state = LinkState {
            commands: Some(commands),
            ..LinkState::default()
        };
    }

    fn stop(&self) {
        lock(&self.state).commands = None;
    }
}

/// Watches for the OS revoking the tunnel and asks the engine to disconnect
#[derive(Debug, Default)]
pub struct DisconnectMonitor {
    commands: Mutex<Option<CommandQueue>>,
}

impl DisconnectMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The OS took the tunnel away
    pub fn on_tunnel_revoked(&self) {
        match lock(&self.commands).as_ref() {
            Some(commands) => {
                tracing::warn!("Tunnel revoked by the system, disconnecting");
                commands.enqueue(Command::Disconnect);
            }
            None => tracing::debug!("Disconnect monitor not started, ignoring revocation"),
        }
    }
}

impl SessionMonitor for DisconnectMonitor {
    fn name(&self) -> &'static str {
        "disconnect"
    }

    fn start(&self, commands: CommandQueue) {
        *lock(&self.commands) = Some(commands);
    }

    fn stop(&self) {
        lock(&self.commands).take();
    }
}

/// The monitors started and stopped together with a session
#[derive(Clone, Default)]
pub struct MonitorSet {
    monitors: Vec<Arc<dyn SessionMonitor>>,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, monitor: Arc<dyn SessionMonitor>) {
        self.monitors.push(monitor);
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn start_all(&self, commands: &CommandQueue) {
        for monitor in &self.monitors {
            tracing::debug!("Starting {} monitor", monitor.name());
            monitor.start(commands.clone());
        }
    }

    pub fn stop_all(&self) {
        for monitor in &self.monitors {
            tracing::debug!("Stopping {} monitor", monitor.name());
            monitor.stop();
        }
    }
}
