//! tunnelkeeper client
//!
//! Runs one tunnel session against a replay engine: engine events are read
//! from a JSON lines file, interface configurations are logged instead of
//! committed, and Ctrl+C asks the session to disconnect.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tk_core::config::{self, ClientConfig};
use tk_core::error::ProvisionError;
use tk_core::store::{default_store_path, FileStore};
use tk_core::traits::{SessionSink, StatusNotification};
use tk_core::{Resource, SessionPhase, TunDescriptor};
use tk_session::interface::{InterfaceConfig, InterfaceProvisioner};
use tk_session::monitor::DisconnectMonitor;
use tk_session::replay::ReplayEngine;
use tk_session::{Collaborators, TunnelService};

#[derive(Parser)]
#[command(name = "tk-client")]
#[command(about = "tunnelkeeper client - runs a tunnel session from recorded engine events")]
#[command(version)]
struct Args {
    /// JSON lines file of engine events to replay
    #[arg(short, long)]
    events: PathBuf,

    /// Authentication token (overrides configuration and stored token)
    #[arg(long, env = "TK_TOKEN")]
    token: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the settings store
    #[arg(long)]
    state: Option<PathBuf>,

    /// Keep the session open after the last event until Ctrl+C
    #[arg(long)]
    hold_open: bool,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Provisioner that logs the interface instead of creating one
#[derive(Debug)]
struct DryRunProvisioner {
    next: AtomicI32,
}

impl Default for DryRunProvisioner {
    fn default() -> Self {
        Self {
            next: AtomicI32::new(100),
        }
    }
}

impl InterfaceProvisioner for DryRunProvisioner {
    fn establish(&self, config: &InterfaceConfig) -> Result<TunDescriptor, ProvisionError> {
        let descriptor = TunDescriptor(self.next.fetch_add(1, Ordering::SeqCst));
        tracing::info!(
            "[dry-run] {} mtu={} bypass={} addresses={:?} routes={:?} dns={:?} -> {}",
            config.session_name,
            config.mtu,
            config.allow_bypass,
            config.addresses.iter().map(ToString::to_string).collect::<Vec<_>>(),
            config.routes.iter().map(ToString::to_string).collect::<Vec<_>>(),
            config.dns_servers,
            descriptor
        );
        Ok(descriptor)
    }
}

/// Sink that writes session updates to the log
struct LogSink;

impl SessionSink for LogSink {
    fn on_phase(&self, phase: SessionPhase) {
        tracing::info!("Session phase: {}", phase);
    }

    fn on_resources(&self, resources: &[Resource]) {
        tracing::info!("{} resources available", resources.len());
        for resource in resources {
            tracing::debug!(
                "  {} ({}) {}",
                resource.name,
                resource.id,
                resource.address.as_deref().unwrap_or("-")
            );
        }
    }

    fn on_status(&self, status: StatusNotification) {
        tracing::info!("Status: {:?}", status);
    }

    fn on_session_ended(&self) {
        tracing::info!("Session ended");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("tunnelkeeper client starting...");

    // Load configuration
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = config::load_client_config(&config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {:?}: {}", config_path, e);
        ClientConfig::default()
    });
    if let Some(token) = args.token {
        config.token = Some(token);
    }

    let state_path = args.state.unwrap_or_else(default_store_path);
    let store = FileStore::open(&state_path)
        .with_context(|| format!("Failed to open settings store {:?}", state_path))?;

    let engine = ReplayEngine::from_path(&args.events)?.hold_open(args.hold_open);
    let collaborators = Collaborators {
        provisioner: Arc::new(DryRunProvisioner::default()),
        store: Arc::new(store),
        sink: Arc::new(LogSink),
    };
    let revocation = Arc::new(DisconnectMonitor::new());
    let service = TunnelService::new(engine, config, collaborators).with_monitor(revocation.clone());

    let handle = service
        .connect(true)
        .await
        .context("Failed to start session")?;

    // Ctrl+C behaves like the system revoking the tunnel
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            revocation.on_tunnel_revoked();
        }
    });

    let outcome = handle.join().await.context("Session task failed")?;
    ctrl_c.abort();

    tracing::info!(
        "Session finished ({:?}) with {} resources",
        outcome.exit,
        outcome.snapshot.resources.len()
    );

    Ok(())
}
