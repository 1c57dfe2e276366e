//! Replay engine
//!
//! A [`TunnelEngine`] that plays back engine events recorded as JSON lines
//! and logs every command it receives. Used by `tk-client` to exercise the
//! coordinator without a real tunnel.
//!
//! ```text
//! {"type":"resources_updated","resources":"[]"}
//! {"type":"disconnected","error":null}
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tk_core::error::EngineError;
use tk_core::traits::{ConnectParams, EngineSession, RawEvent, TunnelEngine};
use tk_core::TunDescriptor;

/// Parse recorded events, one JSON object per line.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_events(content: &str) -> Result<Vec<RawEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid event on line {}", index + 1))
        })
        .collect()
}

/// Engine that replays a fixed list of events
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    events: Vec<RawEvent>,
    hold_open: bool,
}

impl ReplayEngine {
    /// Replay `events`, then end the stream
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self {
            events,
            hold_open: false,
        }
    }

    /// Load events from a JSON lines file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read events from {:?}", path))?;
        Ok(Self::new(parse_events(&content)?))
    }

    /// Keep the stream open after the last event until a disconnect
    pub fn hold_open(mut self, hold_open: bool) -> Self {
        self.hold_open = hold_open;
        self
    }
}

#[async_trait]
impl TunnelEngine for ReplayEngine {
    type Session = ReplaySession;

    async fn connect(&self, params: ConnectParams) -> Result<ReplaySession, EngineError> {
        tracing::info!("Replay engine connecting: {:?}", params);
        Ok(ReplaySession {
            events: Mutex::new(self.events.iter().cloned().collect()),
            hold_open: self.hold_open,
            closed: CancellationToken::new(),
        })
    }
}

/// Session produced by [`ReplayEngine`]
#[derive(Debug)]
pub struct ReplaySession {
    events: Mutex<VecDeque<RawEvent>>,
    hold_open: bool,
    closed: CancellationToken,
}

impl ReplaySession {
    fn ensure_open(&self, command: &'static str) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        tracing::trace!("Replay engine accepted {}", command);
        Ok(())
    }
}

#[async_trait]
impl EngineSession for ReplaySession {
    async fn next_event(&self) -> Option<RawEvent> {
        if self.closed.is_cancelled() {
            return None;
        }

        let next = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if next.is_some() || !self.hold_open {
            return next;
        }

        self.closed.cancelled().await;
        None
    }

    fn disconnect(&self) -> Result<(), EngineError> {
        tracing::info!("Replay engine: disconnect");
        self.closed.cancel();
        Ok(())
    }

    fn set_disabled_resources(&self, disabled_resources: &str) -> Result<(), EngineError> {
        self.ensure_open("set_disabled_resources")?;
        tracing::info!("Replay engine: disabled resources {}", disabled_resources);
        Ok(())
    }

    fn set_dns(&self, dns_servers: &str) -> Result<(), EngineError> {
        self.ensure_open("set_dns")?;
        tracing::info!("Replay engine: DNS servers {}", dns_servers);
        Ok(())
    }

    fn set_log_directives(&self, directives: &str) -> Result<(), EngineError> {
        self.ensure_open("set_log_directives")?;
        tracing::info!("Replay engine: log directives {}", directives);
        Ok(())
    }

    fn set_tun(&self, descriptor: TunDescriptor) -> Result<(), EngineError> {
        self.ensure_open("set_tun")?;
        tracing::info!("Replay engine: tunnel interface {}", descriptor);
        Ok(())
    }

    fn reset(&self, reason: &str) -> Result<(), EngineError> {
        self.ensure_open("reset")?;
        tracing::info!("Replay engine: reset ({})", reason);
        Ok(())
    }
}
