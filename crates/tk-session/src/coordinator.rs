//! Coordinator loop
//!
//! The single task that owns a session. Each iteration waits for whichever
//! comes first, the next [`Command`] or the next [`Event`], and applies it to
//! the [`SessionState`]. Side effects go to the engine session, the
//! interface provisioner, the settings store and the UI sink.
//!
//! # Failure model
//!
//! A command the engine rejects or an event that fails to decode is logged
//! and skipped; the loop keeps running. Only these end it:
//! - a `Disconnected` event
//! - the end of the engine's event stream
//! - the command queue being closed
//! - cancellation of the owning scope

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tk_core::error::EngineError;
use tk_core::traits::{EngineSession, SessionSink, SettingsStore, StatusNotification};
use tk_core::{SessionPhase, TkError};

use crate::command::{Command, CommandQueue, CommandReceiver};
use crate::events::{Event, EventSource};
use crate::interface::{InterfaceBuilder, InterfaceProvisioner};
use crate::state::{SessionSnapshot, SessionState};

/// Why the coordinator loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The engine reported `Disconnected`
    Disconnected,
    /// The engine's event stream ended
    StreamEnded,
    /// The command queue was closed underneath the loop
    QueueClosed,
    /// The owning scope was cancelled
    Cancelled,
}

/// Whether the loop keeps going after an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit(LoopExit),
}

/// Final result of a session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Why the loop stopped
    pub exit: LoopExit,
    /// Session state at exit; its phase is always `Down`
    pub snapshot: SessionSnapshot,
}

/// External collaborators the coordinator pushes side effects to
#[derive(Clone)]
pub struct Collaborators {
    /// Commits interface configurations to the OS
    pub provisioner: Arc<dyn InterfaceProvisioner>,
    /// Persistent settings
    pub store: Arc<dyn SettingsStore>,
    /// UI and notification sink
    pub sink: Arc<dyn SessionSink>,
}

/// Drives one engine session
pub struct Coordinator<S: EngineSession + ?Sized> {
    engine: Arc<S>,
    state: SessionState,
    commands: CommandQueue,
    builder: InterfaceBuilder,
    collaborators: Collaborators,
}

impl<S: EngineSession + ?Sized> Coordinator<S> {
    /// Create a coordinator.
    ///
    /// `commands` must be the queue whose receiver is later passed to
    /// [`run`](Self::run); the coordinator feeds follow-up commands
    /// (disabled resources, new descriptors) back through it.
    pub fn new(
        engine: Arc<S>,
        state: SessionState,
        commands: CommandQueue,
        builder: InterfaceBuilder,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            engine,
            state,
            commands,
            builder,
            collaborators,
        }
    }

    /// Run until a terminal condition, then force the phase to `Down`
    pub async fn run(
        mut self,
        mut commands: CommandReceiver,
        mut events: EventSource,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        tracing::info!("Coordinator loop started");

        let exit = loop {
            let control = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::warn!("Command queue closed");
                        LoopControl::Exit(LoopExit::QueueClosed)
                    }
                },

                item = events.next() => match item {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => {
                        tracing::warn!("Skipping engine event: {}", e);
                        LoopControl::Continue
                    }
                    None => LoopControl::Exit(LoopExit::StreamEnded),
                },

                _ = cancel.cancelled() => LoopControl::Exit(LoopExit::Cancelled),
            };

            match control {
                LoopControl::Continue => {}
                // Cancellation also stops the poller, which ends the stream
                LoopControl::Exit(LoopExit::Cancelled | LoopExit::StreamEnded)
                    if cancel.is_cancelled() =>
                {
                    tracing::info!("Session cancelled");
                    break LoopExit::Cancelled;
                }
                LoopControl::Exit(exit) => break exit,
            }
        };

        self.finish(exit)
    }

    /// Apply one command.
    ///
    /// Engine failures are logged; a command never stops the loop.
    pub fn handle_command(&mut self, command: Command) -> LoopControl {
        let name = command.name();
        tracing::debug!("Handling command {}", name);

        if let Err(e) = self.apply_command(command) {
            tracing::error!("Failed to handle {}: {}", name, e);
        }
        LoopControl::Continue
    }

    fn apply_command(&mut self, command: Command) -> Result<(), TkError> {
        match command {
            // The engine answers with Disconnected or by ending the stream,
            // which is what stops the loop.
            Command::Disconnect => self.engine.disconnect()?,

            Command::SetDisabledResources(disabled) => {
                let json = serde_json::to_string(&disabled).map_err(EngineError::from)?;
                self.engine.set_disabled_resources(&json)?;
            }

            Command::SetDns(servers) => {
                let json = serde_json::to_string(&servers).map_err(EngineError::from)?;
                self.engine.set_dns(&json)?;
            }

            Command::SetLogDirectives(directives) => {
                self.engine.set_log_directives(&directives)?;
            }

            Command::SetTunDescriptor(descriptor) => self.engine.set_tun(descriptor)?,

            Command::Reset(reason) => self.engine.reset(&reason)?,

            Command::SetEnablement(enablement) => {
                self.state.set_enablement(enablement);
                self.push_disabled_resources();
            }

            Command::UpdateAppRules(rules) => {
                if rules == *self.state.app_rules() {
                    tracing::debug!("Application rules unchanged");
                    return Ok(());
                }
                self.state.set_app_rules(rules);
                self.provision_interface();
            }
        }
        Ok(())
    }

    /// Apply one event
    pub fn handle_event(&mut self, event: Event) -> LoopControl {
        tracing::debug!("Handling event {}", event.name());

        match event {
            Event::ResourcesUpdated(resources) => {
                tracing::info!("Resource list updated ({} resources)", resources.len());
                self.state.replace_resources(resources);
                self.push_disabled_resources();
                self.collaborators.sink.on_resources(self.state.resources());
                LoopControl::Continue
            }

            Event::TunInterfaceUpdated {
                ipv4,
                ipv6,
                dns,
                search_domain,
                ipv4_routes,
                ipv6_routes,
            } => {
                let topology = self.state.apply_topology(
                    ipv4,
                    ipv6,
                    dns,
                    search_domain,
                    ipv4_routes,
                    ipv6_routes,
                );
                tracing::info!(
                    "Tunnel interface updated: {} / {}, {} routes",
                    topology.ipv4,
                    topology.ipv6,
                    topology.routes.len()
                );
                self.provision_interface();
                LoopControl::Continue
            }

            Event::Disconnected {
                error,
                authentication,
            } => {
                match error {
                    Some(message) if authentication => {
                        tracing::info!("Disconnected: {}", message);
                    }
                    Some(message) => tracing::error!("Disconnected: {}", message),
                    None => tracing::info!("Disconnected by engine"),
                }
                self.clear_identity();
                LoopControl::Exit(LoopExit::Disconnected)
            }

            Event::StreamEnded => {
                tracing::info!("Engine event stream ended");
                LoopControl::Exit(LoopExit::StreamEnded)
            }
        }
    }

    /// Recompute the overlay and queue it for the engine
    fn push_disabled_resources(&self) {
        let disabled = self.state.disabled_resources();
        tracing::debug!("Disabled resources: {:?}", disabled);
        self.commands.enqueue(Command::SetDisabledResources(disabled));
    }

    /// Build the interface from the current topology and commit it.
    ///
    /// The new descriptor re-enters through the command queue. The first
    /// successful commit moves the session to `Up`.
    fn provision_interface(&mut self) {
        let Some(topology) = self.state.topology() else {
            tracing::debug!("No topology yet, not provisioning");
            return;
        };
        let config = self.builder.build(topology, self.state.app_rules());
        tracing::debug!(
            "Interface config: bypass={}, {} disallowed apps",
            config.allow_bypass,
            config.disallowed_applications.len()
        );

        match self.collaborators.provisioner.establish(&config) {
            Ok(descriptor) => {
                tracing::info!("Tunnel interface established ({})", descriptor);
                self.commands.enqueue(Command::SetTunDescriptor(descriptor));

                if self.state.transition(SessionPhase::Up) {
                    self.collaborators.sink.on_phase(SessionPhase::Up);
                    self.collaborators
                        .sink
                        .on_status(StatusNotification::Connected);
                }
            }
            Err(e) => {
                tracing::error!("Failed to establish tunnel interface: {}", e);
                self.collaborators
                    .sink
                    .on_status(StatusNotification::ConnectionFailed {
                        message: e.to_string(),
                    });
            }
        }
    }

    fn clear_identity(&self) {
        let store = &self.collaborators.store;
        if let Err(e) = store.clear_token() {
            tracing::error!("Failed to clear token: {}", e);
        }
        if let Err(e) = store.clear_actor_name() {
            tracing::error!("Failed to clear actor name: {}", e);
        }
    }

    fn finish(mut self, exit: LoopExit) -> SessionOutcome {
        if self.state.transition(SessionPhase::Down) {
            self.collaborators.sink.on_phase(SessionPhase::Down);
        }
        tracing::info!("Coordinator loop finished: {:?}", exit);

        SessionOutcome {
            exit,
            snapshot: self.state.snapshot(),
        }
    }
}
