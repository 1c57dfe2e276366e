//! Tunnel service
//!
//! Owns the lifecycle of engine sessions: reads credentials and persisted
//! settings, opens the engine session, wires the command queue, event
//! source and monitors to a [`Coordinator`], and tears everything down when
//! the coordinator exits. UI intents enter here and become commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use tk_core::config::ClientConfig;
use tk_core::error::{EngineError, SessionError};
use tk_core::store::ensure_device_id;
use tk_core::traits::{
    ConnectParams, DeviceInfo, NoopProtector, SessionSink, SettingsStore, SocketProtector,
    StatusNotification, TunnelEngine,
};
use tk_core::{ResourceEnablement, SessionPhase, TkError};

use crate::command::{Command, CommandQueue};
use crate::coordinator::{Collaborators, Coordinator, SessionOutcome};
use crate::events::EventSource;
use crate::interface::{AppRules, InterfaceBuilder, PlatformConstraints};
use crate::monitor::{MonitorSet, SessionMonitor};
use crate::state::SessionState;

/// Handle to a running session
pub struct SessionHandle {
    task: JoinHandle<SessionOutcome>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Cancel the session scope; the loop exits without waiting for the engine
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the coordinator task has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end
    pub async fn join(self) -> Result<SessionOutcome, JoinError> {
        self.task.await
    }
}

/// Work done after the coordinator loop exits
struct Teardown {
    commands: CommandQueue,
    monitors: MonitorSet,
    running: Arc<AtomicBool>,
    sink: Arc<dyn SessionSink>,
    started_by_user: bool,
}

impl Teardown {
    fn run(self) {
        self.commands.deactivate();
        if self.started_by_user {
            self.sink.on_status(StatusNotification::SignedOut);
        }
        self.monitors.stop_all();
        self.running.store(false, Ordering::SeqCst);
        self.sink.on_session_ended();
        tracing::info!("Session torn down");
    }
}

/// Entry point for starting sessions and forwarding UI intents
pub struct TunnelService<E: TunnelEngine> {
    engine: E,
    config: ClientConfig,
    collaborators: Collaborators,
    monitors: MonitorSet,
    commands: CommandQueue,
    running: Arc<AtomicBool>,
    app_rules: Mutex<AppRules>,
    device_info: DeviceInfo,
    protector: Arc<dyn SocketProtector>,
    shutdown: CancellationToken,
}

impl<E: TunnelEngine> TunnelService<E> {
    /// Create a service; application rules start from the configuration
    pub fn new(engine: E, config: ClientConfig, collaborators: Collaborators) -> Self {
        let app_rules = AppRules::from_config(&config);
        Self {
            engine,
            config,
            collaborators,
            monitors: MonitorSet::new(),
            commands: CommandQueue::new(),
            running: Arc::new(AtomicBool::new(false)),
            app_rules: Mutex::new(app_rules),
            device_info: DeviceInfo::default(),
            protector: Arc::new(NoopProtector),
            shutdown: CancellationToken::new(),
        }
    }

    /// Add a monitor bound to each session's lifetime
    pub fn with_monitor(mut self, monitor: Arc<dyn SessionMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }

    pub fn with_device_info(mut self, device_info: DeviceInfo) -> Self {
        self.device_info = device_info;
        self
    }

    pub fn with_socket_protector(mut self, protector: Arc<dyn SocketProtector>) -> Self {
        self.protector = protector;
        self
    }

    /// Handle to the command queue shared with the running session
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    /// Whether a coordinator loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a session.
    ///
    /// `started_by_user` controls whether a sign-out notification is shown
    /// when the session ends.
    pub async fn connect(&self, started_by_user: bool) -> Result<SessionHandle, TkError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyRunning.into());
        }

        match self.start_session(started_by_user).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn start_session(&self, started_by_user: bool) -> Result<SessionHandle, TkError> {
        let token = self.resolve_token()?;
        let sink = &self.collaborators.sink;

        sink.on_phase(SessionPhase::Connecting);
        sink.on_status(StatusNotification::Connecting);

        // Intents issued while the engine connects wait in the queue
        let receiver = self.commands.activate();

        let opened = async {
            let session = self.open_engine_session(token).await?;
            let enablement = self.collaborators.store.internet_resource_state()?;
            Ok::<_, TkError>((Arc::new(session), enablement))
        };
        let (session, enablement) = match opened.await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::error!("Failed to open engine session: {}", e);
                self.commands.deactivate();
                sink.on_phase(SessionPhase::Down);
                return Err(e);
            }
        };

        self.monitors.start_all(&self.commands);

        let cancel = self.shutdown.child_token();
        let events = EventSource::spawn(Arc::clone(&session), cancel.clone());
        let state = SessionState::new(enablement, self.app_rules().clone());
        let builder = InterfaceBuilder::new(PlatformConstraints {
            supports_metered: self.config.supports_metered,
        });
        let coordinator = Coordinator::new(
            session,
            state,
            self.commands.clone(),
            builder,
            self.collaborators.clone(),
        );

        let teardown = Teardown {
            commands: self.commands.clone(),
            monitors: self.monitors.clone(),
            running: Arc::clone(&self.running),
            sink: Arc::clone(sink),
            started_by_user,
        };

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = coordinator.run(receiver, events, loop_cancel.clone()).await;
            loop_cancel.cancel();
            teardown.run();
            outcome
        });

        Ok(SessionHandle { task, cancel })
    }

    fn resolve_token(&self) -> Result<String, TkError> {
        if let Some(token) = self.config.managed_token() {
            tracing::debug!("Using token from managed configuration");
            return Ok(token.to_string());
        }

        self.collaborators
            .store
            .token()?
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SessionError::MissingToken.into())
    }

    async fn open_engine_session(&self, token: String) -> Result<E::Session, TkError> {
        let device_id = ensure_device_id(self.collaborators.store.as_ref())?;
        tokio::fs::create_dir_all(&self.config.log_dir).await?;

        let params = ConnectParams {
            api_url: self.config.api_url.clone(),
            token,
            account_slug: self.config.account_slug.clone(),
            device_id,
            device_name: self.config.device_name(),
            platform_info: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            log_dir: self.config.log_dir.clone(),
            log_filter: self.config.log_filter.clone(),
            socket_protector: Arc::clone(&self.protector),
            device_info: serde_json::to_string(&self.device_info).map_err(EngineError::from)?,
        };

        tracing::info!("Connecting to {} as {}", params.api_url, params.device_name);
        Ok(self.engine.connect(params).await?)
    }

    fn app_rules(&self) -> MutexGuard<'_, AppRules> {
        self.app_rules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the running session to disconnect
    pub fn disconnect(&self) -> bool {
        self.commands.enqueue(Command::Disconnect)
    }

    /// Replace the engine's upstream DNS servers
    pub fn set_dns(&self, servers: Vec<String>) -> bool {
        self.commands.enqueue(Command::SetDns(servers))
    }

    /// Force the engine to reconnect
    pub fn reset(&self, reason: &str) -> bool {
        self.commands.enqueue(Command::Reset(reason.to_string()))
    }

    /// Replace the engine's log directives
    pub fn set_log_directives(&self, directives: &str) -> bool {
        self.commands
            .enqueue(Command::SetLogDirectives(directives.to_string()))
    }

    /// Persisted enablement of the internet resource
    pub fn internet_state(&self) -> ResourceEnablement {
        self.collaborators
            .store
            .internet_resource_state()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to read internet resource state: {}", e);
                ResourceEnablement::Unset
            })
    }

    /// The user toggled the internet resource.
    ///
    /// The new state is persisted first, then applied to the running session.
    pub fn internet_resource_toggled(&self, state: ResourceEnablement) -> Result<(), TkError> {
        self.collaborators
            .store
            .save_internet_resource_state(state)?;
        tracing::info!("Internet resource toggled: {:?}", state);
        self.commands.enqueue(Command::SetEnablement(state));
        Ok(())
    }

    /// Managed per-application rules changed.
    ///
    /// Returns whether the rules differ from the current ones. A running
    /// session rebuilds its interface.
    pub fn update_app_rules(&self, allowed: Option<&str>, disallowed: Option<&str>) -> bool {
        let rules = AppRules::from_managed(allowed, disallowed);
        {
            let mut current = self.app_rules();
            if *current == rules {
                return false;
            }
            *current = rules.clone();
        }

        tracing::info!("Application rules changed");
        self.commands.enqueue(Command::UpdateAppRules(rules));
        true
    }

    /// Cancel every session started by this service
    pub fn shutdown(&self) {
        tracing::info!("Shutting down tunnel service");
        self.shutdown.cancel();
    }
}
