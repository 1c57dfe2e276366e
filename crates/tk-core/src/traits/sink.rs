//! UI and notification sink

use crate::types::{Resource, SessionPhase};

/// Status notification requested from the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusNotification {
    /// Session is being established
    Connecting,
    /// Interface is up
    Connected,
    /// Session ended after a user-initiated start
    SignedOut,
    /// The interface could not be provisioned
    ConnectionFailed { message: String },
}

/// Receives read-only snapshots of session state.
///
/// Called from the coordinator task; implementations must not block.
pub trait SessionSink: Send + Sync {
    /// Session phase changed
    fn on_phase(&self, phase: SessionPhase);

    /// Resource list replaced
    fn on_resources(&self, resources: &[Resource]);

    /// Status notification update
    fn on_status(&self, status: StatusNotification);

    /// The session is over and the owning service may stop itself
    fn on_session_ended(&self);
}
