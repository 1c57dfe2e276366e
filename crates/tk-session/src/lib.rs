//! tk-session: Session coordinator for tunnelkeeper
//!
//! Drives one tunnel session at a time. Engine events and user commands are
//! serialized through a single coordinator loop that owns the session state
//! and pushes interface configurations, resource lists and status changes
//! to the platform.

pub mod command;
pub mod coordinator;
pub mod events;
pub mod interface;
pub mod monitor;
pub mod replay;
pub mod service;
pub mod state;

pub use command::{Command, CommandQueue};
pub use coordinator::{Collaborators, Coordinator, LoopExit, SessionOutcome};
pub use events::{Event, EventSource};
pub use interface::{AppRules, InterfaceBuilder, InterfaceConfig, InterfaceProvisioner};
pub use service::{SessionHandle, TunnelService};
pub use state::{SessionSnapshot, SessionState};
