//! tk-core: Core abstractions and configuration for tunnelkeeper
//!
//! This crate provides the domain types, error taxonomy, collaborator
//! traits and persistence used by the session coordinator and the
//! client binary.

pub mod config;
pub mod error;
pub mod overlay;
pub mod store;
pub mod traits;
pub mod types;

pub use error::TkError;
pub use overlay::compute_disabled_set;
pub use types::{
    Cidr, Resource, ResourceEnablement, ResourceId, ResourceKind, SessionPhase, TunDescriptor,
    TunnelTopology,
};
