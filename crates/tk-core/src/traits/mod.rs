//! Collaborator trait definitions

mod engine;
mod settings;
mod sink;

pub use engine::{
    ConnectParams, DeviceInfo, EngineSession, NoopProtector, RawEvent, SocketProtector,
    TunnelEngine,
};
pub use settings::SettingsStore;
pub use sink::{SessionSink, StatusNotification};
