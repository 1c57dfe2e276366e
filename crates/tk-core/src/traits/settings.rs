//! Settings store trait

use crate::error::StoreError;
use crate::types::ResourceEnablement;

/// Persistent settings shared across sessions.
///
/// Read at connect time and on explicit toggles; the coordinator never
/// polls it.
pub trait SettingsStore: Send + Sync {
    /// Stored authentication token
    fn token(&self) -> Result<Option<String>, StoreError>;

    /// Forget the authentication token
    fn clear_token(&self) -> Result<(), StoreError>;

    /// Forget the signed-in actor's display name
    fn clear_actor_name(&self) -> Result<(), StoreError>;

    /// Stored device identifier
    fn device_id(&self) -> Result<Option<String>, StoreError>;

    /// Persist the device identifier
    fn save_device_id(&self, device_id: &str) -> Result<(), StoreError>;

    /// Persisted enablement of the internet resource
    fn internet_resource_state(&self) -> Result<ResourceEnablement, StoreError>;

    /// Persist the enablement of the internet resource
    fn save_internet_resource_state(&self, state: ResourceEnablement) -> Result<(), StoreError>;
}
