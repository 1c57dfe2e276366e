//! Resource enablement overlay
//!
//! The set of resources the engine should treat as disabled is derived from
//! the current resource list and the persisted enablement of the internet
//! resource. It is never stored; callers recompute it whenever either input
//! changes.

use std::collections::BTreeSet;

use crate::types::{Resource, ResourceEnablement, ResourceId};

/// First internet catch-all resource in the list, if any
pub fn internet_resource(resources: &[Resource]) -> Option<&Resource> {
    resources.iter().find(|r| r.is_internet())
}

/// Compute the disabled-resource set.
///
/// Contains exactly the internet resource's ID when that resource is present
/// and the user disabled it; empty otherwise.
pub fn compute_disabled_set(
    resources: &[Resource],
    enablement: ResourceEnablement,
) -> BTreeSet<ResourceId> {
    match internet_resource(resources) {
        Some(internet) if enablement.is_disabled() => BTreeSet::from([internet.id.clone()]),
        _ => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_internet() -> Vec<Resource> {
        vec![Resource::new("r1", "Wiki"), Resource::internet("internet")]
    }

    #[test]
    fn test_disabled_internet_is_reported() {
        let set = compute_disabled_set(&with_internet(), ResourceEnablement::Disabled);
        assert_eq!(set, BTreeSet::from([ResourceId::new("internet")]));
    }

    #[test]
    fn test_enabled_internet_is_not_reported() {
        assert!(compute_disabled_set(&with_internet(), ResourceEnablement::Enabled).is_empty());
        assert!(compute_disabled_set(&with_internet(), ResourceEnablement::Unset).is_empty());
    }

    #[test]
    fn test_no_internet_resource_yields_empty_set() {
        let resources = vec![Resource::new("r1", "Wiki"), Resource::new("r2", "Lab")];
        for enablement in [
            ResourceEnablement::Unset,
            ResourceEnablement::Enabled,
            ResourceEnablement::Disabled,
        ] {
            assert!(compute_disabled_set(&resources, enablement).is_empty());
        }
        assert!(compute_disabled_set(&[], ResourceEnablement::Disabled).is_empty());
    }

    #[test]
    fn test_normal_resources_never_disabled() {
        let set = compute_disabled_set(&with_internet(), ResourceEnablement::Disabled);
        assert!(!set.contains(&ResourceId::new("r1")));
    }
}
