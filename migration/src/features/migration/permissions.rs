//! Permission merge
//!
//! Several source grantees can map to the same destination user or group,
//! and one grantee can appear in more than one record. Merging collapses the
//! records to one per destination grantee with one mode per capability name.
//! When the modes disagree, Deny wins. Capabilities that cannot be assigned
//! on a destination are removed before modes are compared, so a leader deny
//! never overrides a leader allow.

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::services::content::{
    capability_names, Capability, CapabilityMode, GranteeCapability, GranteeType, Permissions,
};

/// Capabilities that are never written to a destination in the given mode;
/// `None` drops the capability whatever its mode
const NON_ASSIGNABLE: &[(&str, Option<CapabilityMode>)] = &[
    (capability_names::PROJECT_LEADER, Some(CapabilityMode::Deny)),
    (capability_names::INHERITED_PROJECT_LEADER, None),
];

fn is_assignable(capability: &Capability) -> bool {
    !NON_ASSIGNABLE.iter().any(|(name, mode)| {
        *name == capability.name && mode.map_or(true, |mode| mode == capability.mode)
    })
}

/// Merge grantee records that already carry destination grantee ids
///
/// The output is sorted by grantee and capability name, so it does not
/// depend on the order of the input records.
pub fn merge_grantee_capabilities(records: Vec<GranteeCapability>) -> Vec<GranteeCapability> {
    merge_grantee_capabilities_with_audit(records, |_| {})
}

/// Like [`merge_grantee_capabilities`], calling `audit` once per input record
/// before it is folded into its group
pub fn merge_grantee_capabilities_with_audit(
    records: Vec<GranteeCapability>,
    mut audit: impl FnMut(&GranteeCapability),
) -> Vec<GranteeCapability> {
    let mut grouped: BTreeMap<(GranteeType, Uuid), BTreeMap<String, CapabilityMode>> =
        BTreeMap::new();

    for record in records {
        audit(&record);
        let capabilities = grouped
            .entry((record.grantee_type, record.grantee_id))
            .or_default();
        for capability in record.capabilities.into_iter().filter(is_assignable) {
            capabilities
                .entry(capability.name)
                .and_modify(|mode| *mode = mode.resolve(capability.mode))
                .or_insert(capability.mode);
        }
    }

    grouped
        .into_iter()
        .filter_map(|((grantee_type, grantee_id), capabilities)| {
            let capabilities: Vec<Capability> = capabilities
                .into_iter()
                .map(|(name, mode)| Capability::new(name, mode))
                .collect();
            if capabilities.is_empty() {
                None
            } else {
                Some(GranteeCapability::new(grantee_type, grantee_id, capabilities))
            }
        })
        .collect()
}

/// Merge a whole permission set in place
pub fn merge_permissions(permissions: &mut Permissions) {
    let records = std::mem::take(&mut permissions.grantee_capabilities);
    permissions.grantee_capabilities = merge_grantee_capabilities(records);
}
