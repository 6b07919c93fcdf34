use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::services::client::errors::ClientResult;
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::{
    CapabilitiesType, CapabilityType, GranteeCapabilitiesType, IdRef, PermissionsEnvelope,
    PermissionsType,
};
use crate::services::content::{
    Capability, CapabilityMode, ContentType, GranteeCapability, GranteeType, Permissions,
};

/// Permissions of one content collection (`/projects`, `/workbooks`, ...)
pub struct PermissionsApiClient {
    rest: Arc<RestClient>,
    content_type: ContentType,
}

impl PermissionsApiClient {
    pub fn new(rest: Arc<RestClient>, content_type: ContentType) -> Self {
        Self { rest, content_type }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    #[instrument(skip(self, cancel), fields(content_type = %self.content_type), err)]
    pub async fn get_permissions(&self, content_id: Uuid, cancel: &CancellationToken) -> ClientResult<Permissions> {
        let envelope: PermissionsEnvelope = self
            .rest
            .get(self.content_type.url_segment())
            .segment(content_id)
            .segment("permissions")
            .send_json(cancel)
            .await?;
        Ok(permissions_from_wire(envelope.permissions))
    }

    /// Grant `permissions` on top of whatever the item already has
    pub async fn add_permissions(
        &self,
        content_id: Uuid,
        permissions: &Permissions,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        if permissions.is_empty() {
            return Ok(());
        }
        let envelope = PermissionsEnvelope {
            permissions: permissions_to_wire(permissions),
        };
        self.rest
            .put(self.content_type.url_segment())
            .segment(content_id)
            .segment("permissions")
            .with_json(&envelope)?
            .send_empty(cancel)
            .await
    }

    pub async fn delete_capability(
        &self,
        content_id: Uuid,
        grantee_type: GranteeType,
        grantee_id: Uuid,
        capability: &Capability,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.rest
            .delete(self.content_type.url_segment())
            .segment(content_id)
            .segment("permissions")
            .segment(grantee_type.url_segment())
            .segment(grantee_id)
            .segment(&capability.name)
            .segment(capability.mode.as_str())
            .send_empty(cancel)
            .await
    }

    /// Make the item's explicit permissions equal to `desired`
    ///
    /// Capabilities present at the destination but absent from `desired` are
    /// deleted one by one, then the desired set is added.
    #[instrument(skip(self, desired, cancel), fields(content_type = %self.content_type), err)]
    pub async fn update_permissions(
        &self,
        content_id: Uuid,
        desired: &Permissions,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let current = self.get_permissions(content_id, cancel).await?;

        let wanted: HashSet<(GranteeType, Uuid, &Capability)> = desired
            .grantee_capabilities
            .iter()
            .flat_map(|gc| {
                gc.capabilities
                    .iter()
                    .map(move |c| (gc.grantee_type, gc.grantee_id, c))
            })
            .collect();

        for grantee in &current.grantee_capabilities {
            for capability in &grantee.capabilities {
                if wanted.contains(&(grantee.grantee_type, grantee.grantee_id, capability)) {
                    continue;
                }
                debug!(
                    "[PermissionsApi] Removing {} {} from {} {}",
                    capability.mode, capability.name, content_id, grantee.grantee_id
                );
                self.delete_capability(
                    content_id,
                    grantee.grantee_type,
                    grantee.grantee_id,
                    capability,
                    cancel,
                )
                .await?;
            }
        }

        self.add_permissions(content_id, desired, cancel).await
    }
}

pub(crate) fn permissions_from_wire(wire: PermissionsType) -> Permissions {
    let grantee_capabilities = wire
        .grantee_capabilities
        .into_iter()
        .filter_map(|entry| {
            let (grantee_type, grantee_id) = match (entry.user, entry.group) {
                (Some(user), _) => (GranteeType::User, user.id),
                (None, Some(group)) => (GranteeType::Group, group.id),
                (None, None) => {
                    warn!("[PermissionsApi] Grantee capability without a grantee ignored");
                    return None;
                }
            };
            let capabilities = entry
                .capabilities
                .capability
                .into_iter()
                .filter_map(|c| match CapabilityMode::parse(&c.mode) {
                    Some(mode) => Some(Capability::new(c.name, mode)),
                    None => {
                        warn!("[PermissionsApi] Unknown capability mode {} ignored", c.mode);
                        None
                    }
                })
                .collect();
            Some(GranteeCapability::new(grantee_type, grantee_id, capabilities))
        })
        .collect();
    Permissions::new(grantee_capabilities)
}

pub(crate) fn permissions_to_wire(permissions: &Permissions) -> PermissionsType {
    PermissionsType {
        grantee_capabilities: permissions
            .grantee_capabilities
            .iter()
            .map(|gc| {
                let grantee = Some(IdRef { id: gc.grantee_id });
                let (user, group) = match gc.grantee_type {
                    GranteeType::User => (grantee, None),
                    GranteeType::Group => (None, grantee),
                };
                GranteeCapabilitiesType {
                    user,
                    group,
                    capabilities: CapabilitiesType {
                        capability: gc
                            .capabilities
                            .iter()
                            .map(|c| CapabilityType {
                                name: c.name.clone(),
                                mode: c.mode.as_str().to_string(),
                            })
                            .collect(),
                    },
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::client::test_support::{signed_in_rest, ScriptedTransport};
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    #[test]
    fn test_wire_conversion_skips_bad_entries() {
        let user = Uuid::new_v4();
        let group = Uuid::new_v4();
        let wire: PermissionsType = serde_json::from_value(json!({
            "granteeCapabilities": [
                { "user": { "id": user }, "capabilities": { "capability": [
                    { "name": "Read", "mode": "Allow" },
                    { "name": "Write", "mode": "Maybe" }
                ]}},
                { "group": { "id": group }, "capabilities": { "capability": [
                    { "name": "Write", "mode": "Deny" }
                ]}},
                { "capabilities": {} }
            ]
        }))
        .unwrap();

        let permissions = permissions_from_wire(wire);
        assert_eq!(permissions.grantee_capabilities.len(), 2);
        assert_eq!(
            permissions.grantee_capabilities[0],
            GranteeCapability::new(GranteeType::User, user, vec![Capability::allow("Read")])
        );
        assert!(permissions.contains(GranteeType::Group, group, &Capability::deny("Write")));

        let back = serde_json::to_value(permissions_to_wire(&permissions)).unwrap();
        assert_eq!(back["granteeCapabilities"][1]["group"]["id"], json!(group));
        assert!(back["granteeCapabilities"][1].get("user").is_none());
    }

    #[tokio::test]
    async fn test_update_removes_stale_capabilities_then_adds() {
        let content_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let leaf = ScriptedTransport::new();
        leaf.push_json(
            StatusCode::OK,
            json!({ "permissions": { "granteeCapabilities": [
                { "user": { "id": user }, "capabilities": { "capability": [
                    { "name": "Read", "mode": "Allow" },
                    { "name": "Write", "mode": "Allow" }
                ]}}
            ]}}),
        );
        leaf.push_status(StatusCode::NO_CONTENT);
        leaf.push_json(StatusCode::OK, json!({ "permissions": {} }));
        let client = PermissionsApiClient::new(signed_in_rest(leaf.clone()), ContentType::Workbook);

        let desired = Permissions::new(vec![GranteeCapability::new(
            GranteeType::User,
            user,
            vec![Capability::allow("Read")],
        )]);
        client
            .update_permissions(content_id, &desired, &CancellationToken::new())
            .await
            .unwrap();

        let requests = leaf.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].method, Method::DELETE);
        assert!(requests[1]
            .url
            .path()
            .ends_with(&format!("/workbooks/{}/permissions/users/{}/Write/Allow", content_id, user)));
        assert_eq!(requests[2].method, Method::PUT);
    }

    #[tokio::test]
    async fn test_empty_add_sends_nothing() {
        let leaf = ScriptedTransport::new();
        let client = PermissionsApiClient::new(signed_in_rest(leaf.clone()), ContentType::Project);

        client
            .add_permissions(Uuid::new_v4(), &Permissions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(leaf.request_count(), 0);
    }
}
