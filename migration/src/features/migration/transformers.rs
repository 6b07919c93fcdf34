use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::hooks::{ContentTransformer, HookContext};
use super::permissions::merge_grantee_capabilities;
use crate::services::content::{GranteeType, WithPermissions};
use crate::services::errors::MigrationResult;

/// Maps every grantee to its destination user or group, drops the ones with
/// no destination, then merges what is left
///
/// Each distinct grantee is resolved once per item, however many permission
/// sets of the item name it.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionsTransformer;

#[async_trait]
impl<P> ContentTransformer<P> for PermissionsTransformer
where
    P: WithPermissions + Send + Sync,
{
    async fn transform(&self, item: &mut P, context: &HookContext<'_>) -> MigrationResult<()> {
        let mut grantees: Vec<(GranteeType, Uuid)> = item
            .permissions_mut()
            .into_iter()
            .flat_map(|permissions| {
                permissions
                    .grantee_capabilities
                    .iter()
                    .map(|gc| (gc.grantee_type, gc.grantee_id))
                    .collect::<Vec<_>>()
            })
            .collect();
        grantees.sort();
        grantees.dedup();

        let mut destinations: HashMap<(GranteeType, Uuid), Uuid> = HashMap::new();
        for (grantee_type, source_id) in grantees {
            match context
                .finder
                .find(grantee_type.content_type(), source_id, context.cancel)
                .await?
            {
                Some(destination) => {
                    destinations.insert((grantee_type, source_id), destination.id());
                }
                None => debug!(
                    "[Permissions] Dropping {:?} {}: no destination",
                    grantee_type, source_id
                ),
            }
        }

        for permissions in item.permissions_mut() {
            let mapped = std::mem::take(&mut permissions.grantee_capabilities)
                .into_iter()
                .filter_map(|gc| {
                    destinations
                        .get(&(gc.grantee_type, gc.grantee_id))
                        .map(|&destination| gc.with_grantee_id(destination))
                })
                .collect();
            permissions.grantee_capabilities = merge_grantee_capabilities(mapped);
        }
        Ok(())
    }
}
