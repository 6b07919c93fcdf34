use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::users::user_from_wire;
use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::paging::{fetch_all_pages, ApiListPager, Page, PageAccessor};
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::{
    AddUserToGroupRequest, CreateGroupRequest, CreateGroupType, GroupResponse, GroupType,
    GroupsResponse, IdRef, UsersResponse,
};
use crate::services::content::{
    ContentItem, ContentLocation, ContentReference, Group, PublishableGroup, User,
};

pub struct GroupsApiClient {
    rest: Arc<RestClient>,
    page_size: u64,
}

impl GroupsApiClient {
    pub fn new(rest: Arc<RestClient>, page_size: u64) -> Self {
        Self { rest, page_size }
    }

    pub fn pager(self: &Arc<Self>, page_size: u64) -> ApiListPager<Group> {
        ApiListPager::new(self.clone(), page_size)
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn get_group_users(&self, group_id: Uuid, cancel: &CancellationToken) -> ClientResult<Vec<User>> {
        fetch_all_pages(self.page_size, |page_number, page_size| async move {
            let response: UsersResponse = self
                .rest
                .get("/groups")
                .segment(group_id)
                .segment("users")
                .with_page(page_number, page_size)
                .send_json(cancel)
                .await?;
            let users = response.users.user.into_iter().map(user_from_wire).collect();
            Ok(Page::from_pagination(users, &response.pagination))
        })
        .await
    }

    pub async fn find_by_location(
        &self,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<Group>> {
        let Some(name) = location.name() else {
            return Ok(None);
        };
        let response: GroupsResponse = self
            .rest
            .get("/groups")
            .with_filter("name", "eq", name)
            .send_json(cancel)
            .await?;

        Ok(response
            .groups
            .group
            .into_iter()
            .map(group_from_wire)
            .find(|group| &group.location() == location))
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn create_group(
        &self,
        name: &str,
        minimum_site_role: Option<&str>,
        cancel: &CancellationToken,
    ) -> ClientResult<Group> {
        if name.trim().is_empty() {
            return Err(ClientError::validation("name", "group name must not be empty"));
        }

        let request = CreateGroupRequest {
            group: CreateGroupType {
                name: name.to_string(),
                minimum_site_role: minimum_site_role.map(str::to_string),
            },
        };
        let response: GroupResponse = self
            .rest
            .post("/groups")
            .with_json(&request)?
            .send_json(cancel)
            .await?;
        Ok(group_from_wire(response.group))
    }

    /// Adding an existing member is not an error
    pub async fn add_user(&self, group_id: Uuid, user_id: Uuid, cancel: &CancellationToken) -> ClientResult<()> {
        let outcome = self
            .rest
            .post("/groups")
            .segment(group_id)
            .segment("users")
            .with_json(&AddUserToGroupRequest {
                user: IdRef { id: user_id },
            })?
            .send_empty(cancel)
            .await;

        match outcome {
            Err(e) if e.is_conflict() => {
                debug!("[GroupsApi] User {} already in group {}", user_id, group_id);
                Ok(())
            }
            other => other,
        }
    }

    pub async fn pull(&self, group: &Group, cancel: &CancellationToken) -> ClientResult<PublishableGroup> {
        let users = self.get_group_users(group.id, cancel).await?;
        Ok(PublishableGroup {
            group: group.clone(),
            users: users.iter().map(ContentItem::reference).collect(),
        })
    }

    /// Create the group (or reuse an existing one) and add its members
    #[instrument(skip(self, item, cancel), fields(group = %item.group.name), err)]
    pub async fn publish(&self, item: &PublishableGroup, cancel: &CancellationToken) -> ClientResult<ContentReference> {
        let group = &item.group;
        let published = match self
            .create_group(&group.name, group.minimum_site_role.as_deref(), cancel)
            .await
        {
            Ok(created) => created,
            Err(e) if e.is_conflict() => {
                info!("[GroupsApi] Group {} already exists", group.name);
                self.find_by_location(&group.location(), cancel)
                    .await?
                    .ok_or(e)?
            }
            Err(e) => return Err(e),
        };

        for user in &item.users {
            self.add_user(published.id, user.id(), cancel).await?;
        }

        Ok(ContentReference::new(published.id, &group.name, group.location()))
    }
}

#[async_trait]
impl PageAccessor<Group> for GroupsApiClient {
    async fn get_page(
        &self,
        page_number: u64,
        page_size: u64,
        cancel: &CancellationToken,
    ) -> ClientResult<Page<Group>> {
        let response: GroupsResponse = self
            .rest
            .get("/groups")
            .with_page(page_number, page_size)
            .send_json(cancel)
            .await?;
        let items = response.groups.group.into_iter().map(group_from_wire).collect();
        Ok(Page::from_pagination(items, &response.pagination))
    }
}

fn group_from_wire(group: GroupType) -> Group {
    Group {
        id: group.id,
        name: group.name,
        domain: group.domain.map(|d| d.name),
        minimum_site_role: group.minimum_site_role,
    }
}
