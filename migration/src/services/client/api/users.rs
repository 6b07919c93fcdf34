use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::paging::{ApiListPager, Page, PageAccessor};
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::{
    CreateUserRequest, CreateUserType, UpdateUserRequest, UpdateUserType, UserResponse, UserType,
    UsersResponse,
};
use crate::services::content::{ContentLocation, ContentReference, User};

const DEFAULT_SITE_ROLE: &str = "Unlicensed";

pub struct UsersApiClient {
    rest: Arc<RestClient>,
}

impl UsersApiClient {
    pub fn new(rest: Arc<RestClient>) -> Self {
        Self { rest }
    }

    pub fn pager(self: &Arc<Self>, page_size: u64) -> ApiListPager<User> {
        ApiListPager::new(self.clone(), page_size)
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn get_user(&self, id: Uuid, cancel: &CancellationToken) -> ClientResult<User> {
        let response: UserResponse = self
            .rest
            .get("/users")
            .segment(id)
            .send_json(cancel)
            .await?;
        Ok(user_from_wire(response.user))
    }

    /// Users sharing a name across domains are told apart by `location`
    pub async fn find_by_location(
        &self,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<User>> {
        let Some(name) = location.name() else {
            return Ok(None);
        };
        let response: UsersResponse = self
            .rest
            .get("/users")
            .with_filter("name", "eq", name)
            .send_json(cancel)
            .await?;

        Ok(response
            .users
            .user
            .into_iter()
            .map(user_from_wire)
            .find(|user| &user.location() == location))
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn add_user(
        &self,
        name: &str,
        site_role: &str,
        auth_setting: Option<&str>,
        cancel: &CancellationToken,
    ) -> ClientResult<User> {
        if name.trim().is_empty() {
            return Err(ClientError::validation("name", "user name must not be empty"));
        }

        let request = CreateUserRequest {
            user: CreateUserType {
                name: name.to_string(),
                site_role: site_role.to_string(),
                auth_setting: auth_setting.map(str::to_string),
            },
        };
        let response: UserResponse = self
            .rest
            .post("/users")
            .with_json(&request)?
            .send_json(cancel)
            .await?;
        Ok(user_from_wire(response.user))
    }

    #[instrument(skip(self, update, cancel), err)]
    pub async fn update_user(
        &self,
        id: Uuid,
        update: UpdateUserType,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.rest
            .put("/users")
            .segment(id)
            .with_json(&UpdateUserRequest { user: update })?
            .send_empty(cancel)
            .await
    }

    /// Add the user at this site; an existing user with the same name is reused
    #[instrument(skip(self, user, cancel), fields(user = %user.name), err)]
    pub async fn publish(&self, user: &User, cancel: &CancellationToken) -> ClientResult<ContentReference> {
        let created = match self
            .add_user(&user.name, &user.site_role, user.auth_setting.as_deref(), cancel)
            .await
        {
            Ok(created) => created,
            Err(e) if e.is_conflict() => {
                info!("[UsersApi] User {} already exists", user.name);
                self.find_by_location(&user.location(), cancel)
                    .await?
                    .ok_or(e)?
            }
            Err(e) => return Err(e),
        };

        if user.full_name.is_some() || user.email.is_some() {
            let update = UpdateUserType {
                full_name: user.full_name.clone(),
                email: user.email.clone(),
                site_role: None,
            };
            self.update_user(created.id, update, cancel).await?;
        }

        Ok(ContentReference::new(created.id, &user.name, user.location()))
    }
}

#[async_trait]
impl PageAccessor<User> for UsersApiClient {
    async fn get_page(
        &self,
        page_number: u64,
        page_size: u64,
        cancel: &CancellationToken,
    ) -> ClientResult<Page<User>> {
        let response: UsersResponse = self
            .rest
            .get("/users")
            .with_page(page_number, page_size)
            .send_json(cancel)
            .await?;
        let items = response.users.user.into_iter().map(user_from_wire).collect();
        Ok(Page::from_pagination(items, &response.pagination))
    }
}

pub(crate) fn user_from_wire(user: UserType) -> User {
    User {
        id: user.id,
        name: user.name,
        domain: user.domain.map(|d| d.name),
        full_name: user.full_name,
        email: user.email,
        site_role: user
            .site_role
            .unwrap_or_else(|| DEFAULT_SITE_ROLE.to_string()),
        auth_setting: user.auth_setting,
    }
}
