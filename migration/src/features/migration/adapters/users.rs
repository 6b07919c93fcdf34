use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::ContentAdapter;
use crate::services::client::api::SiteApiClient;
use crate::services::client::errors::ClientResult;
use crate::services::client::paging::ApiListPager;
use crate::services::content::{ContentReference, ContentType, User};

pub struct UserAdapter {
    source: Arc<SiteApiClient>,
    destination: Arc<SiteApiClient>,
}

impl UserAdapter {
    pub fn new(source: Arc<SiteApiClient>, destination: Arc<SiteApiClient>) -> Self {
        Self { source, destination }
    }
}

#[async_trait]
impl ContentAdapter for UserAdapter {
    type Item = User;
    type Publishable = User;

    fn content_type(&self) -> ContentType {
        ContentType::User
    }

    async fn list(&self, page_size: u64, _cancel: &CancellationToken) -> ClientResult<ApiListPager<User>> {
        Ok(self.source.users().pager(page_size))
    }

    /// The listed user already carries everything publish needs
    async fn pull(&self, item: &User, _cancel: &CancellationToken) -> ClientResult<User> {
        Ok(item.clone())
    }

    async fn publish(&self, item: &User, cancel: &CancellationToken) -> ClientResult<ContentReference> {
        self.destination.users().publish(item, cancel).await
    }
}
