use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::ContentAdapter;
use crate::services::client::api::SiteApiClient;
use crate::services::client::errors::ClientResult;
use crate::services::client::paging::ApiListPager;
use crate::services::content::{ContentReference, ContentType, Group, PublishableGroup};

pub struct GroupAdapter {
    source: Arc<SiteApiClient>,
    destination: Arc<SiteApiClient>,
}

impl GroupAdapter {
    pub fn new(source: Arc<SiteApiClient>, destination: Arc<SiteApiClient>) -> Self {
        Self { source, destination }
    }
}

#[async_trait]
impl ContentAdapter for GroupAdapter {
    type Item = Group;
    type Publishable = PublishableGroup;

    fn content_type(&self) -> ContentType {
        ContentType::Group
    }

    async fn list(&self, page_size: u64, _cancel: &CancellationToken) -> ClientResult<ApiListPager<Group>> {
        Ok(self.source.groups().pager(page_size))
    }

    async fn pull(&self, item: &Group, cancel: &CancellationToken) -> ClientResult<PublishableGroup> {
        self.source.groups().pull(item, cancel).await
    }

    async fn publish(&self, item: &PublishableGroup, cancel: &CancellationToken) -> ClientResult<ContentReference> {
        self.destination.groups().publish(item, cancel).await
    }
}
