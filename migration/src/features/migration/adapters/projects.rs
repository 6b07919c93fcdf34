use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::ContentAdapter;
use crate::services::client::api::SiteApiClient;
use crate::services::client::errors::ClientResult;
use crate::services::client::paging::ApiListPager;
use crate::services::content::{ContentReference, ContentType, Project, PublishableProject};

/// Projects are listed parents first and published one at a time, so a
/// parent is always at the destination before its children resolve it
pub struct ProjectAdapter {
    source: Arc<SiteApiClient>,
    destination: Arc<SiteApiClient>,
}

impl ProjectAdapter {
    pub fn new(source: Arc<SiteApiClient>, destination: Arc<SiteApiClient>) -> Self {
        Self { source, destination }
    }
}

#[async_trait]
impl ContentAdapter for ProjectAdapter {
    type Item = Project;
    type Publishable = PublishableProject;

    fn content_type(&self) -> ContentType {
        ContentType::Project
    }

    fn concurrency_limit(&self) -> Option<usize> {
        Some(1)
    }

    async fn list(&self, page_size: u64, cancel: &CancellationToken) -> ClientResult<ApiListPager<Project>> {
        self.source.projects().ordered_pager(page_size, cancel).await
    }

    async fn pull(&self, item: &Project, cancel: &CancellationToken) -> ClientResult<PublishableProject> {
        self.source.projects().pull(item, cancel).await
    }

    async fn publish(
        &self,
        item: &PublishableProject,
        cancel: &CancellationToken,
    ) -> ClientResult<ContentReference> {
        self.destination.projects().publish(item, cancel).await
    }
}
