use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::ContentAdapter;
use crate::services::client::api::SiteApiClient;
use crate::services::client::errors::ClientResult;
use crate::services::client::paging::ApiListPager;
use crate::services::content::{ContentReference, ContentType, DataSource, PublishableDataSource};
use crate::services::files::ContentFileStore;

pub struct DataSourceAdapter {
    source: Arc<SiteApiClient>,
    destination: Arc<SiteApiClient>,
    files: Arc<dyn ContentFileStore>,
    overwrite: bool,
}

impl DataSourceAdapter {
    /// With `overwrite`, publishing replaces a data source of the same name
    /// in the same project instead of failing
    pub fn new(
        source: Arc<SiteApiClient>,
        destination: Arc<SiteApiClient>,
        files: Arc<dyn ContentFileStore>,
        overwrite: bool,
    ) -> Self {
        Self {
            source,
            destination,
            files,
            overwrite,
        }
    }
}

#[async_trait]
impl ContentAdapter for DataSourceAdapter {
    type Item = DataSource;
    type Publishable = PublishableDataSource;

    fn content_type(&self) -> ContentType {
        ContentType::DataSource
    }

    async fn list(&self, page_size: u64, _cancel: &CancellationToken) -> ClientResult<ApiListPager<DataSource>> {
        Ok(self.source.data_sources().pager(page_size))
    }

    async fn pull(&self, item: &DataSource, cancel: &CancellationToken) -> ClientResult<PublishableDataSource> {
        self.source
            .data_sources()
            .pull(item, self.files.as_ref(), cancel)
            .await
    }

    async fn publish(
        &self,
        item: &PublishableDataSource,
        cancel: &CancellationToken,
    ) -> ClientResult<ContentReference> {
        self.destination
            .data_sources()
            .publish(item, self.files.as_ref(), self.overwrite, cancel)
            .await
    }

    async fn release(&self, item: &PublishableDataSource) {
        if let Err(e) = self.files.release(&item.file).await {
            warn!(
                "[DataSourceAdapter] Failed to release {}: {}",
                item.file.original_file_name, e
            );
        }
    }
}
