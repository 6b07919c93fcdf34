use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::ContentAdapter;
use crate::services::client::api::SiteApiClient;
use crate::services::client::errors::ClientResult;
use crate::services::client::paging::ApiListPager;
use crate::services::content::{ContentReference, ContentType, PublishableWorkbook, Workbook};
use crate::services::files::ContentFileStore;

pub struct WorkbookAdapter {
    source: Arc<SiteApiClient>,
    destination: Arc<SiteApiClient>,
    files: Arc<dyn ContentFileStore>,
    overwrite: bool,
}

impl WorkbookAdapter {
    /// With `overwrite`, publishing replaces a workbook of the same name
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
impl ContentAdapter for WorkbookAdapter {
    type Item = Workbook;
    type Publishable = PublishableWorkbook;

    fn content_type(&self) -> ContentType {
        ContentType::Workbook
    }

    async fn list(&self, page_size: u64, _cancel: &CancellationToken) -> ClientResult<ApiListPager<Workbook>> {
        Ok(self.source.workbooks().pager(page_size))
    }

    async fn pull(&self, item: &Workbook, cancel: &CancellationToken) -> ClientResult<PublishableWorkbook> {
        self.source
            .workbooks()
            .pull(item, self.files.as_ref(), cancel)
            .await
    }

    async fn publish(
        &self,
        item: &PublishableWorkbook,
        cancel: &CancellationToken,
    ) -> ClientResult<ContentReference> {
        self.destination
            .workbooks()
            .publish(item, self.files.as_ref(), self.overwrite, cancel)
            .await
    }

    async fn release(&self, item: &PublishableWorkbook) {
        if let Err(e) = self.files.release(&item.file).await {
            warn!(
                "[WorkbookAdapter] Failed to release {}: {}",
                item.file.original_file_name, e
            );
        }
    }
}
