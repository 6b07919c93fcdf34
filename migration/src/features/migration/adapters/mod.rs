//! One adapter per content type
//!
//! An adapter tells the pipeline how to list, pull and publish its type.
//! Source and destination are separate signed-in sites.

mod data_sources;
mod groups;
mod projects;
mod users;
mod workbooks;

pub use data_sources::DataSourceAdapter;
pub use groups::GroupAdapter;
pub use projects::ProjectAdapter;
pub use users::UserAdapter;
pub use workbooks::WorkbookAdapter;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::services::client::errors::ClientResult;
use crate::services::client::paging::ApiListPager;
use crate::services::content::{ContentItem, ContentReference, ContentType};

#[async_trait]
pub trait ContentAdapter: Send + Sync + 'static {
    /// Item as listed from the source
    type Item: ContentItem + Send + Sync + 'static;
    /// Item as pulled, ready for the hooks and publish
    type Publishable: Send + Sync + 'static;

    fn content_type(&self) -> ContentType;

    /// Upper bound on items in flight, when the type needs a tighter one
    /// than the configured concurrency
    fn concurrency_limit(&self) -> Option<usize> {
        None
    }

    async fn list(
        &self,
        page_size: u64,
        cancel: &CancellationToken,
    ) -> ClientResult<ApiListPager<Self::Item>>;

    async fn pull(&self, item: &Self::Item, cancel: &CancellationToken) -> ClientResult<Self::Publishable>;

    async fn publish(
        &self,
        item: &Self::Publishable,
        cancel: &CancellationToken,
    ) -> ClientResult<ContentReference>;

    /// Free whatever a successful pull holds; called once per pulled item
    /// whether or not it was published
    async fn release(&self, _item: &Self::Publishable) {}
}
