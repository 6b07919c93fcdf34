//! Lazy page-by-page enumeration of REST collections

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::errors::{ClientError, ClientResult};
use super::types::Pagination;

/// One page of a collection. `items` may be shorter than the page when
/// entries were excluded during conversion.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based
    pub page_number: u64,
    pub page_size: u64,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page_number: u64, page_size: u64, total_count: u64) -> Self {
        Self {
            items,
            page_number,
            page_size,
            total_count,
        }
    }

    pub fn from_pagination(items: Vec<T>, pagination: &Pagination) -> Self {
        Self::new(
            items,
            pagination.page_number,
            pagination.page_size,
            pagination.total_available,
        )
    }

    /// This page reaches the end of the collection
    pub fn is_last(&self) -> bool {
        self.page_size == 0 || self.page_number.saturating_mul(self.page_size) >= self.total_count
    }
}

#[async_trait]
pub trait PageAccessor<T>: Send + Sync {
    async fn get_page(
        &self,
        page_number: u64,
        page_size: u64,
        cancel: &CancellationToken,
    ) -> ClientResult<Page<T>>;
}

/// Restartable cursor over a paged collection
pub struct ApiListPager<T> {
    accessor: Arc<dyn PageAccessor<T>>,
    page_size: u64,
    next_page_number: u64,
    finished: bool,
}

impl<T: Send + 'static> ApiListPager<T> {
    pub fn new(accessor: Arc<dyn PageAccessor<T>>, page_size: u64) -> Self {
        Self {
            accessor,
            page_size,
            next_page_number: 1,
            finished: false,
        }
    }

    /// Fetch the next page, or `None` once the collection is exhausted
    pub async fn next_page(&mut self, cancel: &CancellationToken) -> ClientResult<Option<Page<T>>> {
        if self.finished {
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(ClientError::Canceled);
        }

        let page = self
            .accessor
            .get_page(self.next_page_number, self.page_size, cancel)
            .await?;
        debug!(
            "[Pager] Page {} ({} items, {} total)",
            page.page_number,
            page.items.len(),
            page.total_count
        );

        self.next_page_number += 1;
        if page.is_last() {
            self.finished = true;
        }
        Ok(Some(page))
    }

    /// Start again from the first page
    pub fn reset(&mut self) {
        self.next_page_number = 1;
        self.finished = false;
    }

    /// Items as a lazy stream; the next page is fetched only when needed
    pub fn into_stream(self, cancel: CancellationToken) -> BoxStream<'static, ClientResult<T>> {
        stream::try_unfold((self, cancel), |(mut pager, cancel)| async move {
            match pager.next_page(&cancel).await? {
                Some(page) => {
                    let items = stream::iter(page.items.into_iter().map(Ok::<T, ClientError>));
                    Ok::<_, ClientError>(Some((items, (pager, cancel))))
                }
                None => Ok::<_, ClientError>(None),
            }
        })
        .try_flatten()
        .boxed()
    }

    pub async fn collect_all(self, cancel: CancellationToken) -> ClientResult<Vec<T>> {
        self.into_stream(cancel).try_collect().await
    }
}

/// Drain a paged endpoint that is not exposed as a [`PageAccessor`]
pub async fn fetch_all_pages<T, F, Fut>(page_size: u64, mut fetch: F) -> ClientResult<Vec<T>>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = ClientResult<Page<T>>>,
{
    let mut all = Vec::new();
    let mut page_number = 1;
    loop {
        let page = fetch(page_number, page_size).await?;
        let last = page.is_last();
        all.extend(page.items);
        if last {
            return Ok(all);
        }
        page_number += 1;
    }
}

/// Serves an already-loaded list page by page
pub struct LoadedPageAccessor<T> {
    items: Vec<T>,
}

impl<T> LoadedPageAccessor<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PageAccessor<T> for LoadedPageAccessor<T> {
    async fn get_page(
        &self,
        page_number: u64,
        page_size: u64,
        _cancel: &CancellationToken,
    ) -> ClientResult<Page<T>> {
        let start = (page_number.saturating_sub(1) * page_size) as usize;
        let items = self
            .items
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(Page::new(
            items,
            page_number,
            page_size,
            self.items.len() as u64,
        ))
    }
}
