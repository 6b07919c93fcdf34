//! Per-type pipeline: list, then filter, pull, transform and publish each
//! item, recording every step in the manifest
//!
//! Items of one type run concurrently up to the configured bound. Under the
//! stop-on-first-error policy the first failure cancels the type's child
//! token: no new items start and in-flight ones fail as canceled.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::adapters::ContentAdapter;
use super::hooks::{ContentHooks, HookContext};
use super::manifest::{MigrationStatus, MigrationStep, SharedManifest};
use super::mapping::DestinationFinder;
use super::progress::{ContentTypeReport, MigrationEvent, MigrationEventHandler, ProgressTracker};
use crate::services::client::errors::ClientError;
use crate::services::config::{BatchConfig, ErrorPolicy};
use crate::services::content::{ContentItem, ContentReference, ContentType};
use crate::services::errors::{MigrationError, MigrationResult};

/// Everything one run shares across content types
#[derive(Clone)]
pub struct RunContext {
    pub manifest: SharedManifest,
    pub finder: Arc<dyn DestinationFinder>,
    pub events: Arc<dyn MigrationEventHandler>,
    pub batch: BatchConfig,
    pub error_policy: ErrorPolicy,
}

/// A content type's migration, with the item types erased
#[async_trait]
pub trait ContentTypeMigration: Send + Sync {
    fn content_type(&self) -> ContentType;

    async fn migrate(&self, run: &RunContext, cancel: &CancellationToken) -> ContentTypeReport;
}

enum ItemOutcome {
    Completed,
    AlreadyCompleted,
    Skipped,
    Failed,
    /// Canceled before the item was touched
    NotStarted,
    ListingFailed(ClientError),
}

enum ItemResult {
    Published(ContentReference),
    Skipped,
}

pub struct ContentPipeline<A: ContentAdapter> {
    adapter: Arc<A>,
    hooks: ContentHooks<A::Item, A::Publishable>,
}

impl<A: ContentAdapter> ContentPipeline<A> {
    pub fn new(adapter: A, hooks: ContentHooks<A::Item, A::Publishable>) -> Self {
        Self {
            adapter: Arc::new(adapter),
            hooks,
        }
    }

    fn item_task(&self, run: &RunContext) -> ItemTask<A> {
        ItemTask {
            adapter: self.adapter.clone(),
            hooks: self.hooks.clone(),
            run: run.clone(),
        }
    }
}

#[async_trait]
impl<A: ContentAdapter> ContentTypeMigration for ContentPipeline<A> {
    fn content_type(&self) -> ContentType {
        self.adapter.content_type()
    }

    #[instrument(skip_all, fields(content_type = %self.adapter.content_type()))]
    async fn migrate(&self, run: &RunContext, cancel: &CancellationToken) -> ContentTypeReport {
        let content_type = self.adapter.content_type();
        run.events
            .handle_event(MigrationEvent::ContentTypeBegun { content_type });

        let tracker = ProgressTracker::new(content_type);
        let type_cancel = cancel.child_token();
        let concurrency = self
            .adapter
            .concurrency_limit()
            .unwrap_or(run.batch.max_concurrency)
            .max(1);

        let pager = match self.adapter.list(run.batch.page_size, &type_cancel).await {
            Ok(pager) => pager,
            Err(e) => {
                warn!("[Pipeline] Listing {}s failed: {}", content_type, e);
                tracker.record_listing_error(e.to_string());
                return tracker.report();
            }
        };
        info!(
            "[Pipeline] Migrating {}s with up to {} in flight",
            content_type, concurrency
        );

        let mut outcomes = pager
            .into_stream(type_cancel.clone())
            .take_until(type_cancel.clone().cancelled_owned())
            .map(|listed| {
                let task = self.item_task(run);
                let cancel = type_cancel.clone();
                async move {
                    match listed {
                        Ok(item) => task.run(item, cancel).await,
                        Err(e) => ItemOutcome::ListingFailed(e),
                    }
                }
            })
            .buffer_unordered(concurrency)
            .boxed();

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                ItemOutcome::Completed => tracker.record_completed(),
                ItemOutcome::AlreadyCompleted => tracker.record_already_completed(),
                ItemOutcome::Skipped => tracker.record_skipped(),
                ItemOutcome::NotStarted => {}
                ItemOutcome::Failed => {
                    tracker.record_failed();
                    if run.error_policy == ErrorPolicy::StopOnFirstError && !type_cancel.is_cancelled() {
                        warn!("[Pipeline] Stopping {}s after the first failure", content_type);
                        tracker.mark_stopped();
                        type_cancel.cancel();
                    }
                }
                ItemOutcome::ListingFailed(e) => {
                    if e.is_canceled() {
                        continue;
                    }
                    warn!("[Pipeline] Listing {}s failed: {}", content_type, e);
                    tracker.record_listing_error(e.to_string());
                }
            }
        }

        if cancel.is_cancelled() {
            tracker.mark_stopped();
        }
        tracker.report()
    }
}

/// Owns what one item needs, so item futures borrow nothing from the stream
struct ItemTask<A: ContentAdapter> {
    adapter: Arc<A>,
    hooks: ContentHooks<A::Item, A::Publishable>,
    run: RunContext,
}

impl<A: ContentAdapter> ItemTask<A> {
    async fn run(self, item: A::Item, cancel: CancellationToken) -> ItemOutcome {
        if cancel.is_cancelled() {
            return ItemOutcome::NotStarted;
        }

        let content_type = self.adapter.content_type();
        let source = item.reference();
        {
            let mut manifest = self.run.manifest.lock();
            let entry = manifest.get_or_insert(content_type, &source);
            if entry.status() == MigrationStatus::Completed {
                debug!("[Pipeline] {} {} already migrated", content_type, source);
                return ItemOutcome::AlreadyCompleted;
            }
            if let Err(e) = entry.restart() {
                warn!("[Pipeline] Cannot restart {} {}: {}", content_type, source, e);
                return ItemOutcome::Failed;
            }
        }

        match self.migrate_item(&item, &source, &cancel).await {
            Ok(ItemResult::Published(destination)) => {
                self.run.events.handle_event(MigrationEvent::ItemCompleted {
                    content_type,
                    source,
                    destination,
                });
                ItemOutcome::Completed
            }
            Ok(ItemResult::Skipped) => {
                self.run.events.handle_event(MigrationEvent::ItemSkipped {
                    content_type,
                    source,
                });
                ItemOutcome::Skipped
            }
            Err(e) => {
                let message = e.to_string();
                let recorded = self.run.manifest.update(content_type, source.id(), |entry| {
                    let step = MigrationStep::for_status(entry.status());
                    entry.fail(message.clone())?;
                    Ok(step)
                });
                let step = match recorded {
                    Ok(step) => step,
                    Err(record_error) => {
                        warn!(
                            "[Pipeline] Could not record failure of {} {}: {}",
                            content_type, source, record_error
                        );
                        MigrationStep::Publish
                    }
                };
                self.run.events.handle_event(MigrationEvent::ItemFailed {
                    content_type,
                    source,
                    step,
                    error: message,
                });
                ItemOutcome::Failed
            }
        }
    }

    async fn migrate_item(
        &self,
        item: &A::Item,
        source: &ContentReference,
        cancel: &CancellationToken,
    ) -> MigrationResult<ItemResult> {
        let content_type = self.adapter.content_type();
        let context = HookContext {
            content_type,
            finder: self.run.finder.as_ref(),
            cancel,
        };

        if !self.hooks.include(item, &context).await? {
            self.run
                .manifest
                .update(content_type, source.id(), |entry| entry.skip())?;
            return Ok(ItemResult::Skipped);
        }

        self.run
            .manifest
            .update(content_type, source.id(), |entry| entry.begin_pull())?;
        let mut pulled = self.adapter.pull(item, cancel).await?;

        let published = self.transform_and_publish(&mut pulled, source, &context).await;
        self.adapter.release(&pulled).await;
        let destination = published?;

        self.run.manifest.update(content_type, source.id(), |entry| {
            entry.complete(destination.clone())
        })?;
        Ok(ItemResult::Published(destination))
    }

    async fn transform_and_publish(
        &self,
        pulled: &mut A::Publishable,
        source: &ContentReference,
        context: &HookContext<'_>,
    ) -> MigrationResult<ContentReference> {
        let content_type = context.content_type;
        self.run
            .manifest
            .update(content_type, source.id(), |entry| entry.begin_transform())?;
        self.hooks.apply(pulled, context).await?;

        if context.cancel.is_cancelled() {
            return Err(MigrationError::Canceled);
        }
        self.run
            .manifest
            .update(content_type, source.id(), |entry| entry.begin_publish())?;
        Ok(self.adapter.publish(pulled, context.cancel).await?)
    }
}
