//! Migration progress events and event handling

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::metrics::{ContentTypeReport, MigrationRunStatus};
use crate::features::migration::manifest::MigrationStep;
use crate::services::content::{ContentReference, ContentType};

/// Events that can occur during migration
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationEvent {
    Started {
        plan_id: String,
        resumed: bool,
    },
    ContentTypeBegun {
        content_type: ContentType,
    },
    ItemCompleted {
        content_type: ContentType,
        source: ContentReference,
        destination: ContentReference,
    },
    ItemSkipped {
        content_type: ContentType,
        source: ContentReference,
    },
    ItemFailed {
        content_type: ContentType,
        source: ContentReference,
        step: MigrationStep,
        error: String,
    },
    ContentTypeCompleted {
        report: ContentTypeReport,
    },
    Completed {
        status: MigrationRunStatus,
    },
}

/// Event handler for migration events
///
/// Handlers are called from the item tasks and must not block.
pub trait MigrationEventHandler: Send + Sync {
    fn handle_event(&self, event: MigrationEvent);
}

/// Composite event handler that forwards events to multiple handlers
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Arc<dyn MigrationEventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler<H: MigrationEventHandler + 'static>(&mut self, handler: H) {
        self.handlers.push(Arc::new(handler));
    }

    pub fn add_shared(&mut self, handler: Arc<dyn MigrationEventHandler>) {
        self.handlers.push(handler);
    }
}

impl MigrationEventHandler for CompositeEventHandler {
    fn handle_event(&self, event: MigrationEvent) {
        for handler in &self.handlers {
            handler.handle_event(event.clone());
        }
    }
}

/// Writes every event to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

impl MigrationEventHandler for LoggingEventHandler {
    fn handle_event(&self, event: MigrationEvent) {
        match event {
            MigrationEvent::Started { plan_id, resumed } => {
                if resumed {
                    info!("[Event] Migration {} resumed", plan_id);
                } else {
                    info!("[Event] Migration {} started", plan_id);
                }
            }
            MigrationEvent::ContentTypeBegun { content_type } => {
                info!("[Event] Migrating {}s", content_type);
            }
            MigrationEvent::ItemCompleted {
                content_type,
                source,
                destination,
            } => {
                debug!(
                    "[Event] {} {} migrated as {}",
                    content_type,
                    source,
                    destination.id()
                );
            }
            MigrationEvent::ItemSkipped { content_type, source } => {
                debug!("[Event] {} {} skipped by filter", content_type, source);
            }
            MigrationEvent::ItemFailed {
                content_type,
                source,
                step,
                error,
            } => {
                warn!(
                    "[Event] {} {} failed during {}: {}",
                    content_type, source, step, error
                );
            }
            MigrationEvent::ContentTypeCompleted { report } => {
                info!(
                    "[Event] {}s done: {} migrated, {} already done, {} skipped, {} failed",
                    report.content_type,
                    report.completed,
                    report.already_completed,
                    report.skipped,
                    report.failed
                );
                if let Some(listing_error) = &report.listing_error {
                    error!(
                        "[Event] Listing {}s failed: {}",
                        report.content_type, listing_error
                    );
                }
            }
            MigrationEvent::Completed { status } => match status {
                MigrationRunStatus::Completed => info!("[Event] Migration completed successfully"),
                MigrationRunStatus::CompletedWithErrors => {
                    warn!("[Event] Migration completed with errors")
                }
                MigrationRunStatus::Failed => error!("[Event] Migration failed"),
                MigrationRunStatus::Canceled => warn!("[Event] Migration canceled"),
            },
        }
    }
}
