//! Migration orchestrator - runs a plan's content types stage by stage

use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::manifest::{Manifest, SharedManifest};
use super::mapping::ManifestDestinationFinder;
use super::pipeline::RunContext;
use super::plan::MigrationPlan;
use super::progress::{
    ContentTypeReport, LoggingEventHandler, MigrationEvent, MigrationEventHandler, MigrationReport,
    MigrationRunStatus,
};
use super::storage::ManifestStore;
use crate::services::config::{ConfigReader, ErrorPolicy};
use crate::services::content::ContentType;
use crate::services::errors::{MigrationError, MigrationResult};

/// Runs a [`MigrationPlan`] against its saved manifest
///
/// Stages run in dependency order; the types inside one stage run together.
/// Every stage finishes before the next begins, so dependents only publish
/// once what they reference has reached a terminal state.
pub struct Migrator {
    plan: MigrationPlan,
    store: Arc<dyn ManifestStore>,
    config: Arc<dyn ConfigReader>,
    events: Arc<dyn MigrationEventHandler>,
}

impl Migrator {
    pub fn new(plan: MigrationPlan, store: Arc<dyn ManifestStore>, config: Arc<dyn ConfigReader>) -> Self {
        Self {
            plan,
            store,
            config,
            events: Arc::new(LoggingEventHandler),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn MigrationEventHandler>) -> Self {
        self.events = events;
        self
    }

    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    /// A saved manifest exists with items still to do
    pub async fn can_resume(&self) -> MigrationResult<bool> {
        let Some(manifest) = self.store.load(self.plan.id()).await? else {
            return Ok(false);
        };
        let summary = manifest.summary();
        Ok(summary.completed < summary.total())
    }

    /// Run every registered content type
    ///
    /// The manifest is saved after each stage and once more at the end, also
    /// when the run stops early or is canceled. Only manifest and
    /// configuration problems fail the run itself; item failures are in the
    /// report.
    #[instrument(skip_all, fields(plan = %self.plan.id()), err)]
    pub async fn run(&self, cancel: &CancellationToken) -> MigrationResult<MigrationReport> {
        let started = Instant::now();
        let config = self.config.get();
        config.validate().map_err(|value| MigrationError::Configuration {
            field: "migration".to_string(),
            value,
        })?;

        let (manifest, resumed) = match self.store.load(self.plan.id()).await? {
            Some(mut manifest) => {
                manifest.recover_interrupted();
                (manifest, true)
            }
            None => (Manifest::new(self.plan.id()), false),
        };
        let manifest = SharedManifest::new(manifest);
        let run = RunContext {
            manifest: manifest.clone(),
            finder: Arc::new(ManifestDestinationFinder::new(
                manifest.clone(),
                self.plan.destination().clone(),
            )),
            events: self.events.clone(),
            batch: config.batch.clone(),
            error_policy: config.error_policy,
        };

        self.events.handle_event(MigrationEvent::Started {
            plan_id: self.plan.id().to_string(),
            resumed,
        });

        let mut reports: Vec<ContentTypeReport> = Vec::new();
        let mut halted = false;
        for stage in ContentType::MIGRATION_STAGES {
            if halted || cancel.is_cancelled() {
                break;
            }
            let migrations: Vec<_> = stage
                .iter()
                .filter_map(|content_type| self.plan.migration(*content_type))
                .collect();
            if migrations.is_empty() {
                continue;
            }

            let stage_reports = join_all(
                migrations
                    .iter()
                    .map(|migration| migration.migrate(&run, cancel)),
            )
            .await;
            self.save(&manifest).await?;

            for report in stage_reports {
                if report.stopped
                    || (report.listing_error.is_some() && run.error_policy == ErrorPolicy::StopOnFirstError)
                {
                    halted = true;
                }
                self.events.handle_event(MigrationEvent::ContentTypeCompleted {
                    report: report.clone(),
                });
                reports.push(report);
            }
        }
        self.save(&manifest).await?;

        let status = if cancel.is_cancelled() {
            MigrationRunStatus::Canceled
        } else if halted {
            MigrationRunStatus::Failed
        } else if reports.iter().any(ContentTypeReport::has_errors) {
            MigrationRunStatus::CompletedWithErrors
        } else {
            MigrationRunStatus::Completed
        };
        self.events.handle_event(MigrationEvent::Completed { status });

        let summary = manifest.lock().summary();
        info!(
            "[Migrator] Plan {} finished as {:?}: {} completed, {} failed, {} skipped",
            self.plan.id(),
            status,
            summary.completed,
            summary.failed,
            summary.skipped
        );
        Ok(MigrationReport {
            plan_id: self.plan.id().to_string(),
            status,
            types: reports,
            summary,
            elapsed: started.elapsed(),
        })
    }

    async fn save(&self, manifest: &SharedManifest) -> MigrationResult<()> {
        let snapshot = manifest.snapshot();
        self.store.save(&snapshot).await.map_err(|e| {
            error!("[Migrator] Failed to save manifest {}: {}", snapshot.plan_id(), e);
            MigrationError::from(e).with_context("Failed to save manifest")
        })
    }

    /// Forget the saved manifest so the next run starts over
    pub async fn reset(&self) -> MigrationResult<()> {
        warn!("[Migrator] Discarding manifest of plan {}", self.plan.id());
        self.store.delete(self.plan.id()).await?;
        Ok(())
    }
}
