//! Per-type progress counters and run reports

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::features::migration::manifest::ManifestSummary;
use crate::services::content::ContentType;
use crate::utils::serialization::duration_millis;

/// Outcome counts of one content type in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeReport {
    pub content_type: ContentType,
    pub completed: usize,
    /// Completed by an earlier run and left alone
    pub already_completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub listing_error: Option<String>,
    /// The type stopped before every item was tried
    pub stopped: bool,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl ContentTypeReport {
    pub fn has_errors(&self) -> bool {
        self.failed > 0 || self.listing_error.is_some()
    }

    pub fn items_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.completed as f64 / seconds
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationRunStatus {
    Completed,
    CompletedWithErrors,
    /// Stopped on an error under the stop-on-first-error policy
    Failed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub plan_id: String,
    pub status: MigrationRunStatus,
    pub types: Vec<ContentTypeReport>,
    pub summary: ManifestSummary,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl MigrationReport {
    pub fn report_for(&self, content_type: ContentType) -> Option<&ContentTypeReport> {
        self.types.iter().find(|r| r.content_type == content_type)
    }

    pub fn is_success(&self) -> bool {
        self.status == MigrationRunStatus::Completed
    }
}

/// Counts item outcomes of one content type as they arrive
#[derive(Debug)]
pub struct ProgressTracker {
    content_type: ContentType,
    started: Instant,
    completed: AtomicUsize,
    already_completed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    stopped: AtomicBool,
    listing_error: Mutex<Option<String>>,
}

impl ProgressTracker {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            started: Instant::now(),
            completed: AtomicUsize::new(0),
            already_completed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            listing_error: Mutex::new(None),
        }
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_already_completed(&self) {
        self.already_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listing_error(&self, message: impl Into<String>) {
        let mut listing_error = self
            .listing_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listing_error.get_or_insert_with(|| message.into());
    }

    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    /// Items that reached a terminal state in this run
    pub fn processed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
            + self.already_completed.load(Ordering::Relaxed)
            + self.skipped.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> ContentTypeReport {
        ContentTypeReport {
            content_type: self.content_type,
            completed: self.completed.load(Ordering::Relaxed),
            already_completed: self.already_completed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            listing_error: self
                .listing_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            stopped: self.stopped.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}
