//! Durable per-run record of what happened to every source item

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;
use uuid::Uuid;

use crate::services::content::{ContentReference, ContentType};
use crate::services::errors::{MigrationError, MigrationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationStatus {
    Pending,
    Pulling,
    Transforming,
    Publishing,
    Completed,
    Failed,
    Skipped,
}

impl MigrationStatus {
    /// Pulling, transforming or publishing
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Pulling | MigrationStatus::Transforming | MigrationStatus::Publishing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed | MigrationStatus::Failed | MigrationStatus::Skipped
        )
    }

    pub fn can_transition_to(&self, next: MigrationStatus) -> bool {
        use MigrationStatus::*;
        match (self, next) {
            (Pending, Pulling) | (Pulling, Transforming) | (Transforming, Publishing) => true,
            (Publishing, Completed) => true,
            (Pending | Pulling | Transforming | Publishing, Failed) => true,
            (Pending, Skipped) => true,
            // Anything short of Completed may be retried from the start
            (Failed | Skipped | Pulling | Transforming | Publishing, Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The step an item was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationStep {
    Filter,
    Pull,
    Transform,
    Publish,
}

impl MigrationStep {
    /// Step that is running while an entry is in `status`
    pub fn for_status(status: MigrationStatus) -> Self {
        match status {
            MigrationStatus::Pending | MigrationStatus::Skipped => MigrationStep::Filter,
            MigrationStatus::Pulling => MigrationStep::Pull,
            MigrationStatus::Transforming => MigrationStep::Transform,
            _ => MigrationStep::Publish,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestError {
    pub step: MigrationStep,
    pub message: String,
}

/// One source item and its progress
///
/// The destination reference is present exactly when the status is
/// `Completed`; the transition methods are the only way to change either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    content_type: ContentType,
    source: ContentReference,
    destination: Option<ContentReference>,
    status: MigrationStatus,
    error: Option<ManifestError>,
    attempts: u32,
    updated_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn new(content_type: ContentType, source: ContentReference) -> Self {
        Self {
            content_type,
            source,
            destination: None,
            status: MigrationStatus::Pending,
            error: None,
            attempts: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn source(&self) -> &ContentReference {
        &self.source
    }

    pub fn destination(&self) -> Option<&ContentReference> {
        self.destination.as_ref()
    }

    pub fn status(&self) -> MigrationStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ManifestError> {
        self.error.as_ref()
    }

    /// Number of times a pull was started
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn begin_pull(&mut self) -> MigrationResult<()> {
        self.transition(MigrationStatus::Pulling)?;
        self.attempts += 1;
        Ok(())
    }

    pub fn begin_transform(&mut self) -> MigrationResult<()> {
        self.transition(MigrationStatus::Transforming)
    }

    pub fn begin_publish(&mut self) -> MigrationResult<()> {
        self.transition(MigrationStatus::Publishing)
    }

    pub fn complete(&mut self, destination: ContentReference) -> MigrationResult<()> {
        self.transition(MigrationStatus::Completed)?;
        self.destination = Some(destination);
        Ok(())
    }

    /// Record a failure in the current step
    pub fn fail(&mut self, message: impl Into<String>) -> MigrationResult<()> {
        let step = MigrationStep::for_status(self.status);
        self.transition(MigrationStatus::Failed)?;
        self.error = Some(ManifestError {
            step,
            message: message.into(),
        });
        Ok(())
    }

    pub fn skip(&mut self) -> MigrationResult<()> {
        self.transition(MigrationStatus::Skipped)
    }

    /// Back to `Pending`, keeping the attempt count; a no-op when already pending
    pub fn restart(&mut self) -> MigrationResult<()> {
        if self.status == MigrationStatus::Pending {
            return Ok(());
        }
        self.transition(MigrationStatus::Pending)?;
        self.error = None;
        Ok(())
    }

    fn transition(&mut self, next: MigrationStatus) -> MigrationResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(MigrationError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Entry counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ManifestSummary {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed + self.skipped
    }
}

/// Entries of one migration plan, in discovery order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    plan_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    entries: Vec<ManifestEntry>,
    #[serde(skip)]
    index: HashMap<(ContentType, Uuid), usize>,
}

impl Manifest {
    pub fn new(plan_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            plan_id: plan_id.into(),
            created_at: now,
            updated_at: now,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuild the lookup index after deserializing
    pub(crate) fn reindex(mut self) -> Self {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| ((entry.content_type, entry.source.id()), i))
            .collect();
        self
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn entry(&self, content_type: ContentType, source_id: Uuid) -> Option<&ManifestEntry> {
        self.index
            .get(&(content_type, source_id))
            .map(|&i| &self.entries[i])
    }

    pub fn entry_mut(&mut self, content_type: ContentType, source_id: Uuid) -> Option<&mut ManifestEntry> {
        self.updated_at = Utc::now();
        match self.index.get(&(content_type, source_id)) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    /// The entry for `source`, created as `Pending` on first sight
    pub fn get_or_insert(&mut self, content_type: ContentType, source: &ContentReference) -> &mut ManifestEntry {
        self.updated_at = Utc::now();
        let key = (content_type, source.id());
        let i = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.entries
                    .push(ManifestEntry::new(content_type, source.clone()));
                let i = self.entries.len() - 1;
                self.index.insert(key, i);
                i
            }
        };
        &mut self.entries[i]
    }

    pub fn destination_for(&self, content_type: ContentType, source_id: Uuid) -> Option<&ContentReference> {
        self.entry(content_type, source_id)
            .and_then(ManifestEntry::destination)
    }

    pub fn entries_for(&self, content_type: ContentType) -> impl Iterator<Item = &ManifestEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.content_type == content_type)
    }

    pub fn failed_entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.status == MigrationStatus::Failed)
    }

    pub fn summary(&self) -> ManifestSummary {
        self.entries
            .iter()
            .fold(ManifestSummary::default(), |mut summary, entry| {
                match entry.status {
                    MigrationStatus::Pending => summary.pending += 1,
                    MigrationStatus::Completed => summary.completed += 1,
                    MigrationStatus::Failed => summary.failed += 1,
                    MigrationStatus::Skipped => summary.skipped += 1,
                    _ => summary.in_progress += 1,
                }
                summary
            })
    }

    /// Entries left mid-flight by an interrupted run go back to `Pending`
    pub fn recover_interrupted(&mut self) -> usize {
        let mut recovered = 0;
        for entry in self.entries.iter_mut().filter(|e| e.status.is_in_progress()) {
            if entry.restart().is_ok() {
                recovered += 1;
            }
        }
        if recovered > 0 {
            warn!(
                "[Manifest] Recovered {} interrupted entries in plan {}",
                recovered, self.plan_id
            );
            self.updated_at = Utc::now();
        }
        recovered
    }
}

/// Manifest shared by the items of a run
///
/// Locks are held only for in-memory bookkeeping, never across an await.
#[derive(Debug, Clone)]
pub struct SharedManifest {
    inner: Arc<Mutex<Manifest>>,
}

impl SharedManifest {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manifest)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Manifest> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Manifest {
        self.lock().clone()
    }

    /// Apply `change` to an existing entry
    pub fn update<T>(
        &self,
        content_type: ContentType,
        source_id: Uuid,
        change: impl FnOnce(&mut ManifestEntry) -> MigrationResult<T>,
    ) -> MigrationResult<T> {
        let mut manifest = self.lock();
        let entry = manifest
            .entry_mut(content_type, source_id)
            .ok_or(MigrationError::ReferenceNotFound {
                content_type,
                source_id,
            })?;
        change(entry)
    }
}
