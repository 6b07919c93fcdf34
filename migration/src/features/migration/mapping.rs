//! Source-to-destination reference resolution

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::hooks::{ContentMapping, HookContext};
use super::manifest::SharedManifest;
use crate::services::client::api::SiteApiClient;
use crate::services::client::errors::ClientResult;
use crate::services::content::{
    ContentItem, ContentLocation, ContentReference, ContentType, ReferenceMap, WithReferences,
};
use crate::services::errors::{MigrationError, MigrationResult};

/// Resolves a source item to its counterpart at the destination
#[async_trait]
pub trait DestinationFinder: Send + Sync {
    async fn find(
        &self,
        content_type: ContentType,
        source_id: Uuid,
        cancel: &CancellationToken,
    ) -> MigrationResult<Option<ContentReference>>;
}

/// Looks an item up at the destination by its location
#[async_trait]
pub trait DestinationLookup: Send + Sync {
    async fn find_by_location(
        &self,
        content_type: ContentType,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<ContentReference>>;
}

#[async_trait]
impl DestinationLookup for SiteApiClient {
    async fn find_by_location(
        &self,
        content_type: ContentType,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> ClientResult<Option<ContentReference>> {
        match content_type {
            ContentType::User => Ok(self
                .users()
                .find_by_location(location, cancel)
                .await?
                .map(|user| user.reference())),
            ContentType::Group => Ok(self
                .groups()
                .find_by_location(location, cancel)
                .await?
                .map(|group| group.reference())),
            ContentType::Project => self.projects().find_by_location(location, cancel).await,
            // Published content is only ever reached through the manifest
            ContentType::DataSource | ContentType::Workbook | ContentType::View => Ok(None),
        }
    }
}

/// Completed manifest entries first, then a destination lookup by the source
/// location recorded in the manifest
///
/// Hits are cached for the run. Misses are not, since the item may complete
/// later in the same run.
pub struct ManifestDestinationFinder {
    manifest: SharedManifest,
    destination: Arc<dyn DestinationLookup>,
    cache: Mutex<HashMap<(ContentType, Uuid), ContentReference>>,
}

impl ManifestDestinationFinder {
    pub fn new(manifest: SharedManifest, destination: Arc<dyn DestinationLookup>) -> Self {
        Self {
            manifest,
            destination,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &(ContentType, Uuid)) -> Option<ContentReference> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn remember(&self, key: (ContentType, Uuid), destination: ContentReference) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, destination);
    }
}

#[async_trait]
impl DestinationFinder for ManifestDestinationFinder {
    async fn find(
        &self,
        content_type: ContentType,
        source_id: Uuid,
        cancel: &CancellationToken,
    ) -> MigrationResult<Option<ContentReference>> {
        let key = (content_type, source_id);
        if let Some(found) = self.cached(&key) {
            return Ok(Some(found));
        }

        let (destination, location) = {
            let manifest = self.manifest.lock();
            match manifest.entry(content_type, source_id) {
                Some(entry) => (
                    entry.destination().cloned(),
                    Some(entry.source().location().clone()),
                ),
                None => (None, None),
            }
        };

        let found = match (destination, location) {
            (Some(destination), _) => Some(destination),
            (None, Some(location)) => {
                self.destination
                    .find_by_location(content_type, &location, cancel)
                    .await?
            }
            (None, None) => {
                debug!("[Mapping] {} {} was never listed", content_type, source_id);
                None
            }
        };

        if let Some(found) = &found {
            self.remember(key, found.clone());
        }
        Ok(found)
    }
}

/// Rewrites the references of a pulled item to destination ids
///
/// A required reference that does not resolve fails the item; an optional
/// one is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceMapping;

#[async_trait]
impl<P> ContentMapping<P> for ReferenceMapping
where
    P: WithReferences + Send + Sync,
{
    async fn map(&self, item: &mut P, context: &HookContext<'_>) -> MigrationResult<()> {
        let mut resolved = ReferenceMap::new();

        for (content_type, source_id) in item.required_references() {
            let found = context
                .finder
                .find(content_type, source_id, context.cancel)
                .await?
                .ok_or(MigrationError::ReferenceNotFound {
                    content_type,
                    source_id,
                })?;
            resolved.insert((content_type, source_id), found);
        }
        for (content_type, source_id) in item.optional_references() {
            if let Some(found) = context.finder.find(content_type, source_id, context.cancel).await? {
                resolved.insert((content_type, source_id), found);
            }
        }

        item.apply_references(&resolved);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::migration::manifest::Manifest;
    use crate::services::content::{Permissions, Project, PublishableProject};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Finder over a fixed map that counts lookups
    #[derive(Default)]
    pub(crate) struct StaticFinder {
        pub(crate) known: HashMap<(ContentType, Uuid), ContentReference>,
        pub(crate) lookups: AtomicUsize,
    }

    impl StaticFinder {
        pub(crate) fn with(mut self, content_type: ContentType, source_id: Uuid, destination: ContentReference) -> Self {
            self.known.insert((content_type, source_id), destination);
            self
        }

        pub(crate) fn lookup_count(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DestinationFinder for StaticFinder {
        async fn find(
            &self,
            content_type: ContentType,
            source_id: Uuid,
            _cancel: &CancellationToken,
        ) -> MigrationResult<Option<ContentReference>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.known.get(&(content_type, source_id)).cloned())
        }
    }

    #[derive(Default)]
    struct CountingLookup {
        calls: AtomicUsize,
        answer: Option<ContentReference>,
    }

    #[async_trait]
    impl DestinationLookup for CountingLookup {
        async fn find_by_location(
            &self,
            _content_type: ContentType,
            _location: &ContentLocation,
            _cancel: &CancellationToken,
        ) -> ClientResult<Option<ContentReference>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    pub(crate) fn reference(name: &str, location: &[&str]) -> ContentReference {
        ContentReference::new(Uuid::new_v4(), name, ContentLocation::new(location.iter().copied()))
    }

    #[tokio::test]
    async fn test_completed_entry_wins_without_lookup() {
        let source = reference("alice", &["local", "alice"]);
        let destination = reference("alice", &["local", "alice"]);
        let mut manifest = Manifest::new("plan");
        let entry = manifest.get_or_insert(ContentType::User, &source);
        entry.begin_pull().unwrap();
        entry.begin_transform().unwrap();
        entry.begin_publish().unwrap();
        entry.complete(destination.clone()).unwrap();

        let lookup = Arc::new(CountingLookup::default());
        let finder = ManifestDestinationFinder::new(SharedManifest::new(manifest), lookup.clone());

        let found = finder
            .find(ContentType::User, source.id(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(found, Some(destination));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unfinished_entry_falls_back_to_location_and_caches_hits() {
        let source = reference("alice", &["corp", "alice"]);
        let existing = reference("alice", &["corp", "alice"]);
        let mut manifest = Manifest::new("plan");
        manifest.get_or_insert(ContentType::User, &source).skip().unwrap();

        let lookup = Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
            answer: Some(existing.clone()),
        });
        let finder = ManifestDestinationFinder::new(SharedManifest::new(manifest), lookup.clone());
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            let found = finder.find(ContentType::User, source.id(), &cancel).await.unwrap();
            assert_eq!(found.as_ref(), Some(&existing));
        }
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_never_listed_is_none() {
        let lookup = Arc::new(CountingLookup::default());
        let finder = ManifestDestinationFinder::new(SharedManifest::new(Manifest::new("plan")), lookup.clone());

        let found = finder
            .find(ContentType::Group, Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    fn project(owner: &ContentReference, parent: Option<&ContentReference>) -> PublishableProject {
        PublishableProject {
            project: Project {
                id: Uuid::new_v4(),
                name: "Quarterly".to_string(),
                description: None,
                parent: parent.cloned(),
                owner: owner.clone(),
                content_permissions: None,
                location: ContentLocation::new(["Finance", "Quarterly"]),
            },
            permissions: Permissions::default(),
        }
    }

    #[tokio::test]
    async fn test_reference_mapping_rewrites_owner_and_parent() {
        let owner = reference("alice", &["local", "alice"]);
        let parent = reference("Finance", &["Finance"]);
        let new_owner = reference("alice", &["local", "alice"]);
        let new_parent = reference("Finance", &["Finance"]);
        let finder = StaticFinder::default()
            .with(ContentType::User, owner.id(), new_owner.clone())
            .with(ContentType::Project, parent.id(), new_parent.clone());
        let cancel = CancellationToken::new();
        let context = HookContext {
            content_type: ContentType::Project,
            finder: &finder,
            cancel: &cancel,
        };

        let mut item = project(&owner, Some(&parent));
        ReferenceMapping.map(&mut item, &context).await.unwrap();

        assert_eq!(item.project.owner, new_owner);
        assert_eq!(item.project.parent, Some(new_parent));
    }

    #[tokio::test]
    async fn test_reference_mapping_fails_on_missing_owner() {
        let owner = reference("alice", &["local", "alice"]);
        let finder = StaticFinder::default();
        let cancel = CancellationToken::new();
        let context = HookContext {
            content_type: ContentType::Project,
            finder: &finder,
            cancel: &cancel,
        };

        let mut item = project(&owner, None);
        let outcome = ReferenceMapping.map(&mut item, &context).await;

        assert!(matches!(
            outcome,
            Err(MigrationError::ReferenceNotFound {
                content_type: ContentType::User,
                source_id
            }) if source_id == owner.id()
        ));
        assert_eq!(item.project.owner, owner);
    }
}
