//! Manifest persistence, keyed by migration plan

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use super::manifest::Manifest;
use crate::services::errors::StorageError;

#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// The saved manifest of `plan_id`, or `None` when the plan never ran
    async fn load(&self, plan_id: &str) -> Result<Option<Manifest>, StorageError>;

    async fn save(&self, manifest: &Manifest) -> Result<(), StorageError>;

    async fn delete(&self, plan_id: &str) -> Result<(), StorageError>;
}

/// One `<plan_id>.json` file per plan in a directory
///
/// Saves write a sibling temp file and rename it over the old one, so a
/// crash mid-save leaves the previous manifest intact.
#[derive(Debug, Clone)]
pub struct JsonFileManifestStore {
    directory: PathBuf,
}

impl JsonFileManifestStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, plan_id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", sanitize_plan_id(plan_id)))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Plan ids become file names; keep them to a portable character set
fn sanitize_plan_id(plan_id: &str) -> String {
    plan_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn io_error(operation: &str, path: &Path, error: std::io::Error) -> StorageError {
    StorageError::Io {
        operation: format!("{} {}", operation, path.display()),
        reason: error.to_string(),
    }
}

#[async_trait]
impl ManifestStore for JsonFileManifestStore {
    async fn load(&self, plan_id: &str) -> Result<Option<Manifest>, StorageError> {
        let path = self.path_for(plan_id);
        let json = match tokio::fs::read(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("[ManifestStore] No manifest at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(io_error("read", &path, e)),
        };

        let manifest: Manifest = serde_json::from_slice(&json).map_err(|e| StorageError::Corrupt {
            reason: format!("{}: {}", path.display(), e),
        })?;
        info!(
            "[ManifestStore] Loaded manifest {} ({} entries)",
            manifest.plan_id(),
            manifest.len()
        );
        Ok(Some(manifest.reindex()))
    }

    async fn save(&self, manifest: &Manifest) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| io_error("create", &self.directory, e))?;

        let path = self.path_for(manifest.plan_id());
        let temp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(manifest).map_err(|e| StorageError::Corrupt {
            reason: format!("failed to serialize manifest: {}", e),
        })?;

        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| io_error("write", &temp, e))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| io_error("rename", &path, e))?;

        debug!(
            "[ManifestStore] Saved manifest {} to {}",
            manifest.plan_id(),
            path.display()
        );
        Ok(())
    }

    async fn delete(&self, plan_id: &str) -> Result<(), StorageError> {
        let path = self.path_for(plan_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", &path, e)),
        }
    }
}

/// Keeps manifests for the life of the process
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    manifests: Mutex<HashMap<String, Manifest>>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn load(&self, plan_id: &str) -> Result<Option<Manifest>, StorageError> {
        Ok(self
            .manifests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plan_id)
            .cloned())
    }

    async fn save(&self, manifest: &Manifest) -> Result<(), StorageError> {
        self.manifests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(manifest.plan_id().to_string(), manifest.clone());
        Ok(())
    }

    async fn delete(&self, plan_id: &str) -> Result<(), StorageError> {
        self.manifests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(plan_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::migration::manifest::MigrationStatus;
    use crate::services::content::{ContentLocation, ContentReference, ContentType};
    use uuid::Uuid;

    fn manifest_with_entry(plan_id: &str) -> (Manifest, ContentReference) {
        let mut manifest = Manifest::new(plan_id);
        let source = ContentReference::new(
            Uuid::new_v4(),
            "Finance",
            ContentLocation::new(["Finance"]),
        );
        let entry = manifest.get_or_insert(ContentType::Project, &source);
        entry.begin_pull().unwrap();
        entry.begin_transform().unwrap();
        entry.begin_publish().unwrap();
        entry
            .complete(ContentReference::new(
                Uuid::new_v4(),
                "Finance",
                ContentLocation::new(["Finance"]),
            ))
            .unwrap();
        (manifest, source)
    }

    #[tokio::test]
    async fn test_json_store_round_trips_and_reindexes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = JsonFileManifestStore::new(dir.path());
        let (manifest, source) = manifest_with_entry("nightly/finance");

        store.save(&manifest).await?;
        assert!(dir.path().join("nightly_finance.json").exists());
        assert!(!dir.path().join("nightly_finance.json.tmp").exists());

        let loaded = store.load("nightly/finance").await?.expect("manifest saved");
        let entry = loaded
            .entry(ContentType::Project, source.id())
            .expect("entry indexed");
        assert_eq!(entry.status(), MigrationStatus::Completed);
        assert_eq!(entry.destination().map(|d| d.name()), Some("Finance"));
        Ok(())
    }

    #[tokio::test]
    async fn test_json_store_missing_plan_is_none() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = JsonFileManifestStore::new(dir.path().join("not-created-yet"));

        assert!(store.load("plan").await?.is_none());
        store.delete("plan").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_json_store_reports_corruption() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = JsonFileManifestStore::new(dir.path());
        tokio::fs::write(store.path_for("plan"), b"{ not json").await?;

        let outcome = store.load("plan").await;

        assert!(matches!(outcome, Err(StorageError::Corrupt { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_store_keeps_a_copy() {
        let store = MemoryManifestStore::new();
        let (manifest, source) = manifest_with_entry("plan");
        store.save(&manifest).await.unwrap();

        let loaded = store.load("plan").await.unwrap().unwrap();
        assert!(loaded.destination_for(ContentType::Project, source.id()).is_some());

        store.delete("plan").await.unwrap();
        assert!(store.load("plan").await.unwrap().is_none());
    }
}
