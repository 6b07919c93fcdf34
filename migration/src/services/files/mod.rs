//! Content file store boundary
//!
//! Pulled workbook and data source files are parked in a [`ContentFileStore`]
//! between pull and publish. A pull that fails after the file was created must
//! release it through [`release_on_failure`]; a successful migration releases
//! it after publish.

use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::content::ContentReference;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileStoreError {
    #[error("File store I/O failed: {reason}")]
    Io { reason: String },

    #[error("Content file {id} is not in the store")]
    NotFound { id: Uuid },
}

/// Handle to a file parked in a [`ContentFileStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFileHandle {
    pub id: Uuid,
    /// File name as served by the source, extension included
    pub original_file_name: String,
    pub size: u64,
}

impl ContentFileHandle {
    /// Extension without the dot, lower-cased
    pub fn extension(&self) -> Option<String> {
        self.original_file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

#[async_trait]
pub trait ContentFileStore: Send + Sync {
    async fn create(
        &self,
        item: &ContentReference,
        file_name: &str,
        content: Bytes,
    ) -> Result<ContentFileHandle, FileStoreError>;

    async fn open_read(&self, handle: &ContentFileHandle) -> Result<Bytes, FileStoreError>;

    /// Releasing a handle twice is not an error
    async fn release(&self, handle: &ContentFileHandle) -> Result<(), FileStoreError>;
}

/// Run `operation`; if it fails, release `handle` before returning the error
pub async fn release_on_failure<T, Fut>(
    store: &dyn ContentFileStore,
    handle: &ContentFileHandle,
    operation: Fut,
) -> ClientResult<T>
where
    Fut: Future<Output = ClientResult<T>>,
{
    match operation.await {
        Ok(value) => Ok(value),
        Err(err) => {
            debug!(
                "[FileStore] Releasing {} after failed pull: {}",
                handle.original_file_name, err
            );
            if let Err(release_err) = store.release(handle).await {
                warn!(
                    "[FileStore] Failed to release {}: {}",
                    handle.original_file_name, release_err
                );
            }
            Err(err)
        }
    }
}

/// File store that keeps content in memory
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<Uuid, Bytes>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently held
    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentFileStore for MemoryFileStore {
    async fn create(
        &self,
        item: &ContentReference,
        file_name: &str,
        content: Bytes,
    ) -> Result<ContentFileHandle, FileStoreError> {
        let handle = ContentFileHandle {
            id: Uuid::new_v4(),
            original_file_name: file_name.to_string(),
            size: content.len() as u64,
        };
        debug!(
            "[FileStore] Stored {} for {} ({} bytes)",
            file_name,
            item,
            handle.size
        );
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, content);
        Ok(handle)
    }

    async fn open_read(&self, handle: &ContentFileHandle) -> Result<Bytes, FileStoreError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle.id)
            .cloned()
            .ok_or(FileStoreError::NotFound { id: handle.id })
    }

    async fn release(&self, handle: &ContentFileHandle) -> Result<(), FileStoreError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id);
        Ok(())
    }
}

impl From<FileStoreError> for crate::services::errors::MigrationError {
    fn from(err: FileStoreError) -> Self {
        ClientError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::content::ContentLocation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts releases so tests can assert the cleanup contract
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryFileStore,
        releases: AtomicUsize,
    }

    #[async_trait]
    impl ContentFileStore for CountingStore {
        async fn create(
            &self,
            item: &ContentReference,
            file_name: &str,
            content: Bytes,
        ) -> Result<ContentFileHandle, FileStoreError> {
            self.inner.create(item, file_name, content).await
        }

        async fn open_read(&self, handle: &ContentFileHandle) -> Result<Bytes, FileStoreError> {
            self.inner.open_read(handle).await
        }

        async fn release(&self, handle: &ContentFileHandle) -> Result<(), FileStoreError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.inner.release(handle).await
        }
    }

    fn item() -> ContentReference {
        ContentReference::new(
            Uuid::new_v4(),
            "Revenue",
            ContentLocation::new(["Finance", "Revenue"]),
        )
    }

    #[tokio::test]
    async fn test_failed_operation_releases_exactly_once() {
        let store = CountingStore::default();
        let handle = store
            .create(&item(), "Revenue.twbx", Bytes::from_static(b"zip"))
            .await
            .unwrap();

        let result: ClientResult<()> = release_on_failure(&store, &handle, async {
            Err(ClientError::NotFound {
                resource: "/workbooks/1/connections".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(ClientError::NotFound { .. })));
        assert_eq!(store.releases.load(Ordering::SeqCst), 1);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_successful_operation_keeps_file() {
        let store = CountingStore::default();
        let handle = store
            .create(&item(), "Revenue.twbx", Bytes::from_static(b"zip"))
            .await
            .unwrap();

        let value = release_on_failure(&store, &handle, async { Ok(42) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(store.releases.load(Ordering::SeqCst), 0);
        assert_eq!(
            store.open_read(&handle).await.unwrap(),
            Bytes::from_static(b"zip")
        );
    }

    #[test]
    fn test_extension() {
        let handle = ContentFileHandle {
            id: Uuid::nil(),
            original_file_name: "Sales Data.TDSX".to_string(),
            size: 0,
        };
        assert_eq!(handle.extension().as_deref(), Some("tdsx"));
    }
}
