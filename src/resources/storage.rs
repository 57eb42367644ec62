//! Storage port used by resource discovery.
//!
//! The host platform owns the real file system and media indexer; this module
//! defines the operations discovery needs plus a `std::fs` implementation for
//! desktop runs and tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::oneshot;

use crate::error::StorageError;

/// Raw directory entry as reported by storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Entry name bytes; not guaranteed to be UTF-8
    pub name: Vec<u8>,
    /// Opaque location of the entry
    pub location: String,
}

impl StorageEntry {
    pub fn new(name: impl Into<Vec<u8>>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Operations resource discovery performs against backing storage.
///
/// Implementations must be callable from any thread. `await_indexed` resolves
/// once the host confirms that a freshly created file is visible to external
/// tooling.
pub trait Storage: Send + Sync {
    /// Root under which the resource directory lives
    fn root(&self) -> PathBuf;
    fn is_readable(&self) -> bool;
    fn is_writable(&self) -> bool;
    fn exists(&self, path: &Path) -> bool;
    fn create_directory(&self, path: &Path) -> std::io::Result<()>;
    fn create_file(&self, path: &Path) -> std::io::Result<()>;
    fn list_entries(&self, dir: &Path) -> Result<Vec<StorageEntry>, StorageError>;
    fn await_indexed(&self, path: &Path) -> BoxFuture<'static, Result<(), StorageError>>;
}

/// Single-shot indexing confirmations keyed by path.
///
/// Discovery registers a waiter for the marker file; the host calls
/// [`IndexingRegistry::confirm`] from its media-scanner callback.
#[derive(Default)]
pub struct IndexingRegistry {
    waiters: Mutex<HashMap<PathBuf, oneshot::Sender<Result<(), String>>>>,
}

impl IndexingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `path`. A previous waiter for the same path is dropped.
    pub fn wait(&self, path: &Path) -> oneshot::Receiver<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.insert(path.to_path_buf(), tx);
        }
        rx
    }

    /// Deliver the host's confirmation. Returns false if nobody was waiting.
    pub fn confirm(&self, path: &Path, result: Result<(), String>) -> bool {
        let waiter = match self.waiters.lock() {
            Ok(mut waiters) => waiters.remove(path),
            Err(_) => None,
        };
        match waiter {
            Some(tx) => tx.send(result).is_ok(),
            None => {
                log::debug!("[Indexing] Confirmation for {:?} had no waiter", path);
                false
            }
        }
    }

    /// Paths the host still has to index
    pub fn pending(&self) -> Vec<PathBuf> {
        self.waiters
            .lock()
            .map(|waiters| waiters.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// `std::fs` backed storage
///
/// Without an [`IndexingRegistry`] indexing is confirmed immediately, which is
/// what desktop file systems need.
pub struct FsStorage {
    root: PathBuf,
    indexing: Option<Arc<IndexingRegistry>>,
    indexing_timeout: Duration,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexing: None,
            indexing_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_indexing(mut self, registry: Arc<IndexingRegistry>, timeout: Duration) -> Self {
        self.indexing = Some(registry);
        self.indexing_timeout = timeout;
        self
    }
}

impl Storage for FsStorage {
    fn root(&self) -> PathBuf {
        self.root.clone()
    }

    fn is_readable(&self) -> bool {
        fs::read_dir(&self.root).is_ok()
    }

    fn is_writable(&self) -> bool {
        fs::metadata(&self.root)
            .map(|meta| meta.is_dir() && !meta.permissions().readonly())
            .unwrap_or(false)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_directory(&self, path: &Path) -> std::io::Result<()> {
        fs::create_dir_all(path)
    }

    fn create_file(&self, path: &Path) -> std::io::Result<()> {
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map(|_| ())
    }

    fn list_entries(&self, dir: &Path) -> Result<Vec<StorageEntry>, StorageError> {
        let listing_failed = |err: std::io::Error| StorageError::ListingFailed {
            directory: dir.display().to_string(),
            reason: err.to_string(),
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(listing_failed)? {
            let entry = entry.map_err(listing_failed)?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            entries.push(StorageEntry {
                name: entry.file_name().as_encoded_bytes().to_vec(),
                location: entry.path().display().to_string(),
            });
        }
        Ok(entries)
    }

    fn await_indexed(&self, path: &Path) -> BoxFuture<'static, Result<(), StorageError>> {
        let Some(registry) = &self.indexing else {
            return future::ready(Ok(())).boxed();
        };

        let rx = registry.wait(path);
        let timeout = self.indexing_timeout;
        let path = path.display().to_string();

        async move {
            let indexing_failed = |reason: String| StorageError::IndexingFailed {
                path: path.clone(),
                reason,
            };
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(reason))) => Err(indexing_failed(reason)),
                Ok(Err(_)) => Err(indexing_failed("confirmation dropped".to_string())),
                Err(_) => Err(indexing_failed(format!(
                    "no confirmation within {}s",
                    timeout.as_secs()
                ))),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_storage_lists_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("chest.png"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let storage = FsStorage::new(dir.path());
        assert!(storage.is_readable());
        assert!(storage.is_writable());

        let entries = storage.list_entries(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, b"chest.png".to_vec());
    }

    #[test]
    fn test_fs_storage_missing_root() {
        let storage = FsStorage::new("/definitely/not/here");
        assert!(!storage.is_readable());
        assert!(!storage.is_writable());
        assert!(matches!(
            storage.list_entries(Path::new("/definitely/not/here")),
            Err(StorageError::ListingFailed { .. })
        ));
    }

    #[test]
    fn test_create_file_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        fs::write(&path, b"keep").unwrap();

        FsStorage::new(dir.path()).create_file(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"keep".to_vec());
    }

    #[tokio::test]
    async fn test_indexing_confirmed_by_host() {
        let registry = Arc::new(IndexingRegistry::new());
        let storage = FsStorage::new("/tmp")
            .with_indexing(Arc::clone(&registry), Duration::from_secs(5));
        let marker = Path::new("/tmp/instructions/.visible");

        let pending = storage.await_indexed(marker);
        assert_eq!(registry.pending(), vec![marker.to_path_buf()]);
        assert!(registry.confirm(marker, Ok(())));
        assert!(pending.await.is_ok());
        assert!(registry.pending().is_empty());
    }

    #[tokio::test]
    async fn test_indexing_failure_reported() {
        let registry = Arc::new(IndexingRegistry::new());
        let storage = FsStorage::new("/tmp")
            .with_indexing(Arc::clone(&registry), Duration::from_secs(5));
        let marker = Path::new("/tmp/instructions/.visible");

        let pending = storage.await_indexed(marker);
        registry.confirm(marker, Err("scanner unavailable".to_string()));
        match pending.await {
            Err(StorageError::IndexingFailed { reason, .. }) => {
                assert!(reason.contains("scanner unavailable"))
            }
            other => panic!("Expected IndexingFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_indexing_times_out() {
        let registry = Arc::new(IndexingRegistry::new());
        let storage =
            FsStorage::new("/tmp").with_indexing(registry, Duration::from_millis(10));

        let result = storage
            .await_indexed(Path::new("/tmp/instructions/.visible"))
            .await;
        assert!(matches!(result, Err(StorageError::IndexingFailed { .. })));
    }

    #[test]
    fn test_confirm_without_waiter() {
        let registry = IndexingRegistry::new();
        assert!(!registry.confirm(Path::new("/nowhere"), Ok(())));
    }
}
