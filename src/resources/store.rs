// InstructionStore: retried, single-flight discovery of instruction resources
//
// Single Responsibility: own the parsed resource snapshot
//
// The store hands out `Arc<ParsedResourceSet>` snapshots. The first caller
// starts discovery; callers arriving while it is in flight await the same
// shared future; once it succeeds every later caller gets the cached Arc
// without touching storage again. A failed discovery is not cached.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::config::{AppConfig, ResourceConfig};
use crate::error::{log_storage_error, StorageError};
use crate::retry::{exponential_backoff, with_retry};

use super::{ParsedResourceSet, ResourceParser, Storage};

type DiscoveryResult = Result<Arc<ParsedResourceSet>, StorageError>;
type DiscoveryFuture = Shared<BoxFuture<'static, DiscoveryResult>>;

enum StoreState {
    Empty,
    Discovering {
        generation: u64,
        future: DiscoveryFuture,
    },
    Ready(Arc<ParsedResourceSet>),
}

/// Owns resource discovery and the cached snapshot
///
/// # Example
/// ```ignore
/// let store = InstructionStore::new(Arc::new(FsStorage::new("/sdcard")), &config);
/// let resources = store.get_resources().await?;
/// for instruction in resources.instructions() { /* ... */ }
/// ```
pub struct InstructionStore {
    storage: Arc<dyn Storage>,
    parser: Arc<ResourceParser>,
    config: ResourceConfig,
    max_attempts: u32,
    state: Mutex<StoreState>,
    generation: Mutex<u64>,
}

impl InstructionStore {
    pub fn new(storage: Arc<dyn Storage>, config: &AppConfig) -> Self {
        Self {
            storage,
            parser: Arc::new(ResourceParser::from_config(&config.resources)),
            config: config.resources.clone(),
            max_attempts: config.retry.max_attempts,
            state: Mutex::new(StoreState::Empty),
            generation: Mutex::new(0),
        }
    }

    /// Directory the store scans
    pub fn resource_directory(&self) -> PathBuf {
        self.storage.root().join(&self.config.directory_name)
    }

    /// Get the parsed resources, discovering them on first use
    ///
    /// # Returns
    /// * `Ok(Arc<ParsedResourceSet>)` - Cached or freshly discovered snapshot
    /// * `Err(StorageError)` - Last failure after the retry ceiling was reached
    ///
    /// # Errors
    /// - Storage not readable
    /// - Directory missing and storage not writable, or directory creation failed
    /// - Marker file creation or indexing failed
    /// - Directory listing failed
    pub async fn get_resources(&self) -> DiscoveryResult {
        let (generation, future) = {
            let mut state = self.lock_state()?;
            match &*state {
                StoreState::Ready(snapshot) => return Ok(Arc::clone(snapshot)),
                StoreState::Discovering { generation, future } => (*generation, future.clone()),
                StoreState::Empty => {
                    let generation = self.current_generation()?;
                    let future = self.start_discovery();
                    *state = StoreState::Discovering {
                        generation,
                        future: future.clone(),
                    };
                    (generation, future)
                }
            }
        };

        let result = future.await;
        self.settle(generation, &result)?;
        result
    }

    /// Drop the cached snapshot so the next call rescans storage
    ///
    /// A discovery already in flight still completes for its waiters but its
    /// result is not cached.
    pub fn invalidate(&self) -> Result<(), StorageError> {
        {
            let mut generation = self.lock_generation()?;
            *generation += 1;
        }
        *self.lock_state()? = StoreState::Empty;
        log::info!("[InstructionStore] Cache invalidated");
        Ok(())
    }

    /// Snapshot if discovery already succeeded
    pub fn cached(&self) -> Option<Arc<ParsedResourceSet>> {
        match &*self.state.lock().ok()? {
            StoreState::Ready(snapshot) => Some(Arc::clone(snapshot)),
            _ => None,
        }
    }

    fn start_discovery(&self) -> DiscoveryFuture {
        let storage = Arc::clone(&self.storage);
        let parser = Arc::clone(&self.parser);
        let config = self.config.clone();
        let max_attempts = self.max_attempts;

        async move { discover(storage, parser, config, max_attempts).await }
            .boxed()
            .shared()
    }

    fn settle(&self, generation: u64, result: &DiscoveryResult) -> Result<(), StorageError> {
        let mut state = self.lock_state()?;
        let still_current = matches!(
            &*state,
            StoreState::Discovering { generation: g, .. } if *g == generation
        );
        if !still_current {
            return Ok(());
        }

        *state = match result {
            Ok(snapshot) => StoreState::Ready(Arc::clone(snapshot)),
            Err(_) => StoreState::Empty,
        };
        Ok(())
    }

    // ========================================================================
    // HELPER METHODS - Lock management
    // ========================================================================

    fn lock_state(&self) -> Result<MutexGuard<'_, StoreState>, StorageError> {
        self.state.lock().map_err(|_| StorageError::LockPoisoned {
            component: "InstructionStore".to_string(),
        })
    }

    fn lock_generation(&self) -> Result<MutexGuard<'_, u64>, StorageError> {
        self.generation
            .lock()
            .map_err(|_| StorageError::LockPoisoned {
                component: "InstructionStore".to_string(),
            })
    }

    fn current_generation(&self) -> Result<u64, StorageError> {
        Ok(*self.lock_generation()?)
    }
}

/// One full discovery pass: prepare the directory (retried), then list and parse
async fn discover(
    storage: Arc<dyn Storage>,
    parser: Arc<ResourceParser>,
    config: ResourceConfig,
    max_attempts: u32,
) -> DiscoveryResult {
    let directory = storage.root().join(&config.directory_name);
    let marker = directory.join(&config.marker_file_name);

    log::info!("[InstructionStore] Discovering resources in {:?}", directory);

    with_retry(
        |_| prepare_directory(Arc::clone(&storage), directory.clone(), marker.clone()),
        max_attempts,
        exponential_backoff,
    )
    .await
    .inspect_err(|err| log_storage_error(err, "prepare_directory"))?;

    let mut entries = storage
        .list_entries(&directory)
        .inspect_err(|err| log_storage_error(err, "list_entries"))?;

    let marker_name = config.marker_file_name.as_bytes();
    entries.retain(|entry| entry.name != marker_name);
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let resources: ParsedResourceSet = entries
        .iter()
        .map(|entry| parser.parse_entry(entry))
        .collect();

    log::info!(
        "[InstructionStore] Found {} instructions, {} icons, {} unparsable entries",
        resources.instructions().count(),
        resources.icons().count(),
        resources.failures().len()
    );

    Ok(Arc::new(resources))
}

/// Steps 1-3 of discovery: storage readable, directory present, marker indexed
async fn prepare_directory(
    storage: Arc<dyn Storage>,
    directory: PathBuf,
    marker: PathBuf,
) -> Result<(), StorageError> {
    if !storage.is_readable() {
        return Err(StorageError::NotReadable);
    }

    ensure_directory(storage.as_ref(), &directory)?;

    if !storage.exists(&marker) {
        storage
            .create_file(&marker)
            .map_err(|err| StorageError::MarkerFileCreateFailed {
                path: marker.display().to_string(),
                reason: err.to_string(),
            })?;
        log::info!("[InstructionStore] Created marker {:?}, awaiting indexing", marker);
        storage.await_indexed(&marker).await?;
    }

    Ok(())
}

fn ensure_directory(storage: &dyn Storage, directory: &Path) -> Result<(), StorageError> {
    if storage.exists(directory) {
        return Ok(());
    }
    if !storage.is_writable() {
        return Err(StorageError::NotWritable {
            directory: directory.display().to_string(),
        });
    }
    storage
        .create_directory(directory)
        .map_err(|err| StorageError::DirectoryCreateFailed {
            directory: directory.display().to_string(),
            reason: err.to_string(),
        })?;
    log::info!("[InstructionStore] Created resource directory {:?}", directory);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ParseFailureKind;
    use crate::testing::MemoryStorage;

    fn config_with_attempts(max_attempts: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.retry.max_attempts = max_attempts;
        config
    }

    fn store_over(storage: &Arc<MemoryStorage>, max_attempts: u32) -> InstructionStore {
        InstructionStore::new(
            Arc::clone(storage) as Arc<dyn Storage>,
            &config_with_attempts(max_attempts),
        )
    }

    #[tokio::test]
    async fn test_discovery_partitions_entries() {
        let storage = Arc::new(MemoryStorage::with_directory(
            "instructions",
            &[
                "chest_english_4000.mp3",
                "chest.png",
                "chest.xyz",
                "chest_english.mp3",
            ],
        ));
        let store = store_over(&storage, 5);

        let resources = store.get_resources().await.unwrap();
        assert_eq!(resources.instructions().count(), 1);
        assert_eq!(resources.icons().count(), 1);
        assert_eq!(resources.failures().len(), 2);
        assert!(resources
            .failures()
            .iter()
            .any(|f| f.failure == ParseFailureKind::FileFormat));
    }

    #[tokio::test]
    async fn test_second_call_returns_cached_snapshot() {
        let storage = Arc::new(MemoryStorage::with_directory(
            "instructions",
            &["chest_english_4000.mp3"],
        ));
        let store = store_over(&storage, 5);

        let first = store.get_resources().await.unwrap();
        let second = store.get_resources().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(storage.list_calls(), 1);
        assert!(store.cached().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_scan() {
        let storage = Arc::new(MemoryStorage::with_directory(
            "instructions",
            &["chest_english_4000.mp3"],
        ));
        let store = store_over(&storage, 5);

        let (a, b) = tokio::join!(store.get_resources(), store.get_resources());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(storage.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rescan() {
        let storage = Arc::new(MemoryStorage::with_directory(
            "instructions",
            &["chest_english_4000.mp3"],
        ));
        let store = store_over(&storage, 5);

        store.get_resources().await.unwrap();
        storage.add_file("instructions", "knee_english_2000.mp3");
        store.invalidate().unwrap();

        let rescanned = store.get_resources().await.unwrap();
        assert_eq!(rescanned.instructions().count(), 2);
        assert_eq!(storage.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_directory_is_created_with_marker() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_over(&storage, 1);

        let resources = store.get_resources().await.unwrap();
        assert!(resources.is_empty());
        assert!(storage.contains("instructions"));
        assert!(storage.contains("instructions/.visible"));
        assert_eq!(storage.index_calls(), 1);
    }

    #[tokio::test]
    async fn test_marker_is_excluded_from_listing() {
        let storage = Arc::new(MemoryStorage::with_directory(
            "instructions",
            &[".visible", "chest.png"],
        ));
        let store = store_over(&storage, 1);

        let resources = store.get_resources().await.unwrap();
        assert!(resources.failures().is_empty());
        assert_eq!(resources.icons().count(), 1);
        assert_eq!(storage.index_calls(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_storage_retried_then_surfaced() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_readable_for(10);
        let store = store_over(&storage, 3);

        let result = store.get_resources().await;
        assert_eq!(result.unwrap_err(), StorageError::NotReadable);
        assert_eq!(storage.readable_calls(), 3);
        assert!(store.cached().is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_ceiling() {
        let storage = Arc::new(MemoryStorage::with_directory(
            "instructions",
            &["chest.png"],
        ));
        storage.fail_readable_for(4);
        let store = store_over(&storage, 5);

        let resources = store.get_resources().await.unwrap();
        assert_eq!(resources.icons().count(), 1);
        assert_eq!(storage.readable_calls(), 5);
    }

    #[tokio::test]
    async fn test_read_only_storage_without_directory() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_writable(false);
        let store = store_over(&storage, 1);

        assert!(matches!(
            store.get_resources().await,
            Err(StorageError::NotWritable { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_discovery_is_not_cached() {
        let storage = Arc::new(MemoryStorage::with_directory(
            "instructions",
            &["chest.png"],
        ));
        storage.fail_readable_for(1);
        let store = store_over(&storage, 1);

        assert!(store.get_resources().await.is_err());
        assert!(store.get_resources().await.is_ok());
    }
}
