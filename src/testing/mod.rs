//! Deterministic test doubles for the storage, player and clock ports.
//!
//! Compiled for unit tests, or for integration tests with the `test_support`
//! Cargo feature.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};

use crate::error::{PlaybackError, StorageError};
use crate::playback::{
    AudioPlayer, CompletionCallback, PrepareCallback, Scheduler, TimerCallback, TimerHandle,
};
use crate::resources::{Storage, StorageEntry};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MANUAL SCHEDULER
// ============================================================================

struct ManualTimer {
    due_ms: u64,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualClock {
    now_ms: u64,
    next_seq: u64,
    scheduled: usize,
    fail_after: Option<usize>,
    timers: Vec<ManualTimer>,
}

/// Virtual clock advanced explicitly by the test
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<ManualClock>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        lock(&self.clock).now_ms
    }

    /// Let `successes` more timers be scheduled, then fail every request
    pub fn fail_after(&self, successes: usize) {
        let mut clock = lock(&self.clock);
        clock.fail_after = Some(clock.scheduled + successes);
    }

    /// Timers neither fired nor cancelled
    pub fn pending(&self) -> usize {
        lock(&self.clock)
            .timers
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Timers cancelled before they fired
    pub fn cancelled(&self) -> usize {
        lock(&self.clock)
            .timers
            .iter()
            .filter(|t| t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Move the clock to `target_ms`, firing due callbacks in order.
    ///
    /// Callbacks run without the clock locked.
    pub fn advance_to(&self, target_ms: u64) {
        loop {
            let next = {
                let mut clock = lock(&self.clock);
                let due = clock
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due_ms <= target_ms && !t.cancelled.load(Ordering::SeqCst))
                    .min_by_key(|(_, t)| (t.due_ms, t.seq))
                    .map(|(index, _)| index);
                match due {
                    Some(index) => {
                        let timer = clock.timers.remove(index);
                        clock.now_ms = clock.now_ms.max(timer.due_ms);
                        Some(timer.callback)
                    }
                    None => {
                        clock.now_ms = clock.now_ms.max(target_ms);
                        None
                    }
                }
            };
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(
        &self,
        delay: Duration,
        callback: TimerCallback,
    ) -> Result<TimerHandle, PlaybackError> {
        let mut clock = lock(&self.clock);
        if clock.fail_after.is_some_and(|limit| clock.scheduled >= limit) {
            return Err(PlaybackError::SchedulingFailed {
                reason: "manual scheduler refused timer".to_string(),
            });
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let timer = ManualTimer {
            due_ms: clock.now_ms + delay.as_millis() as u64,
            seq: clock.next_seq,
            cancelled: Arc::clone(&cancelled),
            callback,
        };
        clock.next_seq += 1;
        clock.scheduled += 1;
        clock.timers.push(timer);
        Ok(TimerHandle::new(cancelled))
    }
}

// ============================================================================
// SCRIPTED PLAYER
// ============================================================================

#[derive(Default)]
struct ScriptedState {
    prepared_sources: Vec<String>,
    prepare: Option<PrepareCallback>,
    completion: Option<CompletionCallback>,
    start_calls: usize,
    stop_calls: usize,
    release_calls: usize,
}

/// Player whose completions are triggered by the test.
///
/// Pending callbacks survive `release()`, so a test can deliver a late
/// completion the way a slow platform player would.
#[derive(Default)]
pub struct ScriptedPlayer {
    state: Mutex<ScriptedState>,
}

impl ScriptedPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver the pending preparation result. Returns false if none was pending.
    pub fn complete_prepare(&self, result: Result<u64, String>) -> bool {
        let callback = lock(&self.state).prepare.take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    /// Report end of track. Returns false if playback was never started.
    pub fn finish_playback(&self) -> bool {
        let callback = lock(&self.state).completion.take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn prepared_sources(&self) -> Vec<String> {
        lock(&self.state).prepared_sources.clone()
    }

    pub fn start_calls(&self) -> usize {
        lock(&self.state).start_calls
    }

    pub fn stop_calls(&self) -> usize {
        lock(&self.state).stop_calls
    }

    pub fn release_calls(&self) -> usize {
        lock(&self.state).release_calls
    }
}

impl AudioPlayer for ScriptedPlayer {
    fn prepare(&self, source: &str, on_prepared: PrepareCallback) {
        let mut state = lock(&self.state);
        state.prepared_sources.push(source.to_string());
        state.prepare = Some(on_prepared);
    }

    fn start(&self, on_completion: CompletionCallback) {
        let mut state = lock(&self.state);
        state.start_calls += 1;
        state.completion = Some(on_completion);
    }

    fn stop(&self) {
        lock(&self.state).stop_calls += 1;
    }

    fn release(&self) {
        lock(&self.state).release_calls += 1;
    }
}

// ============================================================================
// MEMORY STORAGE
// ============================================================================

struct MemoryState {
    directories: BTreeSet<PathBuf>,
    files: BTreeSet<PathBuf>,
    writable: bool,
    unreadable_remaining: usize,
    readable_calls: usize,
    list_calls: usize,
    index_calls: usize,
}

/// In-memory storage with call counters and failure injection
pub struct MemoryStorage {
    root: PathBuf,
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    /// Empty, readable and writable storage
    pub fn new() -> Self {
        let root = PathBuf::from("/storage");
        let mut directories = BTreeSet::new();
        directories.insert(root.clone());
        Self {
            root,
            state: Mutex::new(MemoryState {
                directories,
                files: BTreeSet::new(),
                writable: true,
                unreadable_remaining: 0,
                readable_calls: 0,
                list_calls: 0,
                index_calls: 0,
            }),
        }
    }

    /// Storage holding `directory` (relative to the root) with `files` in it
    pub fn with_directory(directory: &str, files: &[&str]) -> Self {
        let storage = Self::new();
        {
            let mut state = lock(&storage.state);
            state.directories.insert(storage.root.join(directory));
        }
        for name in files {
            storage.add_file(directory, name);
        }
        storage
    }

    pub fn add_file(&self, directory: &str, name: &str) {
        let path = self.root.join(directory).join(name);
        let mut state = lock(&self.state);
        state.directories.insert(self.root.join(directory));
        state.files.insert(path);
    }

    /// Whether `relative` exists as a file or directory
    pub fn contains(&self, relative: &str) -> bool {
        let path = self.root.join(relative);
        let state = lock(&self.state);
        state.directories.contains(&path) || state.files.contains(&path)
    }

    pub fn set_writable(&self, writable: bool) {
        lock(&self.state).writable = writable;
    }

    /// Report unreadable for the next `calls` readability checks
    pub fn fail_readable_for(&self, calls: usize) {
        lock(&self.state).unreadable_remaining = calls;
    }

    pub fn readable_calls(&self) -> usize {
        lock(&self.state).readable_calls
    }

    pub fn list_calls(&self) -> usize {
        lock(&self.state).list_calls
    }

    pub fn index_calls(&self) -> usize {
        lock(&self.state).index_calls
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn root(&self) -> PathBuf {
        self.root.clone()
    }

    fn is_readable(&self) -> bool {
        let mut state = lock(&self.state);
        state.readable_calls += 1;
        if state.unreadable_remaining > 0 {
            state.unreadable_remaining -= 1;
            return false;
        }
        true
    }

    fn is_writable(&self) -> bool {
        lock(&self.state).writable
    }

    fn exists(&self, path: &Path) -> bool {
        let state = lock(&self.state);
        state.directories.contains(path) || state.files.contains(path)
    }

    fn create_directory(&self, path: &Path) -> std::io::Result<()> {
        let mut state = lock(&self.state);
        if !state.writable {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only storage",
            ));
        }
        state.directories.insert(path.to_path_buf());
        Ok(())
    }

    fn create_file(&self, path: &Path) -> std::io::Result<()> {
        let mut state = lock(&self.state);
        if !state.writable {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only storage",
            ));
        }
        state.files.insert(path.to_path_buf());
        Ok(())
    }

    fn list_entries(&self, dir: &Path) -> Result<Vec<StorageEntry>, StorageError> {
        let mut state = lock(&self.state);
        state.list_calls += 1;
        if !state.directories.contains(dir) {
            return Err(StorageError::ListingFailed {
                directory: dir.display().to_string(),
                reason: "no such directory".to_string(),
            });
        }
        Ok(state
            .files
            .iter()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| {
                let name = path.file_name()?;
                Some(StorageEntry::new(
                    name.as_encoded_bytes().to_vec(),
                    path.display().to_string(),
                ))
            })
            .collect())
    }

    fn await_indexed(&self, _path: &Path) -> BoxFuture<'static, Result<(), StorageError>> {
        lock(&self.state).index_calls += 1;
        future::ready(Ok(())).boxed()
    }
}
