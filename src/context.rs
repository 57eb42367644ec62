// AppContext: Dependency Injection Container
// Owns the runtime, instruction store, playback driver, navigation stack and
// settings behind one handle used by the FFI layer and the CLI.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::error::{log_playback_error, PlaybackError, SettingsError, StorageError};
use crate::navigation::{NavigationOutcome, NavigationStack, Scene};
use crate::playback::{
    spawn_playback, AudioPlayer, HostAudioPlayer, PlaybackHandle, PlaybackNotification,
    PlayerRequest, SessionState, TokioScheduler,
};
#[cfg(not(target_os = "android"))]
use crate::playback::WavFilePlayer;
use crate::resources::{
    FsStorage, IndexingRegistry, Instruction, InstructionStore, ParsedResourceSet, Storage,
};
use crate::settings::{JsonFileSettings, KioskSettings};

/// Application state shared by every entry point
///
/// Locks are acquired through helpers that map poisoning to typed errors.
pub struct AppContext {
    runtime: Runtime,
    config: AppConfig,
    indexing: Arc<IndexingRegistry>,
    store: Arc<InstructionStore>,
    playback: PlaybackHandle,
    host_player: Option<Arc<HostAudioPlayer>>,
    player_requests: Option<Mutex<broadcast::Receiver<PlayerRequest>>>,
    navigation: Arc<Mutex<NavigationStack>>,
    settings: KioskSettings<JsonFileSettings>,
    ui_notifications: Mutex<broadcast::Receiver<PlaybackNotification>>,
    _driver: JoinHandle<()>,
    _navigation_listener: JoinHandle<()>,
}

impl AppContext {
    /// Build the context
    ///
    /// # Arguments
    /// * `storage_root` - Removable storage root holding the instruction directory
    /// * `data_dir` - App-private directory for config and settings files
    pub fn new(storage_root: impl Into<PathBuf>, data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref();
        let config = AppConfig::load_from_dir(data_dir);
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("kiosk-runtime")
            .enable_all()
            .build()?;

        let indexing = Arc::new(IndexingRegistry::new());
        let storage = Self::create_storage(storage_root.into(), &indexing, &config);
        let store = Arc::new(InstructionStore::new(storage, &config));

        let (player, host_player) = Self::create_player(&runtime);
        let player_requests = host_player
            .as_ref()
            .map(|host| Mutex::new(host.subscribe_requests()));
        let scheduler = Arc::new(TokioScheduler::new(runtime.handle().clone()));
        let (playback, driver) = spawn_playback(
            runtime.handle(),
            player,
            scheduler,
            config.playback.clone(),
        );

        let navigation = Arc::new(Mutex::new(NavigationStack::new()));
        let navigation_listener =
            Self::spawn_navigation_listener(&runtime, &playback, Arc::clone(&navigation));

        let settings = KioskSettings::new(JsonFileSettings::open(
            data_dir.join(&config.settings.file_name),
        )?);
        let ui_notifications = Mutex::new(playback.subscribe());

        log::info!("[AppContext] Initialized (data dir {})", data_dir.display());

        Ok(Self {
            runtime,
            config,
            indexing,
            store,
            playback,
            host_player,
            player_requests,
            navigation,
            settings,
            ui_notifications,
            _driver: driver,
            _navigation_listener: navigation_listener,
        })
    }

    fn create_storage(
        root: PathBuf,
        indexing: &Arc<IndexingRegistry>,
        config: &AppConfig,
    ) -> Arc<dyn Storage> {
        let storage = FsStorage::new(root);
        if !config.resources.confirm_indexing {
            return Arc::new(storage);
        }
        Arc::new(storage.with_indexing(
            Arc::clone(indexing),
            Duration::from_secs(config.resources.indexing_timeout_secs),
        ))
    }

    #[cfg(target_os = "android")]
    fn create_player(_runtime: &Runtime) -> (Arc<dyn AudioPlayer>, Option<Arc<HostAudioPlayer>>) {
        let host = Arc::new(HostAudioPlayer::new());
        (Arc::clone(&host) as Arc<dyn AudioPlayer>, Some(host))
    }

    #[cfg(not(target_os = "android"))]
    fn create_player(runtime: &Runtime) -> (Arc<dyn AudioPlayer>, Option<Arc<HostAudioPlayer>>) {
        (Arc::new(WavFilePlayer::new(runtime.handle().clone())), None)
    }

    /// Pop the playback scene when a session ends without user navigation
    fn spawn_navigation_listener(
        runtime: &Runtime,
        playback: &PlaybackHandle,
        navigation: Arc<Mutex<NavigationStack>>,
    ) -> JoinHandle<()> {
        let mut notifications = playback.subscribe();
        runtime.spawn(async move {
            loop {
                let ended = match notifications.recv().await {
                    Ok(PlaybackNotification::Finished { .. }) => true,
                    // User aborts already navigated away
                    Ok(PlaybackNotification::Aborted { error, .. }) => error.is_some(),
                    Ok(_) => false,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[AppContext] Navigation listener skipped {}", skipped);
                        false
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !ended {
                    continue;
                }
                match navigation.lock() {
                    Ok(mut stack) => {
                        if let Some(outcome) = stack.leave_playback_scene() {
                            log::debug!("[AppContext] Session ended: {:?}", outcome);
                        }
                    }
                    Err(_) => log::error!("[AppContext] Navigation lock poisoned"),
                }
            }
        })
    }

    // ========================================================================
    // LOCK HELPER METHODS
    // ========================================================================

    fn lock_navigation(&self) -> Result<MutexGuard<'_, NavigationStack>, PlaybackError> {
        self.navigation
            .lock()
            .map_err(|_| PlaybackError::LockPoisoned {
                component: "navigation".to_string(),
            })
    }

    // ========================================================================
    // RESOURCES
    // ========================================================================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Discovered resources, scanning on first use
    pub fn get_resources(&self) -> Result<Arc<ParsedResourceSet>, StorageError> {
        self.runtime.block_on(self.store.get_resources())
    }

    /// Drop the cached scan and discover again
    pub fn refresh_resources(&self) -> Result<Arc<ParsedResourceSet>, StorageError> {
        self.store.invalidate()?;
        self.get_resources()
    }

    /// Paths discovery is waiting on; the host indexes each and confirms it
    pub fn pending_index_requests(&self) -> Vec<String> {
        self.indexing
            .pending()
            .iter()
            .map(|path| path.display().to_string())
            .collect()
    }

    /// Host confirmation that `path` is visible to media indexing
    pub fn confirm_indexed(&self, path: &str, result: Result<(), String>) -> bool {
        self.indexing.confirm(Path::new(path), result)
    }

    // ========================================================================
    // PLAYBACK
    // ========================================================================

    /// Start playback of the instruction for `subject` in `language`
    ///
    /// The playback scene is pushed before the session starts, so a session
    /// ending immediately still finds it on top; a rejected selection pops it.
    pub fn select_instruction(&self, subject: &str, language: &str) -> Result<u64, PlaybackError> {
        let instruction = self.find_instruction(subject, language)?;
        self.lock_navigation()?.push(Scene::InstructionPlayback);

        self.playback.select_blocking(instruction).inspect_err(|_| {
            if let Ok(mut stack) = self.navigation.lock() {
                stack.leave_playback_scene();
            }
        })
    }

    fn find_instruction(&self, subject: &str, language: &str) -> Result<Instruction, PlaybackError> {
        let unavailable = |reason: String| PlaybackError::PreparationFailed {
            subject: subject.to_string(),
            language: language.to_string(),
            reason,
        };
        let resources = self
            .get_resources()
            .map_err(|err| unavailable(err.to_string()))?;
        resources
            .instruction(subject, language)
            .cloned()
            .ok_or_else(|| unavailable("no such instruction".to_string()))
            .inspect_err(|err| log_playback_error(err, "select_instruction"))
    }

    pub fn graphics_prepared(&self) -> Result<(), PlaybackError> {
        self.playback.graphics_prepared()
    }

    pub fn playback_state(&self) -> Result<SessionState, PlaybackError> {
        self.runtime.block_on(self.playback.state())
    }

    pub fn playback(&self) -> &PlaybackHandle {
        &self.playback
    }

    /// Host player finished preparing `request_id`.
    ///
    /// Returns false for a request that is no longer pending. Errors on
    /// platforms without a host player.
    pub fn audio_prepared(
        &self,
        request_id: u64,
        result: Result<u64, String>,
    ) -> Result<bool, PlaybackError> {
        Ok(self.host_player()?.prepared(request_id, result))
    }

    /// Host player reached the end of the track started for `request_id`
    pub fn audio_completed(&self, request_id: u64) -> Result<bool, PlaybackError> {
        Ok(self.host_player()?.completed(request_id))
    }

    pub fn host_player(&self) -> Result<&Arc<HostAudioPlayer>, PlaybackError> {
        self.host_player
            .as_ref()
            .ok_or(PlaybackError::HostPlayerUnavailable)
    }

    /// Player requests the host has not picked up yet, oldest first
    pub fn drain_player_requests(&self) -> Result<Vec<PlayerRequest>, PlaybackError> {
        let mut receiver = self
            .player_requests
            .as_ref()
            .ok_or(PlaybackError::HostPlayerUnavailable)?
            .lock()
            .map_err(|_| PlaybackError::LockPoisoned {
                component: "player_requests".to_string(),
            })?;
        let mut drained = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(request) => drained.push(request),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("[AppContext] Player requests lagged by {}", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(drained)
    }

    /// Notifications received since the previous call
    pub fn drain_notifications(&self) -> Result<Vec<PlaybackNotification>, PlaybackError> {
        let mut receiver = self
            .ui_notifications
            .lock()
            .map_err(|_| PlaybackError::LockPoisoned {
                component: "ui_notifications".to_string(),
            })?;
        let mut drained = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(notification) => drained.push(notification),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("[AppContext] UI notifications lagged by {}", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(drained)
    }

    // ========================================================================
    // NAVIGATION
    // ========================================================================

    pub fn navigate_to(&self, scene: Scene) -> Result<(), PlaybackError> {
        self.lock_navigation()?.push(scene);
        Ok(())
    }

    /// Back-navigation; leaving playback aborts the running session first
    pub fn navigate_back(&self) -> Result<NavigationOutcome, PlaybackError> {
        let mut playback = self.playback.clone();
        Ok(self.lock_navigation()?.navigate_back(&mut playback))
    }

    pub fn current_scene(&self) -> Result<Scene, PlaybackError> {
        Ok(self.lock_navigation()?.peek())
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn settings(&self) -> &KioskSettings<JsonFileSettings> {
        &self.settings
    }

    pub fn verify_password(&self, password: &str) -> Result<bool, SettingsError> {
        self.settings.verify_password(password)
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if let Err(err) = self.playback.request_abort() {
            log::debug!("[AppContext] Driver already stopped: {}", err);
        }
        log::info!("[AppContext] Shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (tempfile::TempDir, tempfile::TempDir, AppContext) {
        let storage = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(storage.path(), data.path()).unwrap();
        (storage, data, ctx)
    }

    #[test]
    fn test_resources_from_empty_storage() {
        let (storage, _data, ctx) = context();
        let resources = ctx.get_resources().unwrap();
        assert!(resources.is_empty());
        assert!(storage.path().join("instructions/.visible").exists());
    }

    #[test]
    fn test_unknown_instruction_is_rejected() {
        let (_storage, _data, ctx) = context();
        assert!(matches!(
            ctx.select_instruction("chest", "english"),
            Err(PlaybackError::PreparationFailed { .. })
        ));
        assert_eq!(ctx.current_scene().unwrap(), Scene::Main);
    }

    #[test]
    fn test_navigation_round_trip() {
        let (_storage, _data, ctx) = context();
        ctx.navigate_to(Scene::Settings).unwrap();
        assert_eq!(ctx.current_scene().unwrap(), Scene::Settings);
        assert!(matches!(
            ctx.navigate_back().unwrap(),
            NavigationOutcome::Popped { .. }
        ));
        assert_eq!(
            ctx.navigate_back().unwrap(),
            NavigationOutcome::CloseApplication
        );
    }

    #[cfg(not(target_os = "android"))]
    #[test]
    fn test_host_player_reports_rejected_on_desktop() {
        let (_storage, _data, ctx) = context();
        assert_eq!(
            ctx.audio_prepared(1, Ok(1000)),
            Err(PlaybackError::HostPlayerUnavailable)
        );
        assert_eq!(ctx.audio_completed(1), Err(PlaybackError::HostPlayerUnavailable));
        assert_eq!(
            ctx.drain_player_requests(),
            Err(PlaybackError::HostPlayerUnavailable)
        );
    }

    #[cfg(not(target_os = "android"))]
    #[test]
    fn test_no_index_requests_without_confirmation() {
        let (_storage, _data, ctx) = context();
        ctx.get_resources().unwrap();
        assert!(ctx.pending_index_requests().is_empty());
    }

    #[test]
    fn test_settings_file_lives_in_data_dir() {
        let (_storage, data, ctx) = context();
        ctx.settings().set_kiosk_mode(true).unwrap();
        assert!(data.path().join("kiosk_settings.json").exists());
        assert!(ctx.verify_password("anything").unwrap());
    }
}
