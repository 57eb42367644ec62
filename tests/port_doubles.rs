//! Public-API tests driven by the deterministic doubles in `testing`
//!
//! Needs the `test_support` feature: `cargo test --features test_support`.

use std::sync::Arc;

use instruction_kiosk::config::{AppConfig, PlaybackConfig};
use instruction_kiosk::error::StorageError;
use instruction_kiosk::playback::{
    spawn_playback, AudioPlayer, PlaybackNotification, Scheduler, SessionState,
};
use instruction_kiosk::resources::{InstructionStore, Storage};
use instruction_kiosk::testing::{ManualScheduler, MemoryStorage, ScriptedPlayer};
use tokio::runtime::Handle;
use tokio::sync::broadcast;

fn store_over(storage: &Arc<MemoryStorage>, max_attempts: u32) -> InstructionStore {
    let mut config = AppConfig::default();
    config.retry.max_attempts = max_attempts;
    InstructionStore::new(Arc::clone(storage) as Arc<dyn Storage>, &config)
}

async fn collect_until<F>(
    notifications: &mut broadcast::Receiver<PlaybackNotification>,
    wanted: F,
) -> Vec<PlaybackNotification>
where
    F: Fn(&PlaybackNotification) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let notification = notifications.recv().await.unwrap();
        let done = wanted(&notification);
        seen.push(notification);
        if done {
            return seen;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_discovery_succeeds_on_fifth_attempt() {
    let storage = Arc::new(MemoryStorage::with_directory(
        "instructions",
        &["chest_english_4000.mp3"],
    ));
    storage.fail_readable_for(4);

    let resources = store_over(&storage, 5).get_resources().await.unwrap();
    assert_eq!(resources.instructions().count(), 1);
    assert_eq!(storage.readable_calls(), 5);
    assert_eq!(storage.list_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_gives_up_after_four_attempts() {
    let storage = Arc::new(MemoryStorage::with_directory("instructions", &[]));
    storage.fail_readable_for(4);

    let result = store_over(&storage, 4).get_resources().await;
    assert_eq!(result.unwrap_err(), StorageError::NotReadable);
    assert_eq!(storage.readable_calls(), 4);
    assert_eq!(storage.list_calls(), 0);
}

#[tokio::test]
async fn test_session_on_virtual_clock() {
    let player = Arc::new(ScriptedPlayer::new());
    let scheduler = Arc::new(ManualScheduler::new());
    let (playback, _driver) = spawn_playback(
        &Handle::current(),
        Arc::clone(&player) as Arc<dyn AudioPlayer>,
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        PlaybackConfig::default(),
    );
    let mut notifications = playback.subscribe();

    let storage = Arc::new(MemoryStorage::with_directory(
        "instructions",
        &["chest_english_4000.mp3"],
    ));
    let resources = store_over(&storage, 1).get_resources().await.unwrap();
    let chest = resources.instruction("chest", "english").cloned().unwrap();

    playback.select(chest).await.unwrap();
    playback.graphics_prepared().unwrap();
    assert!(player.complete_prepare(Ok(10_000)));
    collect_until(&mut notifications, |n| {
        matches!(n, PlaybackNotification::Started { .. })
    })
    .await;
    assert_eq!(player.start_calls(), 1);
    assert_eq!(scheduler.pending(), 6);

    scheduler.advance_to(6000);
    let seen = collect_until(&mut notifications, |n| {
        matches!(n, PlaybackNotification::CueCleared)
    })
    .await;
    let countdown: Vec<u64> = seen
        .iter()
        .filter_map(|n| match n {
            PlaybackNotification::Countdown { remaining_secs } => Some(*remaining_secs),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, vec![3, 2, 1, 0]);
    assert!(seen.contains(&PlaybackNotification::CueShown));

    assert!(player.finish_playback());
    collect_until(&mut notifications, |n| {
        matches!(n, PlaybackNotification::Finished { .. })
    })
    .await;
    assert_eq!(playback.state().await, Ok(SessionState::Idle));
    assert_eq!(player.release_calls(), 1);
}
