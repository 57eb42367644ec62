// Playback driver - serializes every session transition on one task
//
// Commands from callers and events from player/timer callbacks are merged in a
// single select loop, so the synchronizer never sees concurrent transitions.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::PlaybackConfig;
use crate::error::{log_playback_error, PlaybackError};
use crate::navigation::ActivePlayback;
use crate::resources::Instruction;

use super::player::AudioPlayer;
use super::scheduler::Scheduler;
use super::session::SessionState;
use super::synchronizer::{PlaybackNotification, PlaybackSynchronizer};

/// Buffer for presentation notifications; slow subscribers lag
const NOTIFICATION_CAPACITY: usize = 128;

/// Request sent to the driver task
pub enum PlaybackCommand {
    Select {
        instruction: Instruction,
        reply: oneshot::Sender<Result<u64, PlaybackError>>,
    },
    GraphicsPrepared,
    Abort {
        reply: Option<oneshot::Sender<bool>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
}

/// Cloneable handle to a running playback driver
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::UnboundedSender<PlaybackCommand>,
    notifications: broadcast::Sender<PlaybackNotification>,
}

impl PlaybackHandle {
    /// Select an instruction and wait for the session token
    pub async fn select(&self, instruction: Instruction) -> Result<u64, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(PlaybackCommand::Select { instruction, reply })?;
        rx.await.map_err(|_| PlaybackError::DriverStopped)?
    }

    /// Blocking variant of [`Self::select`] for synchronous callers.
    ///
    /// Must not be called from inside the runtime driving playback.
    pub fn select_blocking(&self, instruction: Instruction) -> Result<u64, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(PlaybackCommand::Select { instruction, reply })?;
        rx.blocking_recv().map_err(|_| PlaybackError::DriverStopped)?
    }

    /// Report that the countdown graphics are ready
    pub fn graphics_prepared(&self) -> Result<(), PlaybackError> {
        self.send(PlaybackCommand::GraphicsPrepared)
    }

    /// Abort and wait for the result. `Ok(false)` means nothing was active.
    pub async fn abort(&self) -> Result<bool, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(PlaybackCommand::Abort { reply: Some(reply) })?;
        rx.await.map_err(|_| PlaybackError::DriverStopped)
    }

    /// Queue an abort without waiting for it.
    ///
    /// Commands are applied in order, so anything sent afterwards sees the
    /// aborted session.
    pub fn request_abort(&self) -> Result<(), PlaybackError> {
        self.send(PlaybackCommand::Abort { reply: None })
    }

    pub async fn state(&self) -> Result<SessionState, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.send(PlaybackCommand::State { reply })?;
        rx.await.map_err(|_| PlaybackError::DriverStopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackNotification> {
        self.notifications.subscribe()
    }

    /// Notifications as a stream, skipping over lag gaps
    pub fn notifications(&self) -> impl Stream<Item = PlaybackNotification> {
        BroadcastStream::new(self.subscribe()).filter_map(|item| async move {
            match item {
                Ok(notification) => Some(notification),
                Err(err) => {
                    log::warn!("[PlaybackDriver] Notification stream lagged: {}", err);
                    None
                }
            }
        })
    }

    fn send(&self, command: PlaybackCommand) -> Result<(), PlaybackError> {
        self.commands.send(command).map_err(|_| {
            let err = PlaybackError::DriverStopped;
            log_playback_error(&err, "send");
            err
        })
    }
}

impl ActivePlayback for PlaybackHandle {
    fn abort_active(&mut self) -> bool {
        self.request_abort().is_ok()
    }
}

/// Spawn the driver task on `runtime`
///
/// The task runs until every [`PlaybackHandle`] is dropped, aborting any
/// session still active at that point.
pub fn spawn_playback(
    runtime: &Handle,
    player: Arc<dyn AudioPlayer>,
    scheduler: Arc<dyn Scheduler>,
    config: PlaybackConfig,
) -> (PlaybackHandle, JoinHandle<()>) {
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);

    let mut synchronizer =
        PlaybackSynchronizer::new(player, scheduler, config, event_tx, notify_tx.clone());

    let task = runtime.spawn(async move {
        tracing::info!("[PlaybackDriver] Started");
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => apply_command(&mut synchronizer, command),
                    None => {
                        synchronizer.abort();
                        break;
                    }
                },
                Some(event) = event_rx.recv() => {
                    let span = tracing::debug_span!("session_event", token = event.token());
                    let _enter = span.enter();
                    synchronizer.handle_event(event);
                }
            }
        }
        tracing::info!("[PlaybackDriver] Stopped");
    });

    (
        PlaybackHandle {
            commands: command_tx,
            notifications: notify_tx,
        },
        task,
    )
}

fn apply_command(synchronizer: &mut PlaybackSynchronizer, command: PlaybackCommand) {
    match command {
        PlaybackCommand::Select { instruction, reply } => {
            let span = tracing::info_span!(
                "select",
                subject = %instruction.subject,
                language = %instruction.language
            );
            let _enter = span.enter();
            let _ = reply.send(synchronizer.select_instruction(instruction));
        }
        PlaybackCommand::GraphicsPrepared => {
            synchronizer.on_graphics_prepared();
        }
        PlaybackCommand::Abort { reply } => {
            let aborted = synchronizer.abort();
            if let Some(reply) = reply {
                let _ = reply.send(aborted);
            }
        }
        PlaybackCommand::State { reply } => {
            let _ = reply.send(synchronizer.state());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::scheduler::TokioScheduler;
    use crate::testing::ScriptedPlayer;

    fn instruction() -> Instruction {
        Instruction {
            subject: "chest".to_string(),
            language: "english".to_string(),
            audio_location: "chest_english_1000.mp3".to_string(),
            cue_start_offset_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_select_twice_reports_session_active() {
        let player = Arc::new(ScriptedPlayer::new());
        let (handle, _task) = spawn_playback(
            &Handle::current(),
            player,
            Arc::new(TokioScheduler::new(Handle::current())),
            PlaybackConfig::default(),
        );

        assert_eq!(handle.select(instruction()).await, Ok(1));
        assert_eq!(
            handle.select(instruction()).await,
            Err(PlaybackError::SessionActive)
        );
        assert_eq!(handle.state().await, Ok(SessionState::WaitingForReadiness));

        assert_eq!(handle.abort().await, Ok(true));
        assert_eq!(handle.abort().await, Ok(false));
        assert_eq!(handle.state().await, Ok(SessionState::Idle));
    }

    #[tokio::test]
    async fn test_dropping_handles_aborts_session() {
        let player = Arc::new(ScriptedPlayer::new());
        let (handle, task) = spawn_playback(
            &Handle::current(),
            Arc::clone(&player) as Arc<dyn AudioPlayer>,
            Arc::new(TokioScheduler::new(Handle::current())),
            PlaybackConfig::default(),
        );

        handle.select(instruction()).await.unwrap();
        drop(handle);
        task.await.unwrap();
        assert_eq!(player.release_calls(), 1);
    }
}
