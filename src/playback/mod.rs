//! Instruction playback: audio, countdown and cue kept in step.
//!
//! - `player`: AudioPlayer port and its desktop/host implementations
//! - `scheduler`: Clock port and the cancellable per-session timer set
//! - `session`: session state and the readiness join
//! - `synchronizer`: the playback state machine
//! - `driver`: task that serializes commands and callbacks for the synchronizer

pub mod driver;
pub mod player;
pub mod scheduler;
pub mod session;
pub mod synchronizer;

pub use driver::{spawn_playback, PlaybackCommand, PlaybackHandle};
pub use player::{
    wav_duration_ms, AudioPlayer, CompletionCallback, HostAudioPlayer, PlayerRequest,
    PrepareCallback, WavFilePlayer,
};
pub use scheduler::{Scheduler, TimerCallback, TimerHandle, TimerSet, TokioScheduler};
pub use session::{PlaybackSession, ReadinessJoin, SessionState};
pub use synchronizer::{PlaybackNotification, PlaybackSynchronizer, SessionEvent};
