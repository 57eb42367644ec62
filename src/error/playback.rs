// Playback error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Playback error code constants exposed to Dart via FFI
///
/// Error code range: 1001-1007
#[frb(unignore)]
pub struct PlaybackErrorCodes {}

#[frb]
impl PlaybackErrorCodes {
    /// Audio source could not be prepared (invalid source, decode failure)
    pub const PREPARATION_FAILED: i32 = 1001;

    /// Countdown/cue timers could not be armed
    pub const SCHEDULING_FAILED: i32 = 1002;

    /// An instruction is already being played
    pub const SESSION_ACTIVE: i32 = 1003;

    /// No instruction is being played
    pub const NO_ACTIVE_SESSION: i32 = 1004;

    /// The session driver is no longer accepting commands
    pub const DRIVER_STOPPED: i32 = 1005;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1006;

    /// Host player reports arrived on a platform that plays audio in-process
    pub const HOST_PLAYER_UNAVAILABLE: i32 = 1007;

    /// Get PREPARATION_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn preparation_failed() -> i32 {
        Self::PREPARATION_FAILED
    }

    /// Get SCHEDULING_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn scheduling_failed() -> i32 {
        Self::SCHEDULING_FAILED
    }

    /// Get SESSION_ACTIVE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn session_active() -> i32 {
        Self::SESSION_ACTIVE
    }

    /// Get NO_ACTIVE_SESSION error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn no_active_session() -> i32 {
        Self::NO_ACTIVE_SESSION
    }

    /// Get DRIVER_STOPPED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn driver_stopped() -> i32 {
        Self::DRIVER_STOPPED
    }

    /// Get LOCK_POISONED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }

    /// Get HOST_PLAYER_UNAVAILABLE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn host_player_unavailable() -> i32 {
        Self::HOST_PLAYER_UNAVAILABLE
    }
}

/// Log a playback error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_playback_error(err: &PlaybackError, context: &str) {
    error!(
        "Playback error in {}: code={}, component=PlaybackSynchronizer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Playback-related errors
///
/// A playback error is fatal to the current session only. The synchronizer
/// aborts the session and reports the error alongside the aborted instruction.
///
/// Error code range: 1001-1007
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// Audio preparation failed for the given instruction
    PreparationFailed {
        subject: String,
        language: String,
        reason: String,
    },

    /// Scheduler refused to arm a timer
    SchedulingFailed { reason: String },

    /// Another instruction is already playing
    SessionActive,

    /// No instruction is playing
    NoActiveSession,

    /// The session driver has shut down
    DriverStopped,

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// No host-side audio player on this platform
    HostPlayerUnavailable,
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> i32 {
        match self {
            PlaybackError::PreparationFailed { .. } => PlaybackErrorCodes::PREPARATION_FAILED,
            PlaybackError::SchedulingFailed { .. } => PlaybackErrorCodes::SCHEDULING_FAILED,
            PlaybackError::SessionActive => PlaybackErrorCodes::SESSION_ACTIVE,
            PlaybackError::NoActiveSession => PlaybackErrorCodes::NO_ACTIVE_SESSION,
            PlaybackError::DriverStopped => PlaybackErrorCodes::DRIVER_STOPPED,
            PlaybackError::LockPoisoned { .. } => PlaybackErrorCodes::LOCK_POISONED,
            PlaybackError::HostPlayerUnavailable => PlaybackErrorCodes::HOST_PLAYER_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            PlaybackError::PreparationFailed {
                subject,
                language,
                reason,
            } => {
                format!(
                    "Could not play the {} instruction for {}: {}",
                    language, subject, reason
                )
            }
            PlaybackError::SchedulingFailed { reason } => {
                format!("Could not schedule countdown: {}", reason)
            }
            PlaybackError::SessionActive => {
                "An instruction is already playing. Abort it first.".to_string()
            }
            PlaybackError::NoActiveSession => "No instruction is playing".to_string(),
            PlaybackError::DriverStopped => "Playback driver has stopped".to_string(),
            PlaybackError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            PlaybackError::HostPlayerUnavailable => {
                "Audio is played in-process on this platform; no host player to report to"
                    .to_string()
            }
        }
    }
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlaybackError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PlaybackError {}
