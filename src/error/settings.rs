// Settings error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Settings error code constants exposed to Dart via FFI
///
/// Error code range: 4001-4004
#[frb(unignore)]
pub struct SettingsErrorCodes {}

#[frb]
impl SettingsErrorCodes {
    /// Settings file could not be read
    pub const READ_FAILED: i32 = 4001;

    /// Settings file could not be written
    pub const WRITE_FAILED: i32 = 4002;

    /// Settings file is not valid JSON
    pub const MALFORMED: i32 = 4003;

    /// Settings lock was poisoned
    pub const LOCK_POISONED: i32 = 4004;

    /// Get READ_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn read_failed() -> i32 {
        Self::READ_FAILED
    }

    /// Get WRITE_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn write_failed() -> i32 {
        Self::WRITE_FAILED
    }

    /// Get MALFORMED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn malformed() -> i32 {
        Self::MALFORMED
    }

    /// Get LOCK_POISONED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }
}

pub fn log_settings_error(err: &SettingsError, context: &str) {
    error!(
        "Settings error in {}: code={}, component=PersistentSettings, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Persistent settings errors
///
/// Error code range: 4001-4004
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    ReadFailed { reason: String },
    WriteFailed { reason: String },
    Malformed { reason: String },
    LockPoisoned,
}

impl ErrorCode for SettingsError {
    fn code(&self) -> i32 {
        match self {
            SettingsError::ReadFailed { .. } => SettingsErrorCodes::READ_FAILED,
            SettingsError::WriteFailed { .. } => SettingsErrorCodes::WRITE_FAILED,
            SettingsError::Malformed { .. } => SettingsErrorCodes::MALFORMED,
            SettingsError::LockPoisoned => SettingsErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            SettingsError::ReadFailed { reason } => format!("Failed to read settings: {}", reason),
            SettingsError::WriteFailed { reason } => {
                format!("Failed to write settings: {}", reason)
            }
            SettingsError::Malformed { reason } => format!("Settings file is malformed: {}", reason),
            SettingsError::LockPoisoned => "Settings lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SettingsError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SettingsError {}
