// Error types for the instruction kiosk core
//
// This module defines custom error types for resource discovery, playback and
// settings operations, providing structured error handling with error codes
// suitable for FFI communication.

mod playback;
mod settings;
mod storage;

pub use playback::{log_playback_error, PlaybackError, PlaybackErrorCodes};
pub use settings::{log_settings_error, SettingsError, SettingsErrorCodes};
pub use storage::{log_storage_error, StorageError, StorageErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
