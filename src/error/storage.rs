// Storage error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Storage error code constants exposed to Dart via FFI
///
/// Error code range: 3001-3007
#[frb(unignore)]
pub struct StorageErrorCodes {}

#[frb]
impl StorageErrorCodes {
    /// Backing storage is not mounted or not readable
    pub const NOT_READABLE: i32 = 3001;

    /// Resource directory is missing and storage is not writable
    pub const NOT_WRITABLE: i32 = 3002;

    /// Resource directory could not be created
    pub const DIRECTORY_CREATE_FAILED: i32 = 3003;

    /// Visibility marker file could not be created
    pub const MARKER_FILE_CREATE_FAILED: i32 = 3004;

    /// External indexing of the marker file was not confirmed
    pub const INDEXING_FAILED: i32 = 3005;

    /// Resource directory could not be enumerated
    pub const LISTING_FAILED: i32 = 3006;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 3007;

    /// Get NOT_READABLE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_readable() -> i32 {
        Self::NOT_READABLE
    }

    /// Get NOT_WRITABLE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_writable() -> i32 {
        Self::NOT_WRITABLE
    }

    /// Get DIRECTORY_CREATE_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn directory_create_failed() -> i32 {
        Self::DIRECTORY_CREATE_FAILED
    }

    /// Get MARKER_FILE_CREATE_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn marker_file_create_failed() -> i32 {
        Self::MARKER_FILE_CREATE_FAILED
    }

    /// Get INDEXING_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn indexing_failed() -> i32 {
        Self::INDEXING_FAILED
    }

    /// Get LISTING_FAILED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn listing_failed() -> i32 {
        Self::LISTING_FAILED
    }

    /// Get LOCK_POISONED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }
}

/// Log a storage error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_storage_error(err: &StorageError, context: &str) {
    error!(
        "Storage error in {}: code={}, component=InstructionStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Resource discovery errors
///
/// These cover every step of discovery before the directory listing is
/// parsed. Parse failures are not errors; they are reported as data in the
/// parsed resource set.
///
/// Error code range: 3001-3007
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Backing storage is not readable
    NotReadable,

    /// Resource directory is missing and cannot be created
    NotWritable { directory: String },

    /// Directory creation failed even though storage reported writable
    DirectoryCreateFailed { directory: String, reason: String },

    /// Marker file creation failed
    MarkerFileCreateFailed { path: String, reason: String },

    /// Indexing confirmation for the marker file failed or timed out
    IndexingFailed { path: String, reason: String },

    /// Directory enumeration failed
    ListingFailed { directory: String, reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for StorageError {
    fn code(&self) -> i32 {
        match self {
            StorageError::NotReadable => StorageErrorCodes::NOT_READABLE,
            StorageError::NotWritable { .. } => StorageErrorCodes::NOT_WRITABLE,
            StorageError::DirectoryCreateFailed { .. } => {
                StorageErrorCodes::DIRECTORY_CREATE_FAILED
            }
            StorageError::MarkerFileCreateFailed { .. } => {
                StorageErrorCodes::MARKER_FILE_CREATE_FAILED
            }
            StorageError::IndexingFailed { .. } => StorageErrorCodes::INDEXING_FAILED,
            StorageError::ListingFailed { .. } => StorageErrorCodes::LISTING_FAILED,
            StorageError::LockPoisoned { .. } => StorageErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            StorageError::NotReadable => {
                "Storage is not readable. Check that the storage card is inserted.".to_string()
            }
            StorageError::NotWritable { directory } => {
                format!(
                    "Storage is not writable and the directory {} is missing",
                    directory
                )
            }
            StorageError::DirectoryCreateFailed { directory, reason } => {
                format!("Could not create directory {}: {}", directory, reason)
            }
            StorageError::MarkerFileCreateFailed { path, reason } => {
                format!("Could not create marker file {}: {}", path, reason)
            }
            StorageError::IndexingFailed { path, reason } => {
                format!("Marker file {} was not indexed: {}", path, reason)
            }
            StorageError::ListingFailed { directory, reason } => {
                format!("Could not list directory {}: {}", directory, reason)
            }
            StorageError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StorageError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StorageError {}
