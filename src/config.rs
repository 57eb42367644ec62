//! Configuration management for the instruction kiosk core
//!
//! This module provides runtime configuration loading from JSON files. The
//! recognised file extensions, the resource directory layout, the retry
//! ceiling and the countdown/cue durations can all be adjusted without
//! recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Resource directory layout and naming convention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Name of the resource directory on removable storage
    pub directory_name: String,
    /// Zero-byte file that makes the directory visible to host tooling
    pub marker_file_name: String,
    /// Extensions (lowercase, no dot) recognised as instruction audio
    pub audio_extensions: Vec<String>,
    /// Extensions (lowercase, no dot) recognised as icon images
    pub icon_extensions: Vec<String>,
    /// Separator between subject, language and cue offset
    pub delimiter: char,
    /// Wait for the host to confirm indexing of a newly created marker
    pub confirm_indexing: bool,
    /// Seconds to wait for the host to confirm marker indexing
    pub indexing_timeout_secs: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            directory_name: "instructions".to_string(),
            marker_file_name: ".visible".to_string(),
            audio_extensions: ["mp3", "wav", "ogg", "m4a", "aac", "flac"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            icon_extensions: ["png", "jpg", "jpeg", "webp", "gif"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            delimiter: '_',
            // Only Android has a media indexer that must see the marker
            confirm_indexing: cfg!(target_os = "android"),
            indexing_timeout_secs: 10,
        }
    }
}

/// Retry policy used by resource discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Countdown and cue durations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Longest countdown shown before the cue
    pub ideal_countdown_ms: u64,
    /// How long the cue stays visible
    pub ideal_cue_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            ideal_countdown_ms: 5000,
            ideal_cue_ms: 2000,
        }
    }
}

/// Persistent settings backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// File name of the JSON settings store inside the app data directory
    pub file_name: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            file_name: "kiosk_settings.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file doesn't exist or
    /// its JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the data directory handed over by the host
    ///
    /// Falls back to defaults when `kiosk_config.json` is absent.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let path = dir.as_ref().join("kiosk_config.json");
        if !path.exists() {
            log::info!("[Config] No config at {:?}, using defaults", path);
            return Self::default();
        }
        Self::load_from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.resources.directory_name, "instructions");
        assert_eq!(config.resources.delimiter, '_');
        assert!(config.resources.audio_extensions.contains(&"mp3".to_string()));
        assert!(config.resources.icon_extensions.contains(&"png".to_string()));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.playback.ideal_countdown_ms, 5000);
        assert_eq!(config.playback.ideal_cue_ms, 2000);
    }

    #[test]
    fn test_partial_json_uses_section_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "retry": { "max_attempts": 2 } }"#).unwrap();
        assert_eq!(parsed.retry.max_attempts, 2);
        assert_eq!(parsed.playback.ideal_cue_ms, 2000);
        assert_eq!(parsed.resources.marker_file_name, ".visible");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/definitely/not/here/kiosk_config.json");
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kiosk_config.json"),
            r#"{ "playback": { "ideal_countdown_ms": 3000, "ideal_cue_ms": 1000 } }"#,
        )
        .unwrap();

        let config = AppConfig::load_from_dir(dir.path());
        assert_eq!(config.playback.ideal_countdown_ms, 3000);
        assert_eq!(config.playback.ideal_cue_ms, 1000);
    }

    #[test]
    fn test_partial_resource_section() {
        let parsed: AppConfig = serde_json::from_str(
            r#"{ "resources": { "confirm_indexing": true, "indexing_timeout_secs": 60 } }"#,
        )
        .unwrap();
        assert!(parsed.resources.confirm_indexing);
        assert_eq!(parsed.resources.indexing_timeout_secs, 60);
        assert_eq!(parsed.resources.directory_name, "instructions");
    }
}
