// Public API for flutter_rust_bridge integration
// FFI functions through which the Flutter shell drives resource discovery,
// instruction playback, navigation and settings.

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

use anyhow::{anyhow, Result};
use futures::Stream;
use once_cell::sync::OnceCell;

use crate::context::AppContext;
use crate::error::ErrorCode;
use crate::navigation::{NavigationOutcome, Scene};
use crate::playback::{PlaybackNotification, PlayerRequest, SessionState};
use crate::resources::{Icon, Instruction, ParseFailureKind, ParsedResourceSet};

// Re-export error code constants for FFI exposure
pub use crate::error::{PlaybackErrorCodes, SettingsErrorCodes, StorageErrorCodes};

/// Instruction as shown in the selection grid
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InstructionInfo {
    pub subject: String,
    pub language: String,
    pub audio_location: String,
    pub cue_start_offset_ms: i64,
}

impl From<&Instruction> for InstructionInfo {
    fn from(instruction: &Instruction) -> Self {
        Self {
            subject: instruction.subject.clone(),
            language: instruction.language.clone(),
            audio_location: instruction.audio_location.clone(),
            cue_start_offset_ms: instruction.cue_start_offset_ms,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IconInfo {
    pub subject: String,
    pub image_location: String,
}

impl From<&Icon> for IconInfo {
    fn from(icon: &Icon) -> Self {
        Self {
            subject: icon.subject.clone(),
            image_location: icon.image_location.clone(),
        }
    }
}

/// A storage entry that could not be used
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResourceFailureInfo {
    pub name: String,
    pub reason: String,
}

/// Snapshot of discovered resources
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResourceSummary {
    pub instructions: Vec<InstructionInfo>,
    pub icons: Vec<IconInfo>,
    pub failures: Vec<ResourceFailureInfo>,
}

impl From<&ParsedResourceSet> for ResourceSummary {
    fn from(resources: &ParsedResourceSet) -> Self {
        Self {
            instructions: resources.instructions().map(InstructionInfo::from).collect(),
            icons: resources.icons().map(IconInfo::from).collect(),
            failures: resources
                .failures()
                .iter()
                .map(|failure| ResourceFailureInfo {
                    name: failure.original_name.clone(),
                    reason: failure_reason(failure.failure).to_string(),
                })
                .collect(),
        }
    }
}

fn failure_reason(kind: ParseFailureKind) -> &'static str {
    match kind {
        ParseFailureKind::FileFormat => "unsupported file format",
        ParseFailureKind::FileNameEncoding => "file name is not valid UTF-8",
        ParseFailureKind::InstructionFileNameFormat => "expected subject_language_cue",
        ParseFailureKind::InstructionCueTime => "cue time is not a number",
    }
}

/// Flattened playback notification for Dart
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PlaybackEvent {
    /// state_changed, started, countdown, cue_shown, cue_cleared, finished or aborted
    pub kind: String,
    pub state: Option<String>,
    pub remaining_secs: Option<u64>,
    pub subject: Option<String>,
    pub language: Option<String>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
}

impl PlaybackEvent {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            state: None,
            remaining_secs: None,
            subject: None,
            language: None,
            error_code: None,
            error_message: None,
        }
    }

    fn with_instruction(mut self, instruction: &Instruction) -> Self {
        self.subject = Some(instruction.subject.clone());
        self.language = Some(instruction.language.clone());
        self
    }
}

impl From<&PlaybackNotification> for PlaybackEvent {
    fn from(notification: &PlaybackNotification) -> Self {
        match notification {
            PlaybackNotification::StateChanged { state } => {
                let mut event = Self::new("state_changed");
                event.state = Some(state_name(*state).to_string());
                event
            }
            PlaybackNotification::Started { instruction, .. } => {
                Self::new("started").with_instruction(instruction)
            }
            PlaybackNotification::Countdown { remaining_secs } => {
                let mut event = Self::new("countdown");
                event.remaining_secs = Some(*remaining_secs);
                event
            }
            PlaybackNotification::CueShown => Self::new("cue_shown"),
            PlaybackNotification::CueCleared => Self::new("cue_cleared"),
            PlaybackNotification::Finished { instruction } => {
                Self::new("finished").with_instruction(instruction)
            }
            PlaybackNotification::Aborted { instruction, error } => {
                let mut event = Self::new("aborted").with_instruction(instruction);
                if let Some(error) = error {
                    event.error_code = Some(error.code());
                    event.error_message = Some(error.message());
                }
                event
            }
        }
    }
}

/// Work for the host media player
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlayerRequestInfo {
    /// prepare, start, stop or release
    pub kind: String,
    /// Echo back through audio_prepared / audio_completed
    pub request_id: Option<u64>,
    pub source: Option<String>,
}

impl From<&PlayerRequest> for PlayerRequestInfo {
    fn from(request: &PlayerRequest) -> Self {
        let (kind, request_id, source) = match request {
            PlayerRequest::Prepare { request_id, source } => {
                ("prepare", Some(*request_id), Some(source.clone()))
            }
            PlayerRequest::Start { request_id } => ("start", Some(*request_id), None),
            PlayerRequest::Stop => ("stop", None, None),
            PlayerRequest::Release => ("release", None, None),
        };
        Self {
            kind: kind.to_string(),
            request_id,
            source,
        }
    }
}

fn state_name(state: SessionState) -> &'static str {
    match state {
        SessionState::Idle => "idle",
        SessionState::Selected => "selected",
        SessionState::WaitingForReadiness => "waiting_for_readiness",
        SessionState::Playing => "playing",
        SessionState::Finishing => "finishing",
    }
}

fn scene_from_name(name: &str) -> Result<Scene> {
    match name {
        "main" => Ok(Scene::Main),
        "authentication" => Ok(Scene::Authentication),
        "settings" => Ok(Scene::Settings),
        "instruction_playback" => Ok(Scene::InstructionPlayback),
        other => Err(anyhow!("Unknown scene: {}", other)),
    }
}

/// Global AppContext, created by [`init_app`]
static APP_CONTEXT: OnceCell<AppContext> = OnceCell::new();

fn context() -> Result<&'static AppContext> {
    APP_CONTEXT
        .get()
        .ok_or_else(|| anyhow!("App not initialized; call init_app first"))
}

/// Initialize the kiosk core
///
/// Safe to call more than once; later calls are ignored.
///
/// # Arguments
/// * `storage_root` - Removable storage root holding the instruction directory
/// * `data_dir` - App-private directory for config and settings
#[flutter_rust_bridge::frb(sync)]
pub fn init_app(storage_root: String, data_dir: String) -> Result<()> {
    crate::init_logging();
    APP_CONTEXT.get_or_try_init(|| AppContext::new(storage_root, &data_dir))?;
    Ok(())
}

/// Get the version of the kiosk core
#[flutter_rust_bridge::frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

// ============================================================================
// RESOURCES
// ============================================================================

/// Discovered instructions and icons
///
/// The first call scans storage (with retries); later calls return the cached
/// snapshot. Runs off the UI thread: while a new marker file awaits indexing
/// the host keeps polling [`pending_index_requests`] and answers through
/// [`confirm_indexed`].
///
/// # Errors
/// - Storage not readable, not writable or could not be listed
/// - Indexing of the marker file not confirmed in time
#[flutter_rust_bridge::frb]
pub fn get_resources() -> Result<ResourceSummary> {
    let resources = context()?.get_resources()?;
    Ok(ResourceSummary::from(resources.as_ref()))
}

/// Drop the cached scan and rescan storage
#[flutter_rust_bridge::frb]
pub fn refresh_resources() -> Result<ResourceSummary> {
    let resources = context()?.refresh_resources()?;
    Ok(ResourceSummary::from(resources.as_ref()))
}

/// Paths the host media indexer should scan before discovery can continue
#[flutter_rust_bridge::frb(sync)]
pub fn pending_index_requests() -> Result<Vec<String>> {
    Ok(context()?.pending_index_requests())
}

/// Host media indexer confirmed `path`; `error` is set when indexing failed
#[flutter_rust_bridge::frb(sync)]
pub fn confirm_indexed(path: String, error: Option<String>) -> Result<bool> {
    let result = match error {
        Some(reason) => Err(reason),
        None => Ok(()),
    };
    Ok(context()?.confirm_indexed(&path, result))
}

// ============================================================================
// PLAYBACK
// ============================================================================

/// Select an instruction and start its playback session
///
/// Returns the session token. Fails with SESSION_ACTIVE while another
/// instruction is playing.
#[flutter_rust_bridge::frb(sync)]
pub fn select_instruction(subject: String, language: String) -> Result<u64> {
    Ok(context()?.select_instruction(&subject, &language)?)
}

/// Countdown graphics are laid out and ready to animate
#[flutter_rust_bridge::frb(sync)]
pub fn graphics_prepared() -> Result<()> {
    Ok(context()?.graphics_prepared()?)
}

/// Requests for the host media player since the previous call, oldest first
#[flutter_rust_bridge::frb(sync)]
pub fn poll_player_requests() -> Result<Vec<PlayerRequestInfo>> {
    Ok(context()?
        .drain_player_requests()?
        .iter()
        .map(PlayerRequestInfo::from)
        .collect())
}

/// Host audio player finished preparing `request_id`
///
/// Returns false when the request was superseded (session aborted or a new
/// instruction selected); the report is then ignored.
#[flutter_rust_bridge::frb(sync)]
pub fn audio_prepared(
    request_id: u64,
    duration_ms: Option<u64>,
    error: Option<String>,
) -> Result<bool> {
    let result = match (duration_ms, error) {
        (_, Some(reason)) => Err(reason),
        (Some(duration_ms), None) => Ok(duration_ms),
        (None, None) => Err("no duration reported".to_string()),
    };
    Ok(context()?.audio_prepared(request_id, result)?)
}

/// Host audio player reached the end of the track started for `request_id`
#[flutter_rust_bridge::frb(sync)]
pub fn audio_completed(request_id: u64) -> Result<bool> {
    Ok(context()?.audio_completed(request_id)?)
}

#[flutter_rust_bridge::frb(sync)]
pub fn playback_state() -> Result<String> {
    Ok(state_name(context()?.playback_state()?).to_string())
}

/// Playback events since the previous call, oldest first
#[flutter_rust_bridge::frb(sync)]
pub fn poll_playback_events() -> Result<Vec<PlaybackEvent>> {
    Ok(context()?
        .drain_notifications()?
        .iter()
        .map(PlaybackEvent::from)
        .collect())
}

/// Stream of playback notifications for Rust-side consumers
#[flutter_rust_bridge::frb(ignore)]
pub fn playback_notifications() -> Result<impl Stream<Item = PlaybackNotification>> {
    Ok(context()?.playback().notifications())
}

// ============================================================================
// NAVIGATION
// ============================================================================

#[flutter_rust_bridge::frb(sync)]
pub fn navigate_to(scene: String) -> Result<()> {
    Ok(context()?.navigate_to(scene_from_name(&scene)?)?)
}

/// Back-navigation
///
/// Returns false when the app should close. Leaving the playback scene aborts
/// the running session first.
#[flutter_rust_bridge::frb(sync)]
pub fn navigate_back() -> Result<bool> {
    Ok(match context()?.navigate_back()? {
        NavigationOutcome::Popped { .. } => true,
        NavigationOutcome::CloseApplication => false,
    })
}

// ============================================================================
// SETTINGS
// ============================================================================

#[flutter_rust_bridge::frb(sync)]
pub fn verify_password(password: String) -> Result<bool> {
    Ok(context()?.verify_password(&password)?)
}

#[flutter_rust_bridge::frb(sync)]
pub fn set_password(password: String) -> Result<()> {
    Ok(context()?.settings().set_password(&password)?)
}

#[flutter_rust_bridge::frb(sync)]
pub fn has_password() -> Result<bool> {
    Ok(context()?.settings().has_password()?)
}

#[flutter_rust_bridge::frb(sync)]
pub fn get_kiosk_mode() -> Result<bool> {
    Ok(context()?.settings().kiosk_mode()?)
}

#[flutter_rust_bridge::frb(sync)]
pub fn set_kiosk_mode(enabled: bool) -> Result<()> {
    Ok(context()?.settings().set_kiosk_mode(enabled)?)
}

#[flutter_rust_bridge::frb(sync)]
pub fn get_instance_id() -> Result<String> {
    Ok(context()?.settings().instance_id()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybackError;

    #[test]
    fn test_scene_names() {
        assert_eq!(scene_from_name("settings").unwrap(), Scene::Settings);
        assert_eq!(
            scene_from_name("instruction_playback").unwrap(),
            Scene::InstructionPlayback
        );
        assert!(scene_from_name("nowhere").is_err());
    }

    #[test]
    fn test_aborted_event_carries_error_code() {
        let instruction = Instruction {
            subject: "chest".to_string(),
            language: "english".to_string(),
            audio_location: "chest_english_4000.mp3".to_string(),
            cue_start_offset_ms: 4000,
        };
        let event = PlaybackEvent::from(&PlaybackNotification::Aborted {
            instruction,
            error: Some(PlaybackError::SchedulingFailed {
                reason: "timer".to_string(),
            }),
        });
        assert_eq!(event.kind, "aborted");
        assert_eq!(event.subject.as_deref(), Some("chest"));
        assert_eq!(event.error_code, Some(PlaybackErrorCodes::SCHEDULING_FAILED));
    }

    #[test]
    fn test_player_request_info_carries_request_id() {
        let info = PlayerRequestInfo::from(&PlayerRequest::Prepare {
            request_id: 7,
            source: "/s/chest_english_4000.mp3".to_string(),
        });
        assert_eq!(info.kind, "prepare");
        assert_eq!(info.request_id, Some(7));
        assert_eq!(info.source.as_deref(), Some("/s/chest_english_4000.mp3"));

        let stop = PlayerRequestInfo::from(&PlayerRequest::Stop);
        assert_eq!(stop.kind, "stop");
        assert_eq!(stop.request_id, None);
    }

    #[test]
    fn test_countdown_event() {
        let event = PlaybackEvent::from(&PlaybackNotification::Countdown { remaining_secs: 3 });
        assert_eq!(event.kind, "countdown");
        assert_eq!(event.remaining_secs, Some(3));
    }

    #[test]
    fn test_summary_reports_failure_reasons() {
        let parser = crate::resources::ResourceParser::default();
        let resources: ParsedResourceSet = vec![
            parser.parse(b"chest_english_4000.mp3", "/s/chest_english_4000.mp3"),
            parser.parse(b"chest.xyz", "/s/chest.xyz"),
        ]
        .into_iter()
        .collect();

        let summary = ResourceSummary::from(&resources);
        assert_eq!(summary.instructions.len(), 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].reason, "unsupported file format");
    }
}
