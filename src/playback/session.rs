// PlaybackSession - per-instruction state owned by the synchronizer
//
// A session is created when an instruction is selected and dropped when the
// sequence finishes or is aborted. Its token tags every asynchronous
// callback so late events from a previous session are recognised and ignored.

use serde::{Deserialize, Serialize};

use crate::resources::Instruction;
use crate::timing::TimingPlan;

/// Named states of the playback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Selected,
    WaitingForReadiness,
    Playing,
    Finishing,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

/// Join of the audio and graphics readiness streams
///
/// Whichever side becomes ready last fires the join, exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessJoin {
    audio: bool,
    graphics: bool,
    fired: bool,
}

impl ReadinessJoin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark audio ready. Returns true if this completed the join.
    pub fn mark_audio(&mut self) -> bool {
        self.audio = true;
        self.try_fire()
    }

    /// Mark graphics ready. Returns true if this completed the join.
    pub fn mark_graphics(&mut self) -> bool {
        self.graphics = true;
        self.try_fire()
    }

    pub fn audio_ready(&self) -> bool {
        self.audio
    }

    pub fn graphics_ready(&self) -> bool {
        self.graphics
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    fn try_fire(&mut self) -> bool {
        if self.audio && self.graphics && !self.fired {
            self.fired = true;
            return true;
        }
        false
    }
}

/// State of one playback attempt
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub token: u64,
    pub instruction: Instruction,
    pub readiness: ReadinessJoin,
    pub audio_started: bool,
    pub audio_finished: bool,
    pub graphics_finished: bool,
    pub cue_shown: bool,
    pub timing_plan: Option<TimingPlan>,
}

impl PlaybackSession {
    pub fn new(token: u64, instruction: Instruction) -> Self {
        Self {
            token,
            instruction,
            readiness: ReadinessJoin::new(),
            audio_started: false,
            audio_finished: false,
            graphics_finished: false,
            cue_shown: false,
            timing_plan: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.audio_finished && self.graphics_finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_fires_once_audio_last() {
        let mut join = ReadinessJoin::new();
        assert!(!join.mark_graphics());
        assert!(join.mark_audio());
        assert!(!join.mark_audio());
        assert!(!join.mark_graphics());
        assert!(join.has_fired());
    }

    #[test]
    fn test_join_fires_once_graphics_last() {
        let mut join = ReadinessJoin::new();
        assert!(!join.mark_audio());
        assert!(join.mark_graphics());
        assert!(!join.mark_graphics());
    }

    #[test]
    fn test_session_finished_needs_both() {
        let mut session = PlaybackSession::new(
            1,
            Instruction {
                subject: "chest".to_string(),
                language: "english".to_string(),
                audio_location: "a.mp3".to_string(),
                cue_start_offset_ms: 4000,
            },
        );
        session.audio_finished = true;
        assert!(!session.is_finished());
        session.graphics_finished = true;
        assert!(session.is_finished());
    }

    #[test]
    fn test_idle_is_not_active() {
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::Playing.is_active());
    }
}
