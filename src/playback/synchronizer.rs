// PlaybackSynchronizer - state machine aligning audio, countdown and cue
//
// State flow:
//   Idle -> Selected -> WaitingForReadiness -> Playing -> Finishing -> Idle
// with abort() returning any active state straight to Idle.
//
// All methods take `&mut self`; the owner (normally the driver task) is the
// single serialized context for the session. Player and timer callbacks only
// post `SessionEvent`s tagged with the session token, which the owner feeds
// back through `handle_event`. Events carrying a stale token are dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::config::PlaybackConfig;
use crate::error::{log_playback_error, PlaybackError};
use crate::navigation::ActivePlayback;
use crate::resources::Instruction;
use crate::timing::{compute_timing_plan, TimingPlan};

use super::player::AudioPlayer;
use super::scheduler::{Scheduler, TimerCallback, TimerSet};
use super::session::{PlaybackSession, SessionState};

/// Asynchronous completion posted back to the session owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AudioPrepared { token: u64, duration_ms: u64 },
    AudioPrepareFailed { token: u64, reason: String },
    AudioFinished { token: u64 },
    CountdownTick { token: u64, remaining_secs: u64 },
    CueShown { token: u64 },
    CueCleared { token: u64 },
}

impl SessionEvent {
    pub fn token(&self) -> u64 {
        match self {
            SessionEvent::AudioPrepared { token, .. }
            | SessionEvent::AudioPrepareFailed { token, .. }
            | SessionEvent::AudioFinished { token }
            | SessionEvent::CountdownTick { token, .. }
            | SessionEvent::CueShown { token }
            | SessionEvent::CueCleared { token } => *token,
        }
    }
}

/// Notification for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackNotification {
    StateChanged {
        state: SessionState,
    },
    Started {
        instruction: Instruction,
        plan: TimingPlan,
    },
    Countdown {
        remaining_secs: u64,
    },
    CueShown,
    CueCleared,
    Finished {
        instruction: Instruction,
    },
    Aborted {
        instruction: Instruction,
        #[serde(skip)]
        error: Option<PlaybackError>,
    },
}

/// Drives one playback session at a time
pub struct PlaybackSynchronizer {
    player: Arc<dyn AudioPlayer>,
    scheduler: Arc<dyn Scheduler>,
    config: PlaybackConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    notifications: broadcast::Sender<PlaybackNotification>,
    state: SessionState,
    session: Option<PlaybackSession>,
    timers: TimerSet,
    next_token: u64,
}

impl PlaybackSynchronizer {
    /// Create an idle synchronizer
    ///
    /// # Arguments
    /// * `player` - Audio player port, owned exclusively by this synchronizer
    /// * `scheduler` - Timer backend for countdown and cue callbacks
    /// * `config` - Ideal countdown and cue durations
    /// * `events` - Channel the owner drains into [`Self::handle_event`]
    /// * `notifications` - Broadcast channel for presentation updates
    pub fn new(
        player: Arc<dyn AudioPlayer>,
        scheduler: Arc<dyn Scheduler>,
        config: PlaybackConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
        notifications: broadcast::Sender<PlaybackNotification>,
    ) -> Self {
        Self {
            player,
            scheduler,
            config,
            events,
            notifications,
            state: SessionState::Idle,
            session: None,
            timers: TimerSet::new(),
            next_token: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn timing_plan(&self) -> Option<TimingPlan> {
        self.session.as_ref().and_then(|s| s.timing_plan)
    }

    /// Number of timers currently armed for the session
    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackNotification> {
        self.notifications.subscribe()
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// Start a session for `instruction`
    ///
    /// Requests audio preparation; the session then waits for both audio and
    /// graphics readiness.
    ///
    /// # Returns
    /// * `Ok(token)` - Token of the new session
    /// * `Err(PlaybackError::SessionActive)` - Another session is running
    pub fn select_instruction(&mut self, instruction: Instruction) -> Result<u64, PlaybackError> {
        if self.state.is_active() {
            let err = PlaybackError::SessionActive;
            log_playback_error(&err, "select_instruction");
            return Err(err);
        }

        let token = self.next_token;
        self.next_token += 1;

        log::info!(
            "[Playback] Session {} selected {}/{}",
            token,
            instruction.subject,
            instruction.language
        );

        let source = instruction.audio_location.clone();
        self.session = Some(PlaybackSession::new(token, instruction));
        self.set_state(SessionState::Selected);

        let events = self.events.clone();
        self.player.prepare(
            &source,
            Box::new(move |result| {
                let event = match result {
                    Ok(duration_ms) => SessionEvent::AudioPrepared { token, duration_ms },
                    Err(reason) => SessionEvent::AudioPrepareFailed { token, reason },
                };
                let _ = events.send(event);
            }),
        );

        self.set_state(SessionState::WaitingForReadiness);
        Ok(token)
    }

    /// Apply an asynchronous completion
    pub fn handle_event(&mut self, event: SessionEvent) {
        let current = self.session.as_ref().map(|s| s.token);
        if current != Some(event.token()) {
            log::debug!(
                "[Playback] Ignoring stale event {:?} (current session {:?})",
                event,
                current
            );
            return;
        }

        match event {
            SessionEvent::AudioPrepared { duration_ms, .. } => self.on_audio_prepared(duration_ms),
            SessionEvent::AudioPrepareFailed { reason, .. } => {
                let error = self.session.as_ref().map(|session| {
                    PlaybackError::PreparationFailed {
                        subject: session.instruction.subject.clone(),
                        language: session.instruction.language.clone(),
                        reason,
                    }
                });
                if let Some(error) = error {
                    self.abort_with(Some(error));
                }
            }
            SessionEvent::AudioFinished { .. } => self.on_audio_finished(),
            SessionEvent::CountdownTick { remaining_secs, .. } => {
                self.notify(PlaybackNotification::Countdown { remaining_secs });
            }
            SessionEvent::CueShown { .. } => self.show_cue(),
            SessionEvent::CueCleared { .. } => {
                self.show_cue();
                self.notify(PlaybackNotification::CueCleared);
                self.on_graphics_finished();
            }
        }
    }

    /// Audio reported ready with its duration
    pub fn on_audio_prepared(&mut self, audio_duration_ms: u64) {
        let ideal_countdown_ms = self.config.ideal_countdown_ms;
        let ideal_cue_ms = self.config.ideal_cue_ms;
        let Some(session) = self.session.as_mut() else {
            log::debug!("[Playback] Audio prepared with no session");
            return;
        };

        let plan = compute_timing_plan(
            session.instruction.cue_start_offset_ms,
            audio_duration_ms,
            ideal_countdown_ms,
            ideal_cue_ms,
        );
        session.timing_plan = Some(plan);
        log::debug!("[Playback] Session {} audio ready: {:?}", session.token, plan);

        if session.readiness.mark_audio() {
            self.start_playback();
        }
    }

    /// Countdown graphics reported ready
    ///
    /// Returns false when there is no session to attach the readiness to.
    pub fn on_graphics_prepared(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            log::debug!("[Playback] Graphics prepared with no session");
            return false;
        };
        log::debug!("[Playback] Session {} graphics ready", session.token);

        if session.readiness.mark_graphics() {
            self.start_playback();
        }
        true
    }

    /// Audio reached the end of the track
    pub fn on_audio_finished(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.audio_finished = true;
        }
        self.check_finished();
    }

    /// Cue cleared; graphics have nothing more to show
    pub fn on_graphics_finished(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.graphics_finished = true;
        }
        self.check_finished();
    }

    /// Abort the active session
    ///
    /// Safe to call at any time. Returns false if nothing was active.
    pub fn abort(&mut self) -> bool {
        self.abort_with(None)
    }

    // ========================================================================
    // HELPER METHODS
    // ========================================================================

    fn start_playback(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(plan) = session.timing_plan else {
            return;
        };
        let token = session.token;
        let instruction = session.instruction.clone();
        session.audio_started = true;

        log::info!(
            "[Playback] Session {} playing: countdown {}ms at {}ms, cue {}..{}ms of {}ms",
            token,
            plan.countdown_duration_ms,
            plan.countdown_start_ms,
            plan.cue_start_ms,
            plan.cue_stop_ms,
            plan.audio_duration_ms
        );

        self.set_state(SessionState::Playing);

        let events = self.events.clone();
        self.player.start(Box::new(move || {
            let _ = events.send(SessionEvent::AudioFinished { token });
        }));

        if let Err(err) = self
            .timers
            .arm(self.scheduler.as_ref(), token, self.session_timers(token, &plan))
        {
            self.abort_with(Some(err));
            return;
        }

        self.notify(PlaybackNotification::Started { instruction, plan });
    }

    fn session_timers(&self, token: u64, plan: &TimingPlan) -> Vec<(Duration, TimerCallback)> {
        let mut timers: Vec<(Duration, TimerCallback)> = plan
            .countdown_ticks()
            .into_iter()
            .map(|(at_ms, remaining_secs)| {
                (
                    Duration::from_millis(at_ms),
                    self.post(SessionEvent::CountdownTick {
                        token,
                        remaining_secs,
                    }),
                )
            })
            .collect();

        timers.push((
            Duration::from_millis(plan.cue_start_ms),
            self.post(SessionEvent::CueShown { token }),
        ));
        timers.push((
            Duration::from_millis(plan.cue_stop_ms),
            self.post(SessionEvent::CueCleared { token }),
        ));
        timers
    }

    fn post(&self, event: SessionEvent) -> TimerCallback {
        let events = self.events.clone();
        Box::new(move || {
            let _ = events.send(event);
        })
    }

    fn show_cue(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.cue_shown {
            session.cue_shown = true;
            self.notify(PlaybackNotification::CueShown);
        }
    }

    fn check_finished(&mut self) {
        let finished = match &self.session {
            Some(session) => session.is_finished(),
            None => return,
        };

        if !finished {
            if self.state == SessionState::Playing {
                self.set_state(SessionState::Finishing);
            }
            return;
        }

        self.timers.cancel_all();
        self.player.release();
        if let Some(session) = self.session.take() {
            log::info!("[Playback] Session {} finished", session.token);
            self.set_state(SessionState::Idle);
            self.notify(PlaybackNotification::Finished {
                instruction: session.instruction,
            });
        }
    }

    fn abort_with(&mut self, error: Option<PlaybackError>) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        let cancelled = self.timers.cancel_all();
        if session.audio_started {
            self.player.stop();
        }
        self.player.release();

        match &error {
            Some(err) => log_playback_error(err, "abort"),
            None => log::info!(
                "[Playback] Session {} aborted ({} timers cancelled)",
                session.token,
                cancelled
            ),
        }

        self.set_state(SessionState::Idle);
        self.notify(PlaybackNotification::Aborted {
            instruction: session.instruction,
            error,
        });
        true
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.notify(PlaybackNotification::StateChanged { state });
        }
    }

    fn notify(&self, notification: PlaybackNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

impl ActivePlayback for PlaybackSynchronizer {
    fn abort_active(&mut self) -> bool {
        self.abort()
    }
}

impl Drop for PlaybackSynchronizer {
    fn drop(&mut self) {
        self.abort();
    }
}
