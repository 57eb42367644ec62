//! Navigation stack of the kiosk screens.
//!
//! The stack always holds at least one scene while the app runs; popping the
//! last one means "close the application". Leaving the instruction playback
//! scene aborts the running session first.

use serde::{Deserialize, Serialize};

/// Anything that owns a playback session that back-navigation must end
pub trait ActivePlayback {
    /// Abort the active session, if any. Returns true if an abort was issued.
    fn abort_active(&mut self) -> bool;
}

/// Screen context markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    Main,
    Authentication,
    Settings,
    InstructionPlayback,
}

/// Result of a back-navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Popped { from: Scene, to: Scene },
    CloseApplication,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStack {
    scenes: Vec<Scene>,
}

impl NavigationStack {
    /// Stack holding only the main scene
    pub fn new() -> Self {
        Self::with_root(Scene::Main)
    }

    pub fn with_root(root: Scene) -> Self {
        Self { scenes: vec![root] }
    }

    pub fn push(&mut self, scene: Scene) {
        log::debug!("[Navigation] Push {:?} (depth {})", scene, self.scenes.len() + 1);
        self.scenes.push(scene);
    }

    /// Remove the top scene, or report that the application should close
    pub fn pop(&mut self) -> NavigationOutcome {
        if self.scenes.len() <= 1 {
            log::info!("[Navigation] Back on root scene, closing application");
            return NavigationOutcome::CloseApplication;
        }
        match (self.scenes.pop(), self.scenes.last()) {
            (Some(from), Some(&to)) => {
                log::debug!("[Navigation] Pop {:?} -> {:?}", from, to);
                NavigationOutcome::Popped { from, to }
            }
            _ => NavigationOutcome::CloseApplication,
        }
    }

    /// Top scene. The stack is never empty.
    pub fn peek(&self) -> Scene {
        self.scenes.last().copied().unwrap_or(Scene::Main)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Back-navigation requested by the user
    ///
    /// When the top scene is instruction playback, `playback` is told to abort
    /// before the scene is popped.
    pub fn navigate_back(&mut self, playback: &mut dyn ActivePlayback) -> NavigationOutcome {
        if self.peek() == Scene::InstructionPlayback {
            let aborted = playback.abort_active();
            log::debug!("[Navigation] Abort before leaving playback: {}", aborted);
        }
        self.pop()
    }

    /// Pop the playback scene after its session ended on its own
    ///
    /// Returns `None` if playback is not on top, e.g. when the user already
    /// navigated away.
    pub fn leave_playback_scene(&mut self) -> Option<NavigationOutcome> {
        if self.peek() != Scene::InstructionPlayback {
            return None;
        }
        Some(self.pop())
    }
}

impl Default for NavigationStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingPlayback {
        aborts: usize,
    }

    impl ActivePlayback for CountingPlayback {
        fn abort_active(&mut self) -> bool {
            self.aborts += 1;
            true
        }
    }

    #[test]
    fn test_push_pop_peek() {
        let mut stack = NavigationStack::new();
        stack.push(Scene::InstructionPlayback);
        assert_eq!(stack.peek(), Scene::InstructionPlayback);
        assert_eq!(
            stack.pop(),
            NavigationOutcome::Popped {
                from: Scene::InstructionPlayback,
                to: Scene::Main
            }
        );
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_pop_last_closes_application() {
        let mut stack = NavigationStack::new();
        assert_eq!(stack.pop(), NavigationOutcome::CloseApplication);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.peek(), Scene::Main);
    }

    #[test]
    fn test_back_from_playback_aborts_first() {
        let mut stack = NavigationStack::new();
        let mut playback = CountingPlayback::default();
        stack.push(Scene::InstructionPlayback);

        let outcome = stack.navigate_back(&mut playback);
        assert_eq!(playback.aborts, 1);
        assert_eq!(
            outcome,
            NavigationOutcome::Popped {
                from: Scene::InstructionPlayback,
                to: Scene::Main
            }
        );
    }

    #[test]
    fn test_back_from_other_scene_does_not_abort() {
        let mut stack = NavigationStack::new();
        let mut playback = CountingPlayback::default();
        stack.push(Scene::Settings);

        stack.navigate_back(&mut playback);
        assert_eq!(playback.aborts, 0);
        assert_eq!(
            stack.navigate_back(&mut playback),
            NavigationOutcome::CloseApplication
        );
        assert_eq!(playback.aborts, 0);
    }

    #[test]
    fn test_leave_playback_scene_only_when_on_top() {
        let mut stack = NavigationStack::new();
        assert_eq!(stack.leave_playback_scene(), None);

        stack.push(Scene::InstructionPlayback);
        assert!(matches!(
            stack.leave_playback_scene(),
            Some(NavigationOutcome::Popped { .. })
        ));
        assert_eq!(stack.leave_playback_scene(), None);
    }
}
