//! Clock/Scheduler port and the cancellable timer set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::PlaybackError;

/// Work to run once a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Trait implemented by timer backends.
///
/// A callback whose handle was cancelled must never run.
pub trait Scheduler: Send + Sync {
    fn schedule_after(
        &self,
        delay: Duration,
        callback: TimerCallback,
    ) -> Result<TimerHandle, PlaybackError>;
}

/// Handle to one scheduled callback
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    /// Handle sharing `cancelled` with the backend that checks it before firing
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            abort: None,
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Cancel the timer. Returns true the first time only.
    pub fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        if first {
            if let Some(abort) = &self.abort {
                abort.abort();
            }
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// All timers armed for one session, cancelled as a unit
#[derive(Default)]
pub struct TimerSet {
    token: Option<u64>,
    handles: Vec<TimerHandle>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm every `(delay, callback)` pair for `token`
    ///
    /// If any timer cannot be armed, the ones already armed are cancelled and
    /// the error is returned, leaving the set empty.
    pub fn arm(
        &mut self,
        scheduler: &dyn Scheduler,
        token: u64,
        timers: Vec<(Duration, TimerCallback)>,
    ) -> Result<(), PlaybackError> {
        self.cancel_all();
        self.token = Some(token);
        for (delay, callback) in timers {
            match scheduler.schedule_after(delay, callback) {
                Ok(handle) => self.handles.push(handle),
                Err(err) => {
                    self.cancel_all();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Cancel every timer in the set. Returns how many handles this call cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.handles.iter().filter(|handle| handle.cancel()).count();
        if let Some(token) = self.token.take() {
            log::debug!(
                "[Timers] Cancelled {} pending timers for session {}",
                cancelled,
                token
            );
        }
        self.handles.clear();
        cancelled
    }

    pub fn token(&self) -> Option<u64> {
        self.token
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Scheduler backed by tokio timers
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(
        &self,
        delay: Duration,
        callback: TimerCallback,
    ) -> Result<TimerHandle, PlaybackError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                callback();
            }
        });
        Ok(TimerHandle::new(cancelled).with_abort(task.abort_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualScheduler;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> TimerCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_cancel_is_reported_once() {
        let handle = TimerHandle::new(Arc::new(AtomicBool::new(false)));
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_timer_set_cancels_as_unit() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut set = TimerSet::new();

        set.arm(
            &scheduler,
            7,
            vec![
                (Duration::from_millis(100), counting(&fired)),
                (Duration::from_millis(200), counting(&fired)),
                (Duration::from_millis(300), counting(&fired)),
            ],
        )
        .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.token(), Some(7));

        scheduler.advance_to(150);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert_eq!(set.cancel_all(), 3);
        assert!(set.is_empty());
        assert_eq!(set.cancel_all(), 0);

        scheduler.advance_to(1000);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_arm_failure_cancels_armed_timers() {
        let scheduler = ManualScheduler::new();
        scheduler.fail_after(1);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut set = TimerSet::new();

        let result = set.arm(
            &scheduler,
            1,
            vec![
                (Duration::from_millis(10), counting(&fired)),
                (Duration::from_millis(20), counting(&fired)),
            ],
        );
        assert!(matches!(result, Err(PlaybackError::SchedulingFailed { .. })));
        assert!(set.is_empty());

        scheduler.advance_to(100);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_fires_and_cancels() {
        let scheduler = TokioScheduler::new(Handle::current());
        let fired = Arc::new(AtomicUsize::new(0));

        let kept = scheduler
            .schedule_after(Duration::from_millis(5), counting(&fired))
            .unwrap();
        let dropped = scheduler
            .schedule_after(Duration::from_millis(5), counting(&fired))
            .unwrap();
        assert!(dropped.cancel());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!kept.is_cancelled());
    }
}
