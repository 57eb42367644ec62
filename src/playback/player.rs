//! AudioPlayer port and its implementations.
//!
//! Completion is reported through callbacks, which may run on any thread.
//! The synchronizer only uses them to post session events, never to mutate
//! session state directly.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

/// Called once preparation finishes with the duration in ms or a failure reason
pub type PrepareCallback = Box<dyn FnOnce(Result<u64, String>) + Send>;

/// Called once playback reaches the end of the track
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Trait implemented by platform-specific audio players.
///
/// `release()` must tolerate repeated calls and calls without a prior
/// `start()`.
pub trait AudioPlayer: Send + Sync {
    fn prepare(&self, source: &str, on_prepared: PrepareCallback);
    fn start(&self, on_completion: CompletionCallback);
    fn stop(&self);
    fn release(&self);
}

/// Read the duration of a WAV file from its header
pub fn wav_duration_ms<P: AsRef<Path>>(path: P) -> Result<u64, String> {
    let reader = hound::WavReader::open(path).map_err(|err| err.to_string())?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err("WAV header reports a zero sample rate".to_string());
    }
    Ok(reader.duration() as u64 * 1000 / spec.sample_rate as u64)
}

/// Desktop player for WAV instructions.
///
/// Reads the duration with `hound` and simulates playback on a tokio timer
/// without opening an audio device. Used by the CLI and desktop runs.
pub struct WavFilePlayer {
    runtime: Handle,
    duration_ms: Mutex<Option<u64>>,
    playback: Mutex<Option<AbortHandle>>,
    released: AtomicBool,
}

impl WavFilePlayer {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            duration_ms: Mutex::new(None),
            playback: Mutex::new(None),
            released: AtomicBool::new(true),
        }
    }

    fn cancel_playback(&self) {
        if let Ok(mut playback) = self.playback.lock() {
            if let Some(handle) = playback.take() {
                handle.abort();
            }
        }
    }
}

impl AudioPlayer for WavFilePlayer {
    fn prepare(&self, source: &str, on_prepared: PrepareCallback) {
        self.released.store(false, Ordering::SeqCst);
        let source = source.to_string();
        let result = wav_duration_ms(&source);
        if let Ok(duration) = &result {
            if let Ok(mut slot) = self.duration_ms.lock() {
                *slot = Some(*duration);
            }
        }
        log::debug!("[WavFilePlayer] Prepared {}: {:?}", source, result);
        // Completion is delivered asynchronously, like a platform player would.
        self.runtime.spawn(async move { on_prepared(result) });
    }

    fn start(&self, on_completion: CompletionCallback) {
        let duration = self
            .duration_ms
            .lock()
            .ok()
            .and_then(|slot| *slot)
            .unwrap_or(0);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(duration)).await;
            on_completion();
        });
        if let Ok(mut playback) = self.playback.lock() {
            *playback = Some(task.abort_handle());
        }
    }

    fn stop(&self) {
        self.cancel_playback();
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_playback();
        if let Ok(mut slot) = self.duration_ms.lock() {
            *slot = None;
        }
        log::debug!("[WavFilePlayer] Released");
    }
}

/// Request forwarded to a host-side player (Android MediaPlayer)
///
/// Every prepared source gets a fresh `request_id`. The host echoes it back
/// so reports about an earlier source can be told apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerRequest {
    Prepare { request_id: u64, source: String },
    Start { request_id: u64 },
    Stop,
    Release,
}

type PendingSlot<T> = Mutex<Option<(u64, T)>>;

/// Player whose work is done by the host platform.
///
/// Requests are broadcast to the host, which reports back through
/// [`HostAudioPlayer::prepared`] and [`HostAudioPlayer::completed`].
/// Reports carrying any request id other than the pending one are dropped.
pub struct HostAudioPlayer {
    requests: broadcast::Sender<PlayerRequest>,
    next_request_id: AtomicU64,
    current_request_id: AtomicU64,
    pending_prepare: PendingSlot<PrepareCallback>,
    pending_completion: PendingSlot<CompletionCallback>,
}

impl HostAudioPlayer {
    pub fn new() -> Self {
        let (requests, _) = broadcast::channel(32);
        Self {
            requests,
            next_request_id: AtomicU64::new(1),
            current_request_id: AtomicU64::new(0),
            pending_prepare: Mutex::new(None),
            pending_completion: Mutex::new(None),
        }
    }

    pub fn subscribe_requests(&self) -> broadcast::Receiver<PlayerRequest> {
        self.requests.subscribe()
    }

    /// Host finished preparing `request_id`.
    ///
    /// Returns false when that request is no longer pending (released,
    /// superseded or already reported).
    pub fn prepared(&self, request_id: u64, result: Result<u64, String>) -> bool {
        match take_matching(&self.pending_prepare, request_id) {
            Some(callback) => {
                callback(result);
                true
            }
            None => {
                log::debug!(
                    "[HostAudioPlayer] Ignoring prepare result for stale request {}",
                    request_id
                );
                false
            }
        }
    }

    /// Host reached the end of the track started for `request_id`.
    /// Returns false if that track is not playing.
    pub fn completed(&self, request_id: u64) -> bool {
        match take_matching(&self.pending_completion, request_id) {
            Some(callback) => {
                callback();
                true
            }
            None => {
                log::debug!(
                    "[HostAudioPlayer] Ignoring completion for stale request {}",
                    request_id
                );
                false
            }
        }
    }

    fn send(&self, request: PlayerRequest) {
        if self.requests.send(request.clone()).is_err() {
            log::warn!("[HostAudioPlayer] No host listening for {:?}", request);
        }
    }
}

impl Default for HostAudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

fn take_matching<T>(slot: &PendingSlot<T>, request_id: u64) -> Option<T> {
    let mut slot = slot.lock().ok()?;
    let is_pending = matches!(slot.as_ref(), Some((pending, _)) if *pending == request_id);
    if is_pending {
        slot.take().map(|(_, value)| value)
    } else {
        None
    }
}

impl AudioPlayer for HostAudioPlayer {
    fn prepare(&self, source: &str, on_prepared: PrepareCallback) {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        self.current_request_id.store(request_id, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending_prepare.lock() {
            *pending = Some((request_id, on_prepared));
        }
        self.send(PlayerRequest::Prepare {
            request_id,
            source: source.to_string(),
        });
    }

    fn start(&self, on_completion: CompletionCallback) {
        let request_id = self.current_request_id.load(Ordering::SeqCst);
        if let Ok(mut pending) = self.pending_completion.lock() {
            *pending = Some((request_id, on_completion));
        }
        self.send(PlayerRequest::Start { request_id });
    }

    fn stop(&self) {
        self.send(PlayerRequest::Stop);
    }

    fn release(&self) {
        let had_callbacks = {
            let prepare = self.pending_prepare.lock().ok().and_then(|mut p| p.take());
            let completion = self
                .pending_completion
                .lock()
                .ok()
                .and_then(|mut p| p.take());
            prepare.is_some() || completion.is_some()
        };
        log::debug!(
            "[HostAudioPlayer] Release (dropped pending callbacks: {})",
            had_callbacks
        );
        self.send(PlayerRequest::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn write_wav(path: &Path, sample_rate: u32, frames: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chest_english_100.wav");
        write_wav(&path, 8000, 4000);
        assert_eq!(wav_duration_ms(&path).unwrap(), 500);
    }

    #[test]
    fn test_wav_duration_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"not a wav").unwrap();
        assert!(wav_duration_ms(&path).is_err());
    }

    #[tokio::test]
    async fn test_wav_player_prepare_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 1000, 20);

        let player = WavFilePlayer::new(Handle::current());
        let (tx, rx) = tokio::sync::oneshot::channel();
        player.prepare(&path.display().to_string(), Box::new(move |r| {
            let _ = tx.send(r);
        }));
        assert_eq!(rx.await.unwrap(), Ok(20));

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        player.start(Box::new(move || {
            let _ = done_tx.send(());
        }));
        assert!(done_rx.await.is_ok());

        player.release();
        player.release();
    }

    #[test]
    fn test_host_player_round_trip() {
        let player = HostAudioPlayer::new();
        let mut requests = player.subscribe_requests();
        let (tx, rx) = mpsc::channel();

        player.prepare("chest.mp3", Box::new(move |r| tx.send(r).unwrap()));
        assert_eq!(
            requests.try_recv().unwrap(),
            PlayerRequest::Prepare {
                request_id: 1,
                source: "chest.mp3".to_string()
            }
        );
        assert!(player.prepared(1, Ok(9000)));
        assert_eq!(rx.recv().unwrap(), Ok(9000));
        assert!(!player.prepared(1, Ok(1)));

        let (done_tx, done_rx) = mpsc::channel();
        player.start(Box::new(move || done_tx.send(()).unwrap()));
        assert_eq!(
            requests.try_recv().unwrap(),
            PlayerRequest::Start { request_id: 1 }
        );
        assert!(!player.completed(2));
        assert!(player.completed(1));
        assert!(done_rx.recv().is_ok());

        player.release();
        player.release();
        assert!(!player.completed(1));
    }

    #[test]
    fn test_host_player_drops_report_for_superseded_source() {
        let player = HostAudioPlayer::new();
        let (tx, rx) = mpsc::channel();

        let old_tx = tx.clone();
        player.prepare("old.mp3", Box::new(move |r| old_tx.send(("old", r)).unwrap()));
        player.release();
        player.prepare("new.mp3", Box::new(move |r| tx.send(("new", r)).unwrap()));

        assert!(!player.prepared(1, Ok(1234)));
        assert!(rx.try_recv().is_err());

        assert!(player.prepared(2, Ok(5000)));
        assert_eq!(rx.recv().unwrap(), ("new", Ok(5000)));
    }
}
