//! Simulated capture backend
//!
//! Produces one fake frame per interval so the engine can be rehearsed
//! without a camera. Failure modes can be switched on to exercise the
//! engine's error paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use super::backend::{BackendSession, BackendSignal, CaptureBackend, DeviceStream};
use crate::error::{LoopError, Result};

/// Default simulated frame interval (~30 fps)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Default simulated frame size in bytes
pub const DEFAULT_FRAME_BYTES: usize = 64;

/// Counters shared between a simulated backend and its sessions
#[derive(Debug, Default)]
pub struct SimulatedStats {
    opened: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SimulatedStats {
    /// Sessions opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions currently producing data
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of sessions that were ever active at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn session_started(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn session_ended(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fake camera that emits numbered frames
///
/// Sessions are driven by tokio tasks, so `open_session` must be called
/// from inside a runtime.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    frame_interval: Duration,
    frame_bytes: usize,
    available: bool,
    fail_with: Option<String>,
    stall: bool,
    stats: Arc<SimulatedStats>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            frame_bytes: DEFAULT_FRAME_BYTES,
            available: true,
            fail_with: None,
            stall: false,
            stats: Arc::new(SimulatedStats::default()),
        }
    }

    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    pub fn with_frame_bytes(mut self, frame_bytes: usize) -> Self {
        self.frame_bytes = frame_bytes;
        self
    }

    /// No device attached: `acquire` fails
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Every session fails after its first frame
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }

    /// Sessions emit one frame and then never report back
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn stats(&self) -> Arc<SimulatedStats> {
        Arc::clone(&self.stats)
    }
}

impl CaptureBackend for SimulatedBackend {
    fn acquire(&mut self) -> Result<DeviceStream> {
        if !self.available {
            return Err(LoopError::DeviceUnavailable {
                reason: "simulated device is switched off".to_string(),
            });
        }
        Ok(DeviceStream::new("simulated-camera"))
    }

    fn open_session(
        &mut self,
        stream: &DeviceStream,
        duration: Option<Duration>,
    ) -> Result<BackendSession> {
        let (session, tx) = BackendSession::channel();
        let stop = session.stop.clone();
        let stats = Arc::clone(&self.stats);
        let frame_interval = self.frame_interval;
        let frame_bytes = self.frame_bytes;
        let fail_with = self.fail_with.clone();
        let stall = self.stall;
        debug!(%stream, ?duration, "simulated session opening");

        stats.session_started();
        tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut frame: u8 = 0;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(BackendSignal::Chunk(vec![frame; frame_bytes])).is_err() {
                            break;
                        }
                        frame = frame.wrapping_add(1);

                        if let Some(reason) = &fail_with {
                            stats.session_ended();
                            let _ = tx.send(BackendSignal::Failed(reason.clone()));
                            return;
                        }
                        if stall {
                            stop.cancelled().await;
                            stats.session_ended();
                            return;
                        }
                        if duration.is_some_and(|d| started.elapsed() >= d) {
                            break;
                        }
                    }
                }
            }

            stats.session_ended();
            let _ = tx.send(BackendSignal::Finished {
                measured: Some(started.elapsed()),
            });
        });

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::session::{CaptureSession, SessionId};

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new()
            .with_frame_interval(Duration::from_millis(100))
            .with_frame_bytes(2)
    }

    #[test]
    fn test_unavailable_device() {
        let err = SimulatedBackend::new().unavailable().acquire().unwrap_err();
        assert_eq!(err.error_code(), "DEVICE_UNAVAILABLE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_stops_after_duration() {
        let mut backend = backend();
        let stream = backend.acquire().unwrap();
        let session = CaptureSession::start(
            &mut backend,
            &stream,
            SessionId(0),
            Some(Duration::from_millis(1000)),
            Duration::from_secs(60),
        )
        .unwrap();

        let clip = session.finish().await.unwrap();
        assert_eq!(clip.duration(), Some(Duration::from_millis(1000)));
        // Frames at 0, 100, ..., 1000 ms
        assert_eq!(clip.len(), 11 * 2);
        assert_eq!(backend.stats().active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_stop() {
        let mut backend = backend();
        let stream = backend.acquire().unwrap();
        let session = CaptureSession::start(
            &mut backend,
            &stream,
            SessionId(1),
            None,
            Duration::from_secs(60),
        )
        .unwrap();
        let handle = session.stop_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            handle.stop();
        });

        let clip = session.finish().await.unwrap();
        assert_eq!(clip.duration(), Some(Duration::from_millis(450)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_backend() {
        let mut backend = backend().failing("disk full");
        let stream = backend.acquire().unwrap();
        let session =
            CaptureSession::start(&mut backend, &stream, SessionId(2), None, Duration::from_secs(60))
                .unwrap();

        let err = session.finish().await.unwrap_err();
        assert_eq!(err.to_string(), "Capture backend failed: disk full");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalling_backend_hits_watchdog() {
        let mut backend = backend().stalling();
        let stream = backend.acquire().unwrap();
        let session = CaptureSession::start(
            &mut backend,
            &stream,
            SessionId(3),
            Some(Duration::from_millis(500)),
            Duration::from_secs(5),
        )
        .unwrap();

        let clip = session.finish().await.unwrap();
        assert_eq!(clip.len(), 2);
        assert_eq!(clip.duration(), Some(Duration::from_secs(5)));
    }
}
