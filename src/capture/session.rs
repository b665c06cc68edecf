//! Capture sessions
//!
//! One start / stop / finish cycle against a backend. `finish` always
//! returns within the watchdog window: a backend that never reports back is
//! treated as finished with whatever it had sent so far.

use std::fmt;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{BackendSignal, CaptureBackend, DeviceStream};
use crate::clip::{Clip, ClipId};
use crate::error::{LoopError, Result};

/// Identifies one capture session over the engine's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Cloneable handle that stops a session from elsewhere
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Ask the backend to stop; later calls do nothing
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// An in-flight capture
#[derive(Debug)]
pub struct CaptureSession {
    id: SessionId,
    signals: tokio::sync::mpsc::UnboundedReceiver<BackendSignal>,
    stop: StopHandle,
    requested: Option<Duration>,
    watchdog: Duration,
    started_at: Instant,
}

impl CaptureSession {
    /// Open a session on `backend`
    ///
    /// With `duration` set the backend stops on its own after that long;
    /// otherwise the session runs until [`stop`](Self::stop) or the watchdog.
    pub fn start(
        backend: &mut dyn CaptureBackend,
        stream: &DeviceStream,
        id: SessionId,
        duration: Option<Duration>,
        watchdog: Duration,
    ) -> Result<Self> {
        let session = backend.open_session(stream, duration)?;
        debug!(%id, ?duration, %stream, "capture session opened");

        Ok(Self {
            id,
            signals: session.signals,
            stop: StopHandle {
                token: session.stop,
            },
            requested: duration,
            watchdog,
            started_at: Instant::now(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn requested_duration(&self) -> Option<Duration> {
        self.requested
    }

    /// Stop the capture early; a no-op once stopped or finished
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Wait for the backend to finalize and build the clip
    ///
    /// Errors:
    /// - [`LoopError::CaptureBackend`] when the backend reports a failure
    /// - [`LoopError::EmptyCapture`] when nothing was buffered
    ///
    /// Hitting the watchdog is not an error.
    pub async fn finish(mut self) -> Result<Clip> {
        let deadline = self.started_at + self.watchdog;
        let mut data = Vec::new();
        let mut measured = None;

        loop {
            match timeout_at(deadline, self.signals.recv()).await {
                Ok(Some(BackendSignal::Chunk(bytes))) => data.extend_from_slice(&bytes),
                Ok(Some(BackendSignal::Finished { measured: m })) => {
                    measured = m;
                    break;
                }
                Ok(Some(BackendSignal::Failed(reason))) => {
                    warn!(id = %self.id, %reason, "capture backend failed");
                    return Err(LoopError::CaptureBackend { reason });
                }
                Ok(None) => {
                    debug!(id = %self.id, "backend closed without finishing");
                    break;
                }
                Err(_) => {
                    warn!(
                        id = %self.id,
                        watchdog_ms = self.watchdog.as_millis() as u64,
                        buffered = data.len(),
                        "capture watchdog fired, keeping buffered data"
                    );
                    self.stop.stop();
                    break;
                }
            }
        }

        let duration = measured.unwrap_or_else(|| self.started_at.elapsed());
        debug!(
            id = %self.id,
            requested = ?self.requested,
            ?duration,
            bytes = data.len(),
            "capture finished"
        );
        Clip::new(ClipId(self.id.0), data, Some(duration))
    }
}
