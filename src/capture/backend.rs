//! Capture backend contract
//!
//! A backend turns a shared device stream into sessions. Each session
//! reports through a channel of [`BackendSignal`]s and is stopped through a
//! cancellation token. Backends must honour both an auto-stop after the
//! requested duration and an early stop, whichever comes first.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Handle on the live preview stream of a capture device
///
/// The stream is shared for the whole performance and never locked; only
/// the engine's single-session rule keeps captures from overlapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStream {
    label: String,
}

impl DeviceStream {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for DeviceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// What a running backend session reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSignal {
    /// Encoded media, in order
    Chunk(Vec<u8>),
    /// Data is finalized; `measured` is the backend's own length estimate
    Finished { measured: Option<Duration> },
    /// The backend gave up
    Failed(String),
}

/// One open session on a backend
#[derive(Debug)]
pub struct BackendSession {
    pub signals: mpsc::UnboundedReceiver<BackendSignal>,
    /// Cancelled to ask the backend to stop early
    pub stop: CancellationToken,
}

impl BackendSession {
    /// Session plus the sending side a backend implementation writes to
    pub fn channel() -> (Self, mpsc::UnboundedSender<BackendSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                signals: rx,
                stop: CancellationToken::new(),
            },
            tx,
        )
    }
}

/// A capture device driver
pub trait CaptureBackend: Send {
    /// Acquire the device and expose its preview stream
    ///
    /// Failing here is the one fatal error of a performance.
    fn acquire(&mut self) -> Result<DeviceStream>;

    /// Start recording `stream`, auto-stopping after `duration` when given
    fn open_session(
        &mut self,
        stream: &DeviceStream,
        duration: Option<Duration>,
    ) -> Result<BackendSession>;
}
