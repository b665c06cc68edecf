//! Recording state of the loop engine

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the engine is in its capture cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// Nothing scheduled (default state)
    #[default]
    Idle,
    /// A capture is armed and will start when the countdown elapses
    /// or the anchor clip finishes playing
    Queued,
    /// A capture is in flight
    Recording,
    /// The performance is running and layering new captures
    Looping,
}

impl RecordingState {
    /// Whether anchor playback events are acted on in this state
    pub fn follows_playback(&self) -> bool {
        !matches!(self, RecordingState::Idle)
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "Idle"),
            RecordingState::Queued => write!(f, "Queued"),
            RecordingState::Recording => write!(f, "Recording"),
            RecordingState::Looping => write!(f, "Looping"),
        }
    }
}
