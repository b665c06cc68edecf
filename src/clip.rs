//! Recorded clips
//!
//! A clip is an immutable handle on one finished capture. The media payload
//! is opaque to the engine and shared between clones.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{LoopError, Result};

/// Sequence number assigned to each clip in capture order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

/// One recorded clip
#[derive(Debug, Clone)]
pub struct Clip {
    id: ClipId,
    media: Arc<[u8]>,
    duration: Option<Duration>,
    captured_at: DateTime<Utc>,
}

impl Clip {
    /// Wrap a finished capture
    ///
    /// Fails with [`LoopError::EmptyCapture`] when `media` is empty; empty
    /// captures must be discarded, never stored.
    ///
    /// # Example
    /// ```
    /// use layerloop::clip::{Clip, ClipId};
    /// use std::time::Duration;
    ///
    /// let clip = Clip::new(ClipId(0), vec![1, 2, 3], Some(Duration::from_secs(2))).unwrap();
    /// assert_eq!(clip.len(), 3);
    /// assert!(Clip::new(ClipId(1), Vec::new(), None).is_err());
    /// ```
    pub fn new(id: ClipId, media: Vec<u8>, duration: Option<Duration>) -> Result<Self> {
        if media.is_empty() {
            return Err(LoopError::EmptyCapture);
        }
        Ok(Self {
            id,
            media: Arc::from(media),
            duration,
            captured_at: Utc::now(),
        })
    }

    /// Copy of this clip stamped with a different duration
    pub fn with_duration(&self, duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..self.clone()
        }
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn media(&self) -> &[u8] {
        &self.media
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    /// Measured (or locked) playback length
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

impl PartialEq for Clip {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Clip {}
