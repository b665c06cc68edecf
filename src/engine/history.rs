//! Bounded clip history
//!
//! Fixed-capacity ring of the most recent clips. Index 0 is the oldest clip
//! still held, which is also the anchor every other clip resyncs against.

use std::collections::VecDeque;

use crate::clip::{Clip, ClipId};

/// Oldest-first clip buffer with FIFO eviction
#[derive(Debug, Clone)]
pub struct ClipHistory {
    clips: VecDeque<Clip>,
    capacity: usize,
}

impl ClipHistory {
    /// Create an empty history holding at most `capacity` clips
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            clips: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a clip, returning the evicted oldest clip when full
    pub fn push(&mut self, clip: Clip) -> Option<Clip> {
        let evicted = if self.clips.len() == self.capacity {
            self.clips.pop_front()
        } else {
            None
        };
        self.clips.push_back(clip);
        evicted
    }

    /// Timing reference for synchronized playback
    pub fn anchor(&self) -> Option<&Clip> {
        self.clips.front()
    }

    pub fn latest(&self) -> Option<&Clip> {
        self.clips.back()
    }

    pub fn get(&self, index: usize) -> Option<&Clip> {
        self.clips.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter()
    }

    pub fn ids(&self) -> Vec<ClipId> {
        self.clips.iter().map(Clip::id).collect()
    }

    pub fn to_vec(&self) -> Vec<Clip> {
        self.clips.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.clips.clear();
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
