//! Playback coordination
//!
//! The engine does not render anything itself. It tells a
//! [`PlaybackCoordinator`] which clips to show and when to resync them, and
//! the coordinator reports anchor-clip events back through an
//! [`EngineHandle`](crate::engine::EngineHandle).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clip::{Clip, ClipId};
use crate::engine::EngineHandle;
use crate::grid::GridSnapshot;

/// Rendering side of a performance
pub trait PlaybackCoordinator: Send + 'static {
    /// Show these clips, anchor first
    fn render_clips(&mut self, clips: &[Clip]);

    /// Rewind every looping clip and start them together
    fn restart_playback(&mut self);

    /// Show the generation grid
    fn render_grid(&mut self, _snapshot: &GridSnapshot) {}

    fn set_mirrored(&mut self, _mirrored: bool) {}
}

/// One call made on a [`RecordingCoordinator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCall {
    RenderClips(Vec<ClipId>),
    RestartPlayback,
    RenderGrid { generation: u32 },
    SetMirrored(bool),
}

/// Coordinator that keeps a log of every call
///
/// Clones share the same log, so a copy can be inspected while the
/// coordinator passed to the runtime is owned by the engine task.
#[derive(Debug, Default, Clone)]
pub struct RecordingCoordinator {
    calls: Arc<Mutex<Vec<PlaybackCall>>>,
}

impl RecordingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PlaybackCall> {
        self.lock().clone()
    }

    /// Clip ids of the most recent render
    pub fn last_rendered(&self) -> Option<Vec<ClipId>> {
        self.lock().iter().rev().find_map(|call| match call {
            PlaybackCall::RenderClips(ids) => Some(ids.clone()),
            _ => None,
        })
    }

    pub fn restarts(&self) -> usize {
        self.lock()
            .iter()
            .filter(|call| **call == PlaybackCall::RestartPlayback)
            .count()
    }

    fn record(&self, call: PlaybackCall) {
        self.lock().push(call);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PlaybackCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlaybackCoordinator for RecordingCoordinator {
    fn render_clips(&mut self, clips: &[Clip]) {
        self.record(PlaybackCall::RenderClips(clips.iter().map(Clip::id).collect()));
    }

    fn restart_playback(&mut self) {
        self.record(PlaybackCall::RestartPlayback);
    }

    fn render_grid(&mut self, snapshot: &GridSnapshot) {
        self.record(PlaybackCall::RenderGrid {
            generation: snapshot.generation,
        });
    }

    fn set_mirrored(&mut self, mirrored: bool) {
        self.record(PlaybackCall::SetMirrored(mirrored));
    }
}

/// Shortest anchor pass the simulated player will loop
const MIN_PASS: Duration = Duration::from_millis(100);

/// Headless player that loops the anchor clip on a timer
///
/// Each render "loads" the new anchor and then reports an ended event
/// after every pass of the anchor's duration. It holds an engine handle,
/// so the runtime must be shut down explicitly.
#[derive(Debug)]
pub struct SimulatedPlayer {
    handle: EngineHandle,
    pass: Option<CancellationToken>,
}

impl SimulatedPlayer {
    pub fn new(handle: EngineHandle) -> Self {
        Self { handle, pass: None }
    }

    fn stop_pass(&mut self) {
        if let Some(pass) = self.pass.take() {
            pass.cancel();
        }
    }
}

impl PlaybackCoordinator for SimulatedPlayer {
    fn render_clips(&mut self, clips: &[Clip]) {
        self.stop_pass();
        let Some(anchor) = clips.first() else {
            info!("stage cleared");
            return;
        };

        let length = anchor.duration().unwrap_or(MIN_PASS).max(MIN_PASS);
        info!(
            anchor = %anchor.id(),
            captured_at = %anchor.captured_at().format("%H:%M:%S%.3f"),
            layers = clips.len(),
            "playing clips"
        );

        let token = CancellationToken::new();
        self.pass = Some(token.clone());
        let handle = self.handle.clone();
        tokio::spawn(async move {
            if handle.on_anchor_playback_loaded().is_err() {
                return;
            }
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(length) => {
                        if handle.on_anchor_playback_ended().is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn restart_playback(&mut self) {
        info!("clips resynchronized");
    }

    fn render_grid(&mut self, snapshot: &GridSnapshot) {
        info!(generation = snapshot.generation, "grid\n{}", snapshot);
    }

    fn set_mirrored(&mut self, mirrored: bool) {
        info!(mirrored, "mirroring changed");
    }
}

impl Drop for SimulatedPlayer {
    fn drop(&mut self) {
        self.stop_pass();
    }
}
