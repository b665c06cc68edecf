//! Loop Engine State Machine
//!
//! Owns the recording state, the duration lock and the clip history, and
//! decides when captures start and stop. The engine never performs I/O:
//! each event returns a list of [`Directive`]s for the runtime to carry out,
//! and the outcome of that work comes back later as another event.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::history::ClipHistory;
use super::state::RecordingState;
use crate::capture::SessionId;
use crate::clip::{Clip, ClipId};
use crate::command::Command;
use crate::config::{EngineMode, LoopConfig};
use crate::error::{LoopError, Result};
use crate::grid::{GenerationGrid, GridSnapshot};

/// Identifies one armed countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountdownId(pub u64);

impl fmt::Display for CountdownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "countdown#{}", self.0)
    }
}

/// Everything that can happen to the engine
#[derive(Debug)]
pub enum EngineEvent {
    /// A resolved user or voice command
    Command(Command),
    /// A scheduled countdown ran out
    CountdownElapsed(CountdownId),
    /// A capture session produced its result
    CaptureFinished {
        session: SessionId,
        result: Result<Clip>,
    },
    /// The anchor clip played to its end
    AnchorPlaybackEnded,
    /// The anchor clip is decoded and ready to play
    AnchorPlaybackLoaded,
}

/// Work the engine asks its runtime to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    StartCapture {
        session: SessionId,
        duration: Option<Duration>,
    },
    StopCapture {
        session: SessionId,
    },
    ScheduleCountdown {
        countdown: CountdownId,
        after: Duration,
    },
    CancelCountdown {
        countdown: CountdownId,
    },
    RenderClips(Vec<Clip>),
    RenderGrid(GridSnapshot),
    /// Rewind every looping clip and play them together
    RestartPlayback,
    SetMirrored(bool),
}

/// Observable engine state, for status displays and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub state: RecordingState,
    pub locked_duration_ms: Option<u64>,
    pub history: Vec<u64>,
    pub capturing: bool,
    pub countdown_armed: bool,
    pub mirrored: bool,
    pub generation: Option<u32>,
}

/// The loop-capture state machine
///
/// # Example
/// ```
/// use layerloop::command::Command;
/// use layerloop::config::LoopConfig;
/// use layerloop::engine::{Directive, EngineEvent, LoopEngine, RecordingState};
///
/// let mut engine = LoopEngine::new(LoopConfig::default()).unwrap();
/// let directives = engine.handle(EngineEvent::Command(Command::Toggle));
///
/// assert_eq!(engine.state(), RecordingState::Recording);
/// assert!(matches!(directives[0], Directive::StartCapture { duration: None, .. }));
/// ```
#[derive(Debug, Clone)]
pub struct LoopEngine {
    mode: EngineMode,
    state: RecordingState,

    /// Set once from the first completed clip, then never overwritten
    locked_duration: Option<Duration>,

    history: ClipHistory,

    /// Present in grid mode only
    grid: Option<GenerationGrid>,

    /// Deadline of the armed countdown
    next_start_at: Option<Instant>,
    pending_countdown: Option<CountdownId>,

    /// At most one capture is ever in flight
    active_session: Option<SessionId>,

    /// Session stopped by a blackout that has not reported back yet.
    /// Its result is discarded, but no new capture starts until it does.
    draining: Option<SessionId>,

    mirrored: bool,

    // Monotonic across blackouts so stale completions never match
    next_session: u64,
    next_countdown: u64,
}

impl LoopEngine {
    /// Create an engine for a validated configuration
    pub fn new(config: LoopConfig) -> Result<Self> {
        config.validate()?;
        let grid = match config.mode {
            EngineMode::Grid => Some(GenerationGrid::from_config(&config.grid)),
            _ => None,
        };
        Ok(Self::with_grid(config, grid))
    }

    /// Create a grid-mode engine around an explicit grid
    pub fn with_generation_grid(config: LoopConfig, grid: GenerationGrid) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_grid(
            LoopConfig {
                mode: EngineMode::Grid,
                ..config
            },
            Some(grid),
        ))
    }

    fn with_grid(config: LoopConfig, grid: Option<GenerationGrid>) -> Self {
        Self {
            mode: config.mode,
            state: RecordingState::Idle,
            locked_duration: None,
            history: ClipHistory::new(config.capacity()),
            grid,
            next_start_at: None,
            pending_countdown: None,
            active_session: None,
            draining: None,
            mirrored: false,
            next_session: 0,
            next_countdown: 0,
        }
    }

    /// Process exactly one event
    pub fn handle(&mut self, event: EngineEvent) -> Vec<Directive> {
        let mut out = Vec::new();
        let before = self.state;

        match event {
            EngineEvent::Command(command) => self.on_command(command, &mut out),
            EngineEvent::CountdownElapsed(countdown) => {
                self.on_countdown_elapsed(countdown, &mut out)
            }
            EngineEvent::CaptureFinished { session, result } => {
                self.on_capture_finished(session, result, &mut out)
            }
            EngineEvent::AnchorPlaybackEnded => self.on_anchor_ended(&mut out),
            EngineEvent::AnchorPlaybackLoaded => self.on_anchor_loaded(&mut out),
        }

        if before != self.state {
            info!(from = %before, to = %self.state, "recording state changed");
        }
        out
    }

    /// Shorthand for `handle(EngineEvent::Command(command))`
    pub fn command(&mut self, command: Command) -> Vec<Directive> {
        self.handle(EngineEvent::Command(command))
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn on_command(&mut self, command: Command, out: &mut Vec<Directive>) {
        match command {
            Command::Toggle => self.toggle(out),
            Command::Begin => self.begin(out),
            Command::Loop => self.commit_loop(out),
            Command::Blackout => self.blackout(out),
            Command::Flip => {
                self.mirrored = !self.mirrored;
                out.push(Directive::SetMirrored(self.mirrored));
            }
        }
    }

    /// Single-button control
    ///
    /// - Idle: capture now while no duration is locked, otherwise arm a
    ///   countdown of the locked length
    /// - Queued: disarm
    /// - Recording: stop, unless the capture is duration-governed
    /// - Looping: blackout
    fn toggle(&mut self, out: &mut Vec<Directive>) {
        match self.state {
            RecordingState::Idle => match (self.locked_duration, self.history.is_empty()) {
                (Some(locked), _) => self.arm_countdown(locked, out),
                (None, true) => {
                    if self.begin_capture(out) {
                        self.state = RecordingState::Recording;
                    }
                }
                // Clips exist but none reported a length: capture freely
                // again and let the next measured clip set the lock
                (None, false) => {
                    debug!(clips = self.history.len(), "no locked duration yet");
                    if self.begin_capture(out) {
                        self.state = RecordingState::Recording;
                    }
                }
            },
            RecordingState::Queued => {
                self.disarm_countdown(out);
                self.state = RecordingState::Idle;
            }
            RecordingState::Recording => {
                if self.locked_duration.is_some() {
                    debug!("duration-governed capture cannot be stopped by hand");
                    return;
                }
                self.stop_active(out);
                self.state = RecordingState::Idle;
            }
            RecordingState::Looping => self.blackout(out),
        }
    }

    fn begin(&mut self, out: &mut Vec<Directive>) {
        if self.state == RecordingState::Idle {
            self.toggle(out);
        } else {
            debug!(state = %self.state, "begin ignored");
        }
    }

    /// Commit the running capture as a loop layer and keep looping
    ///
    /// Duration-governed captures are left to run their full length.
    fn commit_loop(&mut self, out: &mut Vec<Directive>) {
        match self.state {
            RecordingState::Recording | RecordingState::Looping => {
                if self.locked_duration.is_none() {
                    self.stop_active(out);
                }
                self.state = RecordingState::Looping;
            }
            RecordingState::Idle | RecordingState::Queued => {
                debug!(state = %self.state, "loop ignored");
            }
        }
    }

    /// Return to the freshly constructed state from anywhere
    fn blackout(&mut self, out: &mut Vec<Directive>) {
        self.disarm_countdown(out);
        if let Some(session) = self.active_session.take() {
            out.push(Directive::StopCapture { session });
            self.draining = Some(session);
        }

        self.history.clear();
        self.locked_duration = None;
        self.state = RecordingState::Idle;
        if self.mirrored {
            self.mirrored = false;
            out.push(Directive::SetMirrored(false));
        }

        out.push(Directive::RenderClips(Vec::new()));
        if let Some(grid) = self.grid.as_mut() {
            grid.reseed();
            out.push(Directive::RenderGrid(grid.snapshot()));
        }
        info!("blackout");
    }

    // ========================================================================
    // Timer and capture completions
    // ========================================================================

    fn on_countdown_elapsed(&mut self, countdown: CountdownId, out: &mut Vec<Directive>) {
        if self.state != RecordingState::Queued || self.pending_countdown != Some(countdown) {
            debug!(%countdown, "stale countdown ignored");
            return;
        }
        self.pending_countdown = None;
        self.next_start_at = None;
        self.state = if self.begin_capture(out) {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        };
    }

    fn on_capture_finished(
        &mut self,
        session: SessionId,
        result: Result<Clip>,
        out: &mut Vec<Directive>,
    ) {
        if self.draining == Some(session) {
            self.draining = None;
            debug!(%session, "completion from before blackout discarded");
            return;
        }
        if self.active_session != Some(session) {
            debug!(%session, "completion from an unknown session discarded");
            return;
        }
        self.active_session = None;

        match result {
            Ok(clip) => self.accept_clip(clip, out),
            Err(LoopError::EmptyCapture) => {
                debug!(%session, "empty capture discarded");
                // Recording always has a session behind it, and Looping
                // needs at least one clip to loop
                let stranded = match self.state {
                    RecordingState::Recording => true,
                    RecordingState::Looping => self.history.is_empty(),
                    RecordingState::Idle | RecordingState::Queued => false,
                };
                if stranded {
                    self.state = RecordingState::Idle;
                }
            }
            Err(err) => {
                warn!(%session, error = %err, "capture failed, returning to idle");
                self.disarm_countdown(out);
                self.state = RecordingState::Idle;
            }
        }
    }

    fn accept_clip(&mut self, clip: Clip, out: &mut Vec<Directive>) {
        let clip = match self.locked_duration {
            Some(locked) if clip.duration() != Some(locked) => clip.with_duration(locked),
            Some(_) => clip,
            None => {
                self.locked_duration = clip.duration();
                if let Some(locked) = self.locked_duration {
                    info!(duration_ms = locked.as_millis() as u64, "clip duration locked");
                }
                clip
            }
        };

        debug!(id = %clip.id(), bytes = clip.len(), "clip captured");
        if let Some(evicted) = self.history.push(clip.clone()) {
            debug!(id = %evicted.id(), "oldest clip evicted");
        }

        if let Some(grid) = self.grid.as_mut() {
            grid.advance(clip);
            out.push(Directive::RenderGrid(grid.snapshot()));
        }
        out.push(Directive::RenderClips(self.history.to_vec()));

        if self.state == RecordingState::Recording {
            self.state = if self.mode.keeps_looping() {
                RecordingState::Looping
            } else {
                RecordingState::Idle
            };
        }
    }

    // ========================================================================
    // Playback events
    // ========================================================================

    /// The anchor finished a pass: chain the next capture and resync
    fn on_anchor_ended(&mut self, out: &mut Vec<Directive>) {
        if !self.state.follows_playback() {
            debug!(state = %self.state, "anchor ended ignored");
            return;
        }
        match self.state {
            RecordingState::Queued => {
                self.disarm_countdown(out);
                self.state = if self.begin_capture(out) {
                    RecordingState::Recording
                } else {
                    RecordingState::Idle
                };
            }
            RecordingState::Looping => {
                if self.active_session.is_none() {
                    self.begin_capture(out);
                }
            }
            RecordingState::Recording | RecordingState::Idle => {}
        }
        out.push(Directive::RestartPlayback);
    }

    fn on_anchor_loaded(&mut self, out: &mut Vec<Directive>) {
        if self.state == RecordingState::Looping && self.active_session.is_none() {
            self.begin_capture(out);
        }
        out.push(Directive::RestartPlayback);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Start a capture unless one is already in flight
    fn begin_capture(&mut self, out: &mut Vec<Directive>) -> bool {
        if let Some(active) = self.active_session.or(self.draining) {
            debug!(%active, "capture already in flight");
            return false;
        }

        let session = SessionId(self.next_session);
        self.next_session += 1;
        self.active_session = Some(session);
        out.push(Directive::StartCapture {
            session,
            duration: self.locked_duration,
        });
        info!(%session, duration_ms = ?self.locked_duration.map(|d| d.as_millis() as u64), "capture started");
        true
    }

    fn stop_active(&mut self, out: &mut Vec<Directive>) {
        if let Some(session) = self.active_session {
            out.push(Directive::StopCapture { session });
        }
    }

    fn arm_countdown(&mut self, after: Duration, out: &mut Vec<Directive>) {
        let countdown = CountdownId(self.next_countdown);
        self.next_countdown += 1;
        self.pending_countdown = Some(countdown);
        self.next_start_at = Some(Instant::now() + after);
        self.state = RecordingState::Queued;
        out.push(Directive::ScheduleCountdown { countdown, after });
    }

    fn disarm_countdown(&mut self, out: &mut Vec<Directive>) {
        self.next_start_at = None;
        if let Some(countdown) = self.pending_countdown.take() {
            out.push(Directive::CancelCountdown { countdown });
        }
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn locked_duration(&self) -> Option<Duration> {
        self.locked_duration
    }

    pub fn history(&self) -> &ClipHistory {
        &self.history
    }

    pub fn history_ids(&self) -> Vec<ClipId> {
        self.history.ids()
    }

    pub fn grid(&self) -> Option<&GenerationGrid> {
        self.grid.as_ref()
    }

    pub fn next_start_at(&self) -> Option<Instant> {
        self.next_start_at
    }

    /// Time left on the armed countdown
    pub fn countdown_remaining(&self) -> Option<Duration> {
        self.next_start_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active_session
    }

    pub fn is_capturing(&self) -> bool {
        self.active_session.is_some()
    }

    /// Whether a capture stopped by blackout is still finishing
    pub fn is_draining(&self) -> bool {
        self.draining.is_some()
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.state,
            locked_duration_ms: self.locked_duration.map(|d| d.as_millis() as u64),
            history: self.history.iter().map(|c| c.id().0).collect(),
            capturing: self.is_capturing(),
            countdown_armed: self.pending_countdown.is_some(),
            mirrored: self.mirrored,
            generation: self.grid.as_ref().map(GenerationGrid::generation),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn engine() -> LoopEngine {
        LoopEngine::new(LoopConfig::default()).unwrap()
    }

    fn clip(session: SessionId, ms: u64) -> Clip {
        Clip::new(
            ClipId(session.0),
            vec![1, 2, 3],
            Some(Duration::from_millis(ms)),
        )
        .unwrap()
    }

    fn started(directives: &[Directive]) -> Option<SessionId> {
        directives.iter().find_map(|d| match d {
            Directive::StartCapture { session, .. } => Some(*session),
            _ => None,
        })
    }

    fn finish(engine: &mut LoopEngine, session: SessionId, ms: u64) -> Vec<Directive> {
        engine.handle(EngineEvent::CaptureFinished {
            session,
            result: Ok(clip(session, ms)),
        })
    }

    // ------------------------------------------------------------------------
    // Toggle transitions
    // ------------------------------------------------------------------------

    #[test]
    fn test_first_toggle_records_immediately() {
        let mut engine = engine();
        let out = engine.command(Command::Toggle);
        assert_eq!(engine.state(), RecordingState::Recording);
        assert_eq!(
            out,
            vec![Directive::StartCapture {
                session: SessionId(0),
                duration: None
            }]
        );
    }

    #[test]
    fn test_manual_stop_before_lock() {
        let mut engine = engine();
        engine.command(Command::Toggle);
        let out = engine.command(Command::Toggle);
        assert_eq!(engine.state(), RecordingState::Idle);
        assert_eq!(
            out,
            vec![Directive::StopCapture {
                session: SessionId(0)
            }]
        );
        // Still waiting for the stopped session to finalize
        assert!(engine.is_capturing());
    }

    #[test]
    fn test_completion_locks_duration() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        let out = finish(&mut engine, session, 2000);

        assert_eq!(engine.state(), RecordingState::Idle);
        assert_eq!(engine.locked_duration(), Some(Duration::from_millis(2000)));
        assert_eq!(engine.history_ids(), vec![ClipId(0)]);
        assert!(matches!(&out[..], [Directive::RenderClips(clips)] if clips.len() == 1));
    }

    #[test]
    fn test_toggle_with_lock_queues() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        finish(&mut engine, session, 2000);

        let out = engine.command(Command::Toggle);
        assert_eq!(engine.state(), RecordingState::Queued);
        assert_eq!(
            out,
            vec![Directive::ScheduleCountdown {
                countdown: CountdownId(0),
                after: Duration::from_millis(2000)
            }]
        );
        assert!(engine.next_start_at().is_some());
        assert!(engine.countdown_remaining().unwrap() <= Duration::from_millis(2000));
    }

    #[test]
    fn test_queued_toggle_cancels() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        finish(&mut engine, session, 5000);
        engine.command(Command::Toggle);

        let out = engine.command(Command::Toggle);
        assert_eq!(engine.state(), RecordingState::Idle);
        assert_eq!(
            out,
            vec![Directive::CancelCountdown {
                countdown: CountdownId(0)
            }]
        );
        assert!(engine.next_start_at().is_none());

        // The cancelled countdown firing late does nothing
        let out = engine.handle(EngineEvent::CountdownElapsed(CountdownId(0)));
        assert!(out.is_empty());
        assert_eq!(engine.state(), RecordingState::Idle);
    }

    #[test]
    fn test_countdown_starts_locked_capture() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        finish(&mut engine, session, 2000);
        engine.command(Command::Toggle);

        let out = engine.handle(EngineEvent::CountdownElapsed(CountdownId(0)));
        assert_eq!(engine.state(), RecordingState::Recording);
        assert_eq!(
            out,
            vec![Directive::StartCapture {
                session: SessionId(1),
                duration: Some(Duration::from_millis(2000))
            }]
        );
    }

    #[test]
    fn test_locked_recording_ignores_toggle() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        finish(&mut engine, session, 2000);
        engine.command(Command::Toggle);
        engine.handle(EngineEvent::CountdownElapsed(CountdownId(0)));

        let out = engine.command(Command::Toggle);
        assert!(out.is_empty());
        assert_eq!(engine.state(), RecordingState::Recording);
    }

    #[test]
    fn test_later_clips_take_locked_duration() {
        let mut engine = engine();
        let first = started(&engine.command(Command::Toggle)).unwrap();
        finish(&mut engine, first, 2000);
        engine.command(Command::Toggle);
        let second = started(&engine.handle(EngineEvent::CountdownElapsed(CountdownId(0)))).unwrap();
        finish(&mut engine, second, 2137);

        assert_eq!(engine.locked_duration(), Some(Duration::from_millis(2000)));
        for clip in engine.history().iter() {
            assert_eq!(clip.duration(), Some(Duration::from_millis(2000)));
        }
    }

    // ------------------------------------------------------------------------
    // Failures and stale completions
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_capture_discarded() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        let out = engine.handle(EngineEvent::CaptureFinished {
            session,
            result: Err(LoopError::EmptyCapture),
        });

        assert!(out.is_empty());
        assert!(engine.history().is_empty());
        assert_eq!(engine.locked_duration(), None);
        assert!(!engine.is_capturing());
    }

    #[test]
    fn test_backend_error_returns_to_idle() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        engine.handle(EngineEvent::CaptureFinished {
            session,
            result: Err(LoopError::CaptureBackend {
                reason: "unplugged".to_string(),
            }),
        });

        assert_eq!(engine.state(), RecordingState::Idle);
        assert!(!engine.is_capturing());

        // The user can retry straight away
        engine.command(Command::Toggle);
        assert_eq!(engine.state(), RecordingState::Recording);
    }

    #[test]
    fn test_completion_after_blackout_discarded() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        let out = engine.command(Command::Blackout);
        assert!(out.contains(&Directive::StopCapture { session }));

        let out = finish(&mut engine, session, 2000);
        assert!(out.is_empty());
        assert!(engine.history().is_empty());
        assert_eq!(engine.locked_duration(), None);
    }

    #[test]
    fn test_no_capture_while_blackout_drains() {
        let mut engine = engine();
        let first = started(&engine.command(Command::Toggle)).unwrap();
        engine.command(Command::Blackout);
        assert!(engine.is_draining());

        // The stopped session may still be writing
        let out = engine.command(Command::Toggle);
        assert!(started(&out).is_none());
        assert_eq!(engine.state(), RecordingState::Idle);

        finish(&mut engine, first, 300);
        assert!(!engine.is_draining());
        assert!(engine.history().is_empty());

        let second = started(&engine.command(Command::Toggle)).unwrap();
        assert_eq!(second, SessionId(1));
        assert_eq!(engine.state(), RecordingState::Recording);
    }

    #[test]
    fn test_empty_capture_with_no_clips_leaves_looping() {
        let mut engine = LoopEngine::new(LoopConfig::for_mode(EngineMode::Layered)).unwrap();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        engine.command(Command::Loop);
        assert_eq!(engine.state(), RecordingState::Looping);

        engine.handle(EngineEvent::CaptureFinished {
            session,
            result: Err(LoopError::EmptyCapture),
        });
        assert_eq!(engine.state(), RecordingState::Idle);

        // Playback events no longer start open-ended captures
        assert_eq!(
            engine.handle(EngineEvent::AnchorPlaybackLoaded),
            vec![Directive::RestartPlayback]
        );
        assert!(!engine.is_capturing());
    }

    #[test]
    fn test_empty_capture_keeps_looping_with_clips() {
        let mut engine = LoopEngine::new(LoopConfig::for_mode(EngineMode::Layered)).unwrap();
        let first = started(&engine.command(Command::Begin)).unwrap();
        finish(&mut engine, first, 1000);
        let second = started(&engine.handle(EngineEvent::AnchorPlaybackEnded)).unwrap();

        engine.handle(EngineEvent::CaptureFinished {
            session: second,
            result: Err(LoopError::EmptyCapture),
        });
        assert_eq!(engine.state(), RecordingState::Looping);
        assert_eq!(engine.history_ids(), vec![ClipId(0)]);
    }

    #[test]
    fn test_unmeasured_first_clip_leaves_duration_unlocked() {
        let mut engine = engine();
        let first = started(&engine.command(Command::Toggle)).unwrap();
        engine.handle(EngineEvent::CaptureFinished {
            session: first,
            result: Clip::new(ClipId(first.0), vec![1], None),
        });
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.locked_duration(), None);

        // Nothing to count down from, so capture starts straight away
        let out = engine.command(Command::Toggle);
        assert_eq!(
            out,
            vec![Directive::StartCapture {
                session: SessionId(1),
                duration: None
            }]
        );
        finish(&mut engine, SessionId(1), 1500);
        assert_eq!(engine.locked_duration(), Some(Duration::from_millis(1500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_deadline_follows_tokio_clock() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        finish(&mut engine, session, 2000);
        engine.command(Command::Toggle);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            engine.countdown_remaining(),
            Some(Duration::from_millis(1500))
        );

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(engine.countdown_remaining(), Some(Duration::ZERO));
    }

    // ------------------------------------------------------------------------
    // Loop command and playback chaining
    // ------------------------------------------------------------------------

    #[test]
    fn test_loop_command_enters_looping() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        let out = engine.command(Command::Loop);
        assert_eq!(engine.state(), RecordingState::Looping);
        assert_eq!(out, vec![Directive::StopCapture { session }]);

        finish(&mut engine, session, 1500);
        assert_eq!(engine.state(), RecordingState::Looping);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_anchor_ended_chains_queued_capture() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        finish(&mut engine, session, 2000);
        engine.command(Command::Toggle);

        let out = engine.handle(EngineEvent::AnchorPlaybackEnded);
        assert_eq!(engine.state(), RecordingState::Recording);
        assert_eq!(
            out,
            vec![
                Directive::CancelCountdown {
                    countdown: CountdownId(0)
                },
                Directive::StartCapture {
                    session: SessionId(1),
                    duration: Some(Duration::from_millis(2000))
                },
                Directive::RestartPlayback,
            ]
        );

        // The countdown arriving afterwards must not start a second capture
        let out = engine.handle(EngineEvent::CountdownElapsed(CountdownId(0)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_duplicate_anchor_events_start_one_capture() {
        let mut engine = LoopEngine::new(LoopConfig::for_mode(EngineMode::Layered)).unwrap();
        let session = started(&engine.command(Command::Begin)).unwrap();
        engine.command(Command::Loop);
        finish(&mut engine, session, 1000);

        let first = engine.handle(EngineEvent::AnchorPlaybackEnded);
        let second = engine.handle(EngineEvent::AnchorPlaybackEnded);
        assert!(started(&first).is_some());
        assert!(started(&second).is_none());
        assert_eq!(second, vec![Directive::RestartPlayback]);
        assert_eq!(engine.state(), RecordingState::Looping);
    }

    #[test]
    fn test_anchor_ended_while_idle_is_ignored() {
        let mut engine = engine();
        assert!(engine.handle(EngineEvent::AnchorPlaybackEnded).is_empty());
    }

    #[test]
    fn test_anchor_loaded_restarts_playback() {
        let mut engine = engine();
        let out = engine.handle(EngineEvent::AnchorPlaybackLoaded);
        assert_eq!(out, vec![Directive::RestartPlayback]);
        assert_eq!(engine.state(), RecordingState::Idle);
    }

    // ------------------------------------------------------------------------
    // Blackout, flip, grid mode
    // ------------------------------------------------------------------------

    #[test]
    fn test_blackout_restores_initial_state() {
        let fresh = engine().snapshot();
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        finish(&mut engine, session, 2000);
        engine.command(Command::Flip);
        engine.command(Command::Toggle);

        engine.command(Command::Blackout);
        assert_eq!(engine.snapshot(), fresh);
    }

    #[test]
    fn test_looping_toggle_is_blackout() {
        let mut engine = engine();
        let session = started(&engine.command(Command::Toggle)).unwrap();
        engine.command(Command::Loop);
        finish(&mut engine, session, 1000);

        let out = engine.command(Command::Toggle);
        assert_eq!(engine.state(), RecordingState::Idle);
        assert!(out.contains(&Directive::RenderClips(Vec::new())));
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_flip_toggles_mirroring() {
        let mut engine = engine();
        assert_eq!(engine.command(Command::Flip), vec![Directive::SetMirrored(true)]);
        assert_eq!(engine.command(Command::Flip), vec![Directive::SetMirrored(false)]);
    }

    #[test]
    fn test_begin_only_from_idle() {
        let mut engine = engine();
        engine.command(Command::Begin);
        assert_eq!(engine.state(), RecordingState::Recording);
        assert!(engine.command(Command::Begin).is_empty());
    }

    #[test]
    fn test_grid_mode_advances_per_clip() {
        let grid = GenerationGrid::from_pattern(&[
            ".....",
            "..#..",
            "..#..",
            "..#..",
            ".....",
        ])
        .unwrap();
        let mut engine = LoopEngine::with_generation_grid(LoopConfig::default(), grid).unwrap();
        let session = started(&engine.command(Command::Begin)).unwrap();
        let out = finish(&mut engine, session, 1000);

        assert_eq!(engine.state(), RecordingState::Looping);
        assert_eq!(engine.snapshot().generation, Some(1));
        let snapshot = out
            .iter()
            .find_map(|d| match d {
                Directive::RenderGrid(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(snapshot.cell(2, 1), Some(1));
        assert_eq!(snapshot.clip_for(1).map(|c| c.id()), Some(ClipId(0)));
    }
}
