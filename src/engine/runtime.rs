//! Engine runtime
//!
//! Drives a [`LoopEngine`] from a single event queue. Commands, timer
//! fires, capture completions and playback callbacks all arrive on the same
//! channel and are handled one at a time in arrival order, so a playback
//! callback that wants to restart capture never re-enters the engine.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::loop_engine::{CountdownId, Directive, EngineEvent, EngineSnapshot, LoopEngine};
use crate::capture::{CaptureBackend, CaptureSession, DeviceStream, SessionId, StopHandle};
use crate::command::{Command, CommandResolver};
use crate::config::LoopConfig;
use crate::error::{LoopError, Result};
use crate::grid::GenerationGrid;
use crate::playback::PlaybackCoordinator;

enum RuntimeMessage {
    Event(EngineEvent),
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown,
}

impl std::fmt::Debug for RuntimeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeMessage::Event(event) => write!(f, "Event({:?})", event),
            RuntimeMessage::Snapshot(_) => write!(f, "Snapshot"),
            RuntimeMessage::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Cloneable sender side of a running engine
///
/// Dropping every handle shuts the runtime down.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<RuntimeMessage>,
    resolver: CommandResolver,
}

impl EngineHandle {
    fn send(&self, message: RuntimeMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| LoopError::EngineClosed)
    }

    pub fn command(&self, command: Command) -> Result<()> {
        self.send(RuntimeMessage::Event(EngineEvent::Command(command)))
    }

    /// Resolve a spoken phrase and forward the command
    ///
    /// Unrecognised phrases are dropped and return `Ok(None)`.
    pub fn utter(&self, utterance: &str) -> Result<Option<Command>> {
        match self.resolver.resolve(utterance) {
            Some(command) => {
                self.command(command)?;
                Ok(Some(command))
            }
            None => Ok(None),
        }
    }

    /// Forward a keyboard shortcut
    pub fn key(&self, key: &str) -> Result<Option<Command>> {
        match self.resolver.resolve_key(key) {
            Some(command) => {
                self.command(command)?;
                Ok(Some(command))
            }
            None => Ok(None),
        }
    }

    /// Playback layer callback: the anchor clip reached its end
    pub fn on_anchor_playback_ended(&self) -> Result<()> {
        self.send(RuntimeMessage::Event(EngineEvent::AnchorPlaybackEnded))
    }

    /// Playback layer callback: the anchor clip is ready to play
    pub fn on_anchor_playback_loaded(&self) -> Result<()> {
        self.send(RuntimeMessage::Event(EngineEvent::AnchorPlaybackLoaded))
    }

    /// Current engine state, after every event queued before this call
    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(RuntimeMessage::Snapshot(tx))?;
        rx.await.map_err(|_| LoopError::EngineClosed)
    }

    /// Stop the runtime after the events already queued
    pub fn shutdown(&self) -> Result<()> {
        self.send(RuntimeMessage::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owns the engine, the capture backend, and every timer and capture task
pub struct EngineRuntime<B: CaptureBackend> {
    engine: LoopEngine,
    backend: B,
    stream: DeviceStream,
    config: LoopConfig,
    rx: mpsc::UnboundedReceiver<RuntimeMessage>,
    /// Weak so that spawned tasks never keep the queue open on their own
    internal: mpsc::WeakUnboundedSender<RuntimeMessage>,
    countdowns: HashMap<CountdownId, CancellationToken>,
    captures: HashMap<SessionId, StopHandle>,
}

impl<B: CaptureBackend + 'static> EngineRuntime<B> {
    /// Acquire the capture device and build the engine
    ///
    /// A device that cannot be acquired is reported here, once.
    pub fn new(config: LoopConfig, backend: B) -> Result<(Self, EngineHandle)> {
        let engine = LoopEngine::new(config.clone())?;
        Self::with_engine(config, engine, backend)
    }

    /// Like [`new`](Self::new) but in grid mode around an explicit grid
    pub fn with_grid(
        config: LoopConfig,
        grid: GenerationGrid,
        backend: B,
    ) -> Result<(Self, EngineHandle)> {
        let engine = LoopEngine::with_generation_grid(config.clone(), grid)?;
        Self::with_engine(config, engine, backend)
    }

    fn with_engine(
        config: LoopConfig,
        engine: LoopEngine,
        mut backend: B,
    ) -> Result<(Self, EngineHandle)> {
        let stream = backend.acquire()?;
        info!(%stream, mode = %engine.mode(), "capture device acquired");

        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Self {
            engine,
            backend,
            stream,
            config,
            rx,
            internal: tx.downgrade(),
            countdowns: HashMap::new(),
            captures: HashMap::new(),
        };
        let handle = EngineHandle {
            tx,
            resolver: CommandResolver::new(),
        };
        Ok((runtime, handle))
    }

    /// Process events until shutdown, then return the final engine state
    pub async fn run<P: PlaybackCoordinator>(mut self, mut playback: P) -> EngineSnapshot {
        while let Some(message) = self.rx.recv().await {
            let event = match message {
                RuntimeMessage::Event(event) => event,
                RuntimeMessage::Snapshot(reply) => {
                    let _ = reply.send(self.engine.snapshot());
                    continue;
                }
                RuntimeMessage::Shutdown => break,
            };

            match &event {
                EngineEvent::CaptureFinished { session, .. } => {
                    self.captures.remove(session);
                }
                EngineEvent::CountdownElapsed(countdown) => {
                    self.countdowns.remove(countdown);
                }
                _ => {}
            }

            for directive in self.engine.handle(event) {
                self.execute(directive, &mut playback);
            }
        }

        self.teardown();
        self.engine.snapshot()
    }

    fn execute<P: PlaybackCoordinator>(&mut self, directive: Directive, playback: &mut P) {
        match directive {
            Directive::StartCapture { session, duration } => self.start_capture(session, duration),
            Directive::StopCapture { session } => {
                if let Some(handle) = self.captures.get(&session) {
                    handle.stop();
                }
            }
            Directive::ScheduleCountdown { countdown, after } => {
                let token = CancellationToken::new();
                self.countdowns.insert(countdown, token.clone());
                let tx = self.internal.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(after) => {
                            post(&tx, EngineEvent::CountdownElapsed(countdown));
                        }
                    }
                });
            }
            Directive::CancelCountdown { countdown } => {
                if let Some(token) = self.countdowns.remove(&countdown) {
                    token.cancel();
                }
            }
            Directive::RenderClips(clips) => playback.render_clips(&clips),
            Directive::RenderGrid(snapshot) => playback.render_grid(&snapshot),
            Directive::RestartPlayback => playback.restart_playback(),
            Directive::SetMirrored(mirrored) => playback.set_mirrored(mirrored),
        }
    }

    fn start_capture(&mut self, session: SessionId, duration: Option<std::time::Duration>) {
        let tx = self.internal.clone();
        match CaptureSession::start(
            &mut self.backend,
            &self.stream,
            session,
            duration,
            self.config.watchdog(),
        ) {
            Ok(capture) => {
                self.captures.insert(session, capture.stop_handle());
                tokio::spawn(async move {
                    let result = capture.finish().await;
                    post(&tx, EngineEvent::CaptureFinished { session, result });
                });
            }
            Err(err) => {
                warn!(%session, error = %err, "capture could not start");
                post(
                    &tx,
                    EngineEvent::CaptureFinished {
                        session,
                        result: Err(err),
                    },
                );
            }
        }
    }

    /// Cancel armed timers and stop any capture still running
    fn teardown(&mut self) {
        for (_, token) in self.countdowns.drain() {
            token.cancel();
        }
        for (session, handle) in self.captures.drain() {
            debug!(%session, "stopping capture on shutdown");
            handle.stop();
        }
        info!("engine runtime stopped");
    }
}

fn post(tx: &mpsc::WeakUnboundedSender<RuntimeMessage>, event: EngineEvent) {
    match tx.upgrade() {
        Some(tx) => {
            let _ = tx.send(RuntimeMessage::Event(event));
        }
        None => debug!(?event, "runtime gone, event dropped"),
    }
}
