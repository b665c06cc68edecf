//! Layerloop - Live Video Loop Capture
//!
//! Layerloop records short clips from a camera and loops them back as
//! layers on top of the live picture. A performer drives it with a single
//! toggle or a handful of spoken commands.
//!
//! # Architecture
//!
//! - [`engine::LoopEngine`]: pure state machine (idle, queued, recording, looping)
//! - [`engine::EngineRuntime`]: runs the engine on tokio, owning timers and captures
//! - [`capture`]: capture backends and sessions with a liveness watchdog
//! - [`playback`]: the rendering side, which reports anchor-clip events back
//! - [`grid`]: generation grid where every capture advances a Life automaton
//!
//! The first finished clip locks the loop duration. Every later capture
//! runs for exactly that long, so all layers stay in phase with the oldest
//! clip (the anchor).

pub mod capture;
pub mod cli;
pub mod clip;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod playback;

pub use error::{LoopError, Result};
