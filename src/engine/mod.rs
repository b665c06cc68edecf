//! Loop Engine Module
//!
//! Core capture orchestration including:
//! - Recording state machine
//! - Bounded clip history
//! - Async runtime driving the engine from one event queue

pub mod history;
pub mod loop_engine;
pub mod runtime;
pub mod state;

pub use history::ClipHistory;
pub use loop_engine::{CountdownId, Directive, EngineEvent, EngineSnapshot, LoopEngine};
pub use runtime::{EngineHandle, EngineRuntime};
pub use state::RecordingState;
