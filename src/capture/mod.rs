//! Capture Module
//!
//! Everything between the engine and a capture device:
//! - The backend contract a device driver implements
//! - Capture sessions with an idempotent stop and a liveness watchdog
//! - A simulated backend for rehearsals and tests

pub mod backend;
pub mod session;
pub mod simulated;

pub use backend::{BackendSession, BackendSignal, CaptureBackend, DeviceStream};
pub use session::{CaptureSession, SessionId, StopHandle};
pub use simulated::{SimulatedBackend, SimulatedStats};
