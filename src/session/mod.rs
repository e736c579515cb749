//! Capture session tracking

pub mod models;
pub mod tracker;

pub use models::{CaptureSession, MediaKind, SessionId, SessionState, SessionTitle};
pub use tracker::{FileArrival, SessionTracker, StopOutcome};
