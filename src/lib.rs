//! Recorder library
//!
//! Files finished recordings, replay-buffer saves and screenshots into
//! folders named after the game or application that was being captured.

pub mod app;
pub mod backend;
pub mod filer;
pub mod queue;
pub mod session;
pub mod title;
pub mod utils;

// Re-export main types for easier use
pub use backend::{spawn_dispatcher, BackendCommand, BackendEvent, Dispatcher};
pub use session::{MediaKind, SessionId};
pub use title::{CaptureHost, SourceId, StaticHost};
pub use utils::{AppSettings, OrganizationPolicy, OrganizeMode, RecorderError, SourceBindings};
