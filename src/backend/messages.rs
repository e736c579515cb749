use crate::session::{MediaKind, SessionId};
use crate::title::SourceId;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use tokio::sync::oneshot;

/// Commands sent from the host adapter to the dispatcher
#[derive(Debug)]
pub enum BackendCommand {
    // Capture lifecycle
    CaptureStarted {
        session_id: SessionId,
        source: SourceId,
        media_kind: MediaKind,
        at: DateTime<Local>,
    },
    FileSplit {
        session_id: SessionId,
        path: PathBuf,
        at: DateTime<Local>,
    },
    FileSaved {
        session_id: SessionId,
        path: PathBuf,
        media_kind: MediaKind,
        at: DateTime<Local>,
    },
    CaptureStopped {
        session_id: SessionId,
        at: DateTime<Local>,
    },

    // Host state
    WindowHooked {
        source: SourceId,
    },
    SceneCollectionChanged,

    // System
    /// Acknowledged once every earlier command has been applied
    Barrier {
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Events sent from the dispatcher back to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    SessionStarted {
        session_id: SessionId,
        title: Option<String>,
    },
    FileFiled {
        session_id: SessionId,
        from: PathBuf,
        to: PathBuf,
    },
    FileLeftInPlace {
        session_id: SessionId,
        path: PathBuf,
        reason: String,
    },
    /// User-visible warning; the file is still at `path`
    FilingFailed {
        session_id: SessionId,
        path: PathBuf,
        error: String,
    },
    SessionClosed {
        session_id: SessionId,
        forced: bool,
    },
}
