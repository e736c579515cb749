//! Data structures for capture sessions

use crate::title::{SourceId, TitleResolution};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::time::Instant;

/// Host-assigned (or synthesized) session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for events the host did not tag with one
    pub fn synthesize() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of media a session produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Recording,
    ReplayBuffer,
    Screenshot,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Recording => "recording",
            MediaKind::ReplayBuffer => "replay buffer",
            MediaKind::Screenshot => "screenshot",
        }
    }
}

/// Lifecycle of a tracked session. `Idle` is the absence of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Stopped; queued files are still being filed
    Closing,
    Closed,
}

/// Title of a session
///
/// `Pending` may still be re-resolved; once `Frozen` it never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTitle {
    Pending { attempts_left: u32 },
    Frozen(TitleResolution),
}

/// One continuous recording/replay-buffer/screenshot lifetime
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: SessionId,
    pub source: SourceId,
    pub media_kind: MediaKind,
    pub title: SessionTitle,
    pub started_at: DateTime<Local>,
    /// Files in arrival order
    pub split_sequence: Vec<PathBuf>,
    pub state: SessionState,
    /// When the dispatcher last saw an event for this session. Host
    /// timestamps only date the session; idleness is measured locally.
    pub last_activity: Instant,
    /// Created from a file event for an unknown id
    pub ad_hoc: bool,
}

impl CaptureSession {
    pub fn new(
        id: SessionId,
        source: SourceId,
        media_kind: MediaKind,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            id,
            source,
            media_kind,
            title: SessionTitle::Pending { attempts_left: 0 },
            started_at,
            split_sequence: Vec::new(),
            state: SessionState::Active,
            last_activity: Instant::now(),
            ad_hoc: false,
        }
    }

    /// Session whose title is already fixed
    pub fn with_title(mut self, title: TitleResolution) -> Self {
        self.title = SessionTitle::Frozen(title);
        self
    }

    /// The frozen, resolved window title, if there is one
    pub fn resolved_title(&self) -> Option<&str> {
        match &self.title {
            SessionTitle::Frozen(resolution) => resolution.name(),
            SessionTitle::Pending { .. } => None,
        }
    }

    pub fn is_title_frozen(&self) -> bool {
        matches!(self.title, SessionTitle::Frozen(_))
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_conversions() {
        assert_eq!(SessionId::from(99u64).as_str(), "99");
        assert_eq!(SessionId::from("abc").to_string(), "abc");
        assert_ne!(SessionId::synthesize(), SessionId::synthesize());
    }

    #[test]
    fn test_resolved_title_only_when_frozen() {
        let session = CaptureSession::new(
            SessionId::from(1u64),
            SourceId::Any,
            MediaKind::Recording,
            Local::now(),
        );
        assert_eq!(session.resolved_title(), None);
        assert!(!session.is_title_frozen());

        let session = session.with_title(TitleResolution::Resolved("Game A".into()));
        assert_eq!(session.resolved_title(), Some("Game A"));
        assert!(session.is_title_frozen());

        let unresolved = CaptureSession::new(
            SessionId::from(2u64),
            SourceId::Any,
            MediaKind::Recording,
            Local::now(),
        )
        .with_title(TitleResolution::Unresolved);
        assert_eq!(unresolved.resolved_title(), None);
        assert!(unresolved.is_title_frozen());
    }

    #[test]
    fn test_media_kind_serde() {
        let json = serde_json::to_string(&MediaKind::ReplayBuffer).unwrap();
        assert_eq!(json, "\"replay_buffer\"");
    }
}
