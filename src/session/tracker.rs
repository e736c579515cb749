//! Per-session state machine correlating files with the captured title
//!
//! The tracker is owned by a single task (the dispatcher actor), so its
//! table needs no locking. A session's title is frozen no later than the
//! arrival of its first file and never changes afterwards.

use crate::session::models::{CaptureSession, MediaKind, SessionId, SessionState, SessionTitle};
use crate::title::{SourceId, TitleResolution, TitleResolver};
use crate::utils::organizer::{compute_destination, OrganizationPolicy, Placement, SkipReason};
use chrono::{DateTime, Local};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Live session table
pub struct SessionTracker {
    sessions: HashMap<SessionId, CaptureSession>,
    resolver: Arc<TitleResolver>,
    resolve_attempts: u32,
}

/// What happened to a file event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArrival {
    pub session_id: SessionId,
    pub placement: Placement,
    /// The event referenced an unknown session and one was created for it
    pub ad_hoc: bool,
    /// The session ended with this file (one-shot screenshot sessions)
    pub closed: bool,
}

/// Result of a stop event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Closing,
    AlreadyClosing,
    Unknown,
}

impl SessionTracker {
    pub fn new(resolver: Arc<TitleResolver>, resolve_attempts: u32) -> Self {
        Self {
            sessions: HashMap::new(),
            resolver,
            resolve_attempts,
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<&CaptureSession> {
        self.sessions.get(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    /// Idle -> Active
    pub async fn on_started(
        &mut self,
        id: SessionId,
        source: SourceId,
        media_kind: MediaKind,
        at: DateTime<Local>,
    ) -> &CaptureSession {
        if self.sessions.get(&id).is_some_and(CaptureSession::is_active) {
            warn!("Session {} started twice, keeping the original", id);
        } else {
            let mut session = CaptureSession::new(id.clone(), source, media_kind, at);
            let resolution = self.resolver.resolve(&session.source).await;
            session.title = self.initial_title(resolution);
            info!(
                "Session {} started ({}, title {:?})",
                id,
                media_kind.as_str(),
                session.title
            );
            self.sessions.insert(id.clone(), session);
        }

        &self.sessions[&id]
    }

    /// A finished file (split or save) for `id`
    ///
    /// Unknown ids get an ad-hoc session; closing sessions reject the file.
    pub async fn on_file(
        &mut self,
        id: SessionId,
        path: &Path,
        media_kind: MediaKind,
        at: DateTime<Local>,
        policy: &OrganizationPolicy,
    ) -> FileArrival {
        let resolver = Arc::clone(&self.resolver);
        let (session, ad_hoc) = match self.sessions.entry(id.clone()) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                info!(
                    "File {:?} for unknown session {}, starting a {} session for it",
                    path,
                    id,
                    media_kind.as_str()
                );
                let mut session = CaptureSession::new(id.clone(), SourceId::Any, media_kind, at);
                session.ad_hoc = true;
                session.title = SessionTitle::Frozen(resolver.resolve(&session.source).await);
                (entry.insert(session), true)
            }
        };

        if session.state != SessionState::Active {
            warn!("Session {} already stopped, leaving {:?} in place", id, path);
            return FileArrival {
                session_id: id,
                placement: Placement::LeaveInPlace {
                    path: path.to_path_buf(),
                    reason: SkipReason::SessionClosing,
                },
                ad_hoc: false,
                closed: false,
            };
        }
        if session.media_kind != media_kind {
            debug!(
                "Session {} is a {} session, filing {:?} as such",
                id,
                session.media_kind.as_str(),
                path
            );
        }

        freeze_title(&resolver, session).await;

        session.split_sequence.push(path.to_path_buf());
        session.last_activity = Instant::now();

        let placement = compute_destination(session, path, policy);
        debug!(
            "Session {} file #{} {:?} -> {:?}",
            id,
            session.split_sequence.len(),
            path,
            placement
        );

        let closed = session.ad_hoc && session.media_kind == MediaKind::Screenshot;
        if closed {
            self.sessions.remove(&id);
        }

        FileArrival {
            session_id: id,
            placement,
            ad_hoc,
            closed,
        }
    }

    /// Active -> Closing
    pub fn on_stopped(&mut self, id: &SessionId) -> StopOutcome {
        match self.sessions.get_mut(id) {
            Some(session) if session.state == SessionState::Active => {
                session.state = SessionState::Closing;
                session.last_activity = Instant::now();
                info!(
                    "Session {} stopping after {} file(s)",
                    id,
                    session.split_sequence.len()
                );
                StopOutcome::Closing
            }
            Some(_) => StopOutcome::AlreadyClosing,
            None => {
                info!("Stop for unknown session {}", id);
                StopOutcome::Unknown
            }
        }
    }

    /// Closing -> Closed, once every queued file has been filed
    pub fn finish(&mut self, id: &SessionId) -> Option<CaptureSession> {
        if self
            .sessions
            .get(id)
            .is_some_and(|s| s.state == SessionState::Closing)
        {
            let mut session = self.sessions.remove(id)?;
            session.state = SessionState::Closed;
            debug!("Session {} closed", id);
            Some(session)
        } else {
            None
        }
    }

    /// Retry resolution for pending sessions after `source` hooked a window
    pub async fn on_window_hooked(&mut self, source: &SourceId) {
        let candidates: Vec<(SessionId, SourceId)> = self
            .sessions
            .values()
            .filter(|s| s.is_active() && (s.source == *source || s.source == SourceId::Any))
            .filter(|s| matches!(s.title, SessionTitle::Pending { attempts_left } if attempts_left > 0))
            .map(|s| (s.id.clone(), s.source.clone()))
            .collect();

        for (id, session_source) in candidates {
            let resolution = self.resolver.resolve(&session_source).await;
            if let Some(session) = self.sessions.get_mut(&id) {
                if let SessionTitle::Pending { attempts_left } = session.title {
                    session.title = match resolution {
                        TitleResolution::Resolved(_) => {
                            info!("Session {} resolved late: {:?}", id, resolution);
                            SessionTitle::Frozen(resolution)
                        }
                        TitleResolution::Unresolved => SessionTitle::Pending {
                            attempts_left: attempts_left.saturating_sub(1),
                        },
                    };
                }
            }
        }
    }

    /// Force-close sessions with no activity for longer than `grace`
    pub fn evict_stale(&mut self, now: Instant, grace: Duration) -> Vec<CaptureSession> {
        let stale: Vec<SessionId> = self
            .sessions
            .values()
            // Closing sessions are already on their way out
            .filter(|s| s.is_active() && now.saturating_duration_since(s.last_activity) > grace)
            .map(|s| s.id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .map(|mut session| {
                warn!(
                    "Session {} idle for {:?}, force-closing ({} file(s), title {:?})",
                    session.id,
                    now.saturating_duration_since(session.last_activity),
                    session.split_sequence.len(),
                    session.title
                );
                session.state = SessionState::Closed;
                session
            })
            .collect()
    }

    /// Move every active session to Closing, returning the ids affected
    pub fn close_all(&mut self) -> Vec<SessionId> {
        self.sessions
            .values_mut()
            .filter(|s| s.is_active())
            .map(|session| {
                session.state = SessionState::Closing;
                session.id.clone()
            })
            .collect()
    }

    fn initial_title(&self, resolution: TitleResolution) -> SessionTitle {
        match resolution {
            TitleResolution::Unresolved if self.resolve_attempts > 0 => SessionTitle::Pending {
                attempts_left: self.resolve_attempts,
            },
            resolution => SessionTitle::Frozen(resolution),
        }
    }
}

/// Commit a pending title, with one last lookup if attempts remain
async fn freeze_title(resolver: &TitleResolver, session: &mut CaptureSession) {
    let SessionTitle::Pending { attempts_left } = session.title else {
        return;
    };

    let resolution = if attempts_left > 0 {
        resolver.resolve(&session.source).await
    } else {
        TitleResolution::Unresolved
    };

    debug!("Session {} title frozen as {:?}", session.id, resolution);
    session.title = SessionTitle::Frozen(resolution);
}
