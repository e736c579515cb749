//! Scripted host adapter
//!
//! Translates a JSON-lines script of host callbacks into dispatcher calls,
//! one object per line, for example:
//!
//! ```text
//! {"event":"set_title","source":"gc","title":"Game A"}
//! {"event":"started","session":1,"source":"gc","kind":"recording"}
//! {"event":"split","session":1,"path":"/captures/rec1.mp4"}
//! {"event":"stopped","session":1}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use crate::backend::{BackendCommand, Dispatcher};
use crate::session::{MediaKind, SessionId};
use crate::title::{SceneInfo, SourceId, SourceInfo, StaticHost};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Session ids may be written as numbers or strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptSessionId {
    Number(u64),
    Text(String),
}

impl From<ScriptSessionId> for SessionId {
    fn from(value: ScriptSessionId) -> Self {
        match value {
            ScriptSessionId::Number(n) => SessionId::from(n),
            ScriptSessionId::Text(s) => SessionId::new(s),
        }
    }
}

/// One line of a host script
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Started {
        session: ScriptSessionId,
        #[serde(default)]
        source: Option<SourceId>,
        #[serde(default = "default_kind")]
        kind: MediaKind,
        at: Option<DateTime<Local>>,
    },
    Split {
        session: ScriptSessionId,
        path: PathBuf,
        at: Option<DateTime<Local>>,
    },
    /// Replay-buffer save or screenshot; a missing session gets a fresh id
    Saved {
        session: Option<ScriptSessionId>,
        path: PathBuf,
        #[serde(default = "default_kind")]
        kind: MediaKind,
        at: Option<DateTime<Local>>,
    },
    Stopped {
        session: ScriptSessionId,
        at: Option<DateTime<Local>>,
    },
    Hooked {
        source: SourceId,
    },
    SceneCollectionChanged,

    // Host state, applied to the in-memory host
    SetTitle {
        source: String,
        title: Option<String>,
    },
    SetScene {
        collection: String,
        scene: String,
        #[serde(default)]
        sources: Vec<SourceInfo>,
    },
    ClearScene,
}

fn default_kind() -> MediaKind {
    MediaKind::Recording
}

impl ScriptEvent {
    /// Parse one script line; `None` for blanks and comments
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let event = serde_json::from_str(line).context("Invalid script event")?;
        Ok(Some(event))
    }
}

/// Feed a script through the dispatcher, returning the number of events applied
///
/// Host state changes wait until the dispatcher has caught up with every
/// earlier event, so titles change exactly where the script says they do.
pub async fn replay<R>(reader: R, host: &StaticHost, dispatcher: &Dispatcher) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut applied = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read script")? {
        line_no += 1;
        let Some(event) =
            ScriptEvent::parse(&line).with_context(|| format!("Script line {}", line_no))?
        else {
            continue;
        };

        debug!("Script line {}: {:?}", line_no, event);
        apply(event, host, dispatcher)
            .await
            .with_context(|| format!("Script line {}", line_no))?;
        applied += 1;
    }

    Ok(applied)
}

async fn apply(event: ScriptEvent, host: &StaticHost, dispatcher: &Dispatcher) -> Result<()> {
    match event {
        ScriptEvent::Started {
            session,
            source,
            kind,
            at,
        } => {
            dispatcher
                .dispatch(BackendCommand::CaptureStarted {
                    session_id: session.into(),
                    source: source.unwrap_or(SourceId::Any),
                    media_kind: kind,
                    at: at.unwrap_or_else(Local::now),
                })
                .await?
        }
        ScriptEvent::Split { session, path, at } => {
            dispatcher
                .dispatch(BackendCommand::FileSplit {
                    session_id: session.into(),
                    path,
                    at: at.unwrap_or_else(Local::now),
                })
                .await?
        }
        ScriptEvent::Saved {
            session,
            path,
            kind,
            at,
        } => {
            let session_id = session.map(SessionId::from).unwrap_or_else(SessionId::synthesize);
            dispatcher
                .dispatch(BackendCommand::FileSaved {
                    session_id,
                    path,
                    media_kind: kind,
                    at: at.unwrap_or_else(Local::now),
                })
                .await?
        }
        ScriptEvent::Stopped { session, at } => {
            dispatcher
                .dispatch(BackendCommand::CaptureStopped {
                    session_id: session.into(),
                    at: at.unwrap_or_else(Local::now),
                })
                .await?
        }
        ScriptEvent::Hooked { source } => dispatcher.window_hooked(source).await?,
        ScriptEvent::SceneCollectionChanged => dispatcher.scene_collection_changed().await?,
        ScriptEvent::SetTitle { source, title } => {
            dispatcher.barrier().await?;
            host.set_title(&source, title).await;
        }
        ScriptEvent::SetScene {
            collection,
            scene,
            sources,
        } => {
            dispatcher.barrier().await?;
            host.set_scene(Some(SceneInfo {
                collection,
                name: scene,
                sources,
            }))
            .await;
        }
        ScriptEvent::ClearScene => {
            dispatcher.barrier().await?;
            host.set_scene(None).await;
        }
    }
    Ok(())
}
