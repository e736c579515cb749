//! Data structures for capture sources and resolved titles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a monitored capture source
///
/// `Any` asks the resolver to pick the source itself: the scene binding if one
/// exists, otherwise the first capable source in the active scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceId {
    Any,
    Id(String),
}

impl SourceId {
    pub fn as_id(&self) -> Option<&str> {
        match self {
            SourceId::Any => None,
            SourceId::Id(id) => Some(id),
        }
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            SourceId::Any
        } else {
            SourceId::Id(trimmed.to_string())
        }
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        SourceId::from(value.as_str())
    }
}

impl From<SourceId> for String {
    fn from(value: SourceId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Any => write!(f, "any"),
            SourceId::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Kind of a source as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GameCapture,
    WindowCapture,
    DisplayCapture,
    Other,
}

/// One source inside a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl SourceInfo {
    /// Only visible game/window captures can report a hooked window.
    pub fn is_capable(&self) -> bool {
        self.visible && matches!(self.kind, SourceKind::GameCapture | SourceKind::WindowCapture)
    }
}

/// The scene currently shown by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub collection: String,
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceInfo>,
}

impl SceneInfo {
    pub fn contains(&self, source_id: &str) -> bool {
        self.sources.iter().any(|s| s.id == source_id)
    }

    pub fn first_capable(&self) -> Option<&SourceInfo> {
        self.sources.iter().find(|s| s.is_capable())
    }
}

/// Result of a title lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TitleResolution {
    /// Sanitized, non-empty folder name
    Resolved(String),
    Unresolved,
}

impl TitleResolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, TitleResolution::Resolved(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            TitleResolution::Resolved(name) => Some(name),
            TitleResolution::Unresolved => None,
        }
    }
}
