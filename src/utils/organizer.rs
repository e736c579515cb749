//! Organization policy: where a finished capture file belongs
//!
//! Everything here is a pure function of its inputs. The layout produced is
//! `<root>/<folder>/<bucket>[/<YYYY-MM-DD>]/[<folder> - ]<original name>`.

use crate::session::{CaptureSession, MediaKind};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_FALLBACK_FOLDER: &str = "Any Recording";

/// Longest folder/file name component produced by the sanitizer
pub const MAX_COMPONENT_LEN: usize = 200;

/// Organization strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrganizeMode {
    /// `<root>/<folder>/<bucket>`
    Basic,
    /// `<root>/<folder>/<bucket>/<session start date>`
    #[serde(alias = "date_based")]
    GroupByDate,
}

/// Sub-folder labels per media kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderNames {
    pub recordings: String,
    pub replay_buffer: String,
    pub screenshots: String,
}

impl Default for FolderNames {
    fn default() -> Self {
        Self {
            recordings: "Recordings".to_string(),
            replay_buffer: "ReplayBuffer".to_string(),
            screenshots: "Screenshots".to_string(),
        }
    }
}

/// Immutable organization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationPolicy {
    pub mode: OrganizeMode,
    pub fallback_folder_name: String,
    pub organize_replay_buffer: bool,
    pub organize_screenshots: bool,
    pub prefix_filename_with_title: bool,
    pub folder_names: FolderNames,
    /// Root of the produced layout; the file's own directory when unset
    pub capture_root: Option<PathBuf>,
}

impl Default for OrganizationPolicy {
    fn default() -> Self {
        Self {
            mode: OrganizeMode::Basic,
            fallback_folder_name: DEFAULT_FALLBACK_FOLDER.to_string(),
            organize_replay_buffer: true,
            organize_screenshots: true,
            prefix_filename_with_title: false,
            folder_names: FolderNames::default(),
            capture_root: None,
        }
    }
}

/// A single planned move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRequest {
    pub source_path: PathBuf,
    pub destination_folder: PathBuf,
    pub destination_filename: String,
}

impl FilingRequest {
    pub fn destination_path(&self) -> PathBuf {
        self.destination_folder.join(&self.destination_filename)
    }
}

/// Why a file is not moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ReplayBufferOrganizationDisabled,
    ScreenshotOrganizationDisabled,
    NoFileName,
    SessionClosing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::ReplayBufferOrganizationDisabled => "replay buffer organization is disabled",
            SkipReason::ScreenshotOrganizationDisabled => "screenshot organization is disabled",
            SkipReason::NoFileName => "path has no file name",
            SkipReason::SessionClosing => "session already stopped",
        };
        f.write_str(text)
    }
}

/// Outcome of the policy for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    File(FilingRequest),
    LeaveInPlace { path: PathBuf, reason: SkipReason },
}

/// Decide where `file_path`, produced by `session`, should go
pub fn compute_destination(
    session: &CaptureSession,
    file_path: &Path,
    policy: &OrganizationPolicy,
) -> Placement {
    let gated = match session.media_kind {
        MediaKind::ReplayBuffer if !policy.organize_replay_buffer => {
            Some(SkipReason::ReplayBufferOrganizationDisabled)
        }
        MediaKind::Screenshot if !policy.organize_screenshots => {
            Some(SkipReason::ScreenshotOrganizationDisabled)
        }
        _ => None,
    };
    if let Some(reason) = gated {
        return Placement::LeaveInPlace {
            path: file_path.to_path_buf(),
            reason,
        };
    }

    let original = match file_path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            return Placement::LeaveInPlace {
                path: file_path.to_path_buf(),
                reason: SkipReason::NoFileName,
            }
        }
    };

    let folder = folder_name(session, policy);

    let root = policy
        .capture_root
        .clone()
        .or_else(|| file_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    let mut destination_folder = root
        .join(&folder)
        .join(bucket_name(session.media_kind, policy));

    if policy.mode == OrganizeMode::GroupByDate {
        destination_folder = destination_folder.join(date_folder(&session.started_at));
    }

    let destination_filename = if policy.prefix_filename_with_title {
        format!("{} - {}", folder, original)
    } else {
        original
    };

    Placement::File(FilingRequest {
        source_path: file_path.to_path_buf(),
        destination_folder,
        destination_filename,
    })
}

/// Frozen session title, or the sanitized fallback folder name
pub fn folder_name(session: &CaptureSession, policy: &OrganizationPolicy) -> String {
    match session.resolved_title() {
        Some(title) => title.to_string(),
        None => fallback_folder_name(policy),
    }
}

pub fn fallback_folder_name(policy: &OrganizationPolicy) -> String {
    let clean = sanitize_component(&policy.fallback_folder_name);
    if clean.is_empty() {
        DEFAULT_FALLBACK_FOLDER.to_string()
    } else {
        clean
    }
}

/// Sub-folder label for a media kind
pub fn bucket_name(kind: MediaKind, policy: &OrganizationPolicy) -> String {
    let defaults = FolderNames::default();
    let (configured, default) = match kind {
        MediaKind::Recording => (&policy.folder_names.recordings, defaults.recordings),
        MediaKind::ReplayBuffer => (&policy.folder_names.replay_buffer, defaults.replay_buffer),
        MediaKind::Screenshot => (&policy.folder_names.screenshots, defaults.screenshots),
    };

    let clean = sanitize_component(configured);
    if clean.is_empty() {
        default
    } else {
        clean
    }
}

/// Date folder in YYYY-MM-DD format
pub fn date_folder(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Sanitizes a single path component by removing invalid characters and preventing security issues.
///
/// # Security
/// - Removes path traversal sequences (`..`)
/// - Removes leading dots (prevents hidden files)
/// - Removes invalid filesystem characters
/// - Limits length to 200 characters
///
/// Returns an empty string when nothing usable is left; callers pick the default.
///
/// # Examples
/// ```
/// use recorder::utils::organizer::sanitize_component;
/// assert_eq!(sanitize_component("../../etc/passwd"), "_etc_passwd");
/// assert_eq!(sanitize_component(".hidden"), "hidden");
/// assert_eq!(sanitize_component("Any Recording"), "Any Recording");
/// ```
pub fn sanitize_component(name: &str) -> String {
    // Characters invalid on Windows/macOS/Linux filesystems
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

    let mut sanitized: String = name
        .replace("..", "")
        .chars()
        .map(|c| {
            if invalid_chars.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    sanitized = sanitized.trim().trim_start_matches('.').to_string();

    // Trailing dots and spaces are stripped by Windows
    sanitized = sanitized.trim_end_matches('.').trim_end().to_string();

    while sanitized.contains("__") {
        sanitized = sanitized.replace("__", "_");
    }

    if sanitized.chars().count() > MAX_COMPONENT_LEN {
        sanitized = sanitized.chars().take(MAX_COMPONENT_LEN).collect();
    }

    sanitized
}
