use crate::title::models::SceneInfo;
use anyhow::Result;
use async_trait::async_trait;

/// Query side of the host capture application
///
/// This trait isolates the core from the specific host API (plugin runtime,
/// scripting bridge, test double, etc.). Implementations may block on the
/// host; callers bound every call with a timeout.
#[async_trait]
pub trait CaptureHost: Send + Sync {
    /// Returns a unique identifier for this host binding (e.g., "static", "obs-bridge")
    fn id(&self) -> &'static str;

    /// Raw title of the window the source is currently hooked to
    ///
    /// `Ok(None)` when the source exists but is not hooked to anything.
    async fn bound_window_title(&self, source_id: &str) -> Result<Option<String>>;

    /// The active scene and its sources, if the host has one
    async fn active_scene(&self) -> Result<Option<SceneInfo>>;
}
