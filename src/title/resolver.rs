//! Title resolution for monitored capture sources

use crate::title::models::{SourceId, TitleResolution};
use crate::title::traits::CaptureHost;
use crate::utils::bindings::SourceBindings;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Longest folder name produced from a window title, in characters
pub const MAX_TITLE_LEN: usize = 100;

/// Resolves the window title bound to a capture source into a folder name
pub struct TitleResolver {
    host: Arc<dyn CaptureHost>,
    bindings: Arc<SourceBindings>,
    query_timeout: Duration,
    query_attempts: usize,
}

impl TitleResolver {
    pub fn new(
        host: Arc<dyn CaptureHost>,
        bindings: Arc<SourceBindings>,
        query_timeout: Duration,
        query_attempts: usize,
    ) -> Self {
        Self {
            host,
            bindings,
            query_timeout,
            query_attempts: query_attempts.max(1),
        }
    }

    /// Resolve the title for `source`
    ///
    /// Never fails: a missing source, an unhooked source, a host error or a
    /// title that sanitizes to nothing all yield `Unresolved`.
    pub async fn resolve(&self, source: &SourceId) -> TitleResolution {
        let source_id = match source {
            SourceId::Id(id) => id.clone(),
            SourceId::Any => match self.pick_source().await {
                Some(id) => id,
                None => {
                    debug!("No capable source in the active scene");
                    return TitleResolution::Unresolved;
                }
            },
        };

        let host = &self.host;
        let raw = self
            .query("bound window title", || host.bound_window_title(&source_id))
            .await
            .flatten();

        match raw {
            Some(raw) => {
                let clean = sanitize_title(&raw);
                if clean.is_empty() {
                    debug!("Title {:?} of source {} is empty after sanitizing", raw, source_id);
                    TitleResolution::Unresolved
                } else {
                    debug!("Resolved source {} to {:?}", source_id, clean);
                    TitleResolution::Resolved(clean)
                }
            }
            None => {
                debug!("Source {} is not hooked to a window", source_id);
                TitleResolution::Unresolved
            }
        }
    }

    /// Pick the source to query for the "any" sentinel
    async fn pick_source(&self) -> Option<String> {
        let host = &self.host;
        let scene = self.query("active scene", || host.active_scene()).await??;

        if let Some(bound) = self.bindings.source_for(&scene.collection, &scene.name) {
            if scene.contains(bound) {
                debug!("Using bound source {} for scene {}", bound, scene.name);
                return Some(bound.to_string());
            }
            warn!(
                "Bound source {} is no longer in scene {}, picking the first capable source",
                bound, scene.name
            );
        }

        scene.first_capable().map(|source| source.id.clone())
    }

    /// Run a host query with a timeout, retrying a fixed number of times
    async fn query<T, F, Fut>(&self, what: &str, mut call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.query_attempts {
            match timeout(self.query_timeout, call()).await {
                Ok(Ok(value)) => return Some(value),
                Ok(Err(e)) => {
                    warn!(
                        "Host {} query for {} failed (attempt {}): {}",
                        self.host.id(),
                        what,
                        attempt,
                        e
                    );
                }
                Err(_) => {
                    warn!(
                        "Host {} query for {} timed out after {:?} (attempt {})",
                        self.host.id(),
                        what,
                        self.query_timeout,
                        attempt
                    );
                }
            }
        }
        None
    }
}

/// Reduce a window title to a folder-safe name
///
/// Keeps letters, digits and spaces, collapses whitespace and caps the
/// length. Returns an empty string when nothing usable is left.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > MAX_TITLE_LEN {
        collapsed
            .chars()
            .take(MAX_TITLE_LEN)
            .collect::<String>()
            .trim_end()
            .to_string()
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::host::StaticHost;
    use crate::title::models::{SceneInfo, SourceInfo, SourceKind};

    fn source(id: &str, kind: SourceKind) -> SourceInfo {
        SourceInfo {
            id: id.to_string(),
            name: id.to_uppercase(),
            kind,
            visible: true,
        }
    }

    fn resolver(host: Arc<StaticHost>, bindings: SourceBindings) -> TitleResolver {
        TitleResolver::new(host, Arc::new(bindings), Duration::from_millis(50), 2)
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Game: The Sequel!"), "Game The Sequel");
        assert_eq!(sanitize_title("  Spaced    out  "), "Spaced out");
        assert_eq!(sanitize_title("../../etc"), "etc");
        assert_eq!(sanitize_title("Pokémon"), "Pokémon");
        assert_eq!(sanitize_title(":::"), "");
    }

    #[test]
    fn test_sanitize_title_length_cap() {
        let long = "word ".repeat(60);
        let clean = sanitize_title(&long);
        assert!(clean.chars().count() <= MAX_TITLE_LEN);
        assert!(!clean.ends_with(' '));
    }

    #[tokio::test]
    async fn test_resolve_concrete_source() {
        let host = Arc::new(StaticHost::new());
        host.set_title("gc", Some("Game A".into())).await;

        let resolver = resolver(host, SourceBindings::new());
        let result = resolver.resolve(&SourceId::from("gc")).await;
        assert_eq!(result, TitleResolution::Resolved("Game A".into()));
    }

    #[tokio::test]
    async fn test_resolve_unhooked_or_missing_source() {
        let host = Arc::new(StaticHost::new());
        host.set_title("gc", Some("?!?".into())).await;

        let resolver = resolver(host, SourceBindings::new());
        assert_eq!(
            resolver.resolve(&SourceId::from("gc")).await,
            TitleResolution::Unresolved
        );
        assert_eq!(
            resolver.resolve(&SourceId::from("nope")).await,
            TitleResolution::Unresolved
        );
    }

    #[tokio::test]
    async fn test_resolve_any_picks_first_capable() {
        let host = Arc::new(StaticHost::new());
        host.set_scene(Some(SceneInfo {
            collection: "Main".into(),
            name: "Gaming".into(),
            sources: vec![
                source("display", SourceKind::DisplayCapture),
                source("gc", SourceKind::GameCapture),
            ],
        }))
        .await;
        host.set_title("display", Some("Desktop".into())).await;
        host.set_title("gc", Some("Game A".into())).await;

        let resolver = resolver(host, SourceBindings::new());
        assert_eq!(
            resolver.resolve(&SourceId::Any).await,
            TitleResolution::Resolved("Game A".into())
        );
    }

    #[tokio::test]
    async fn test_resolve_any_prefers_scene_binding() {
        let host = Arc::new(StaticHost::new());
        host.set_scene(Some(SceneInfo {
            collection: "Main".into(),
            name: "Gaming".into(),
            sources: vec![
                source("gc", SourceKind::GameCapture),
                source("wc", SourceKind::WindowCapture),
            ],
        }))
        .await;
        host.set_title("gc", Some("Game A".into())).await;
        host.set_title("wc", Some("Editor".into())).await;

        let mut bindings = SourceBindings::new();
        bindings.bind("Main", "Gaming", "wc");

        let resolver = resolver(host, bindings);
        assert_eq!(
            resolver.resolve(&SourceId::Any).await,
            TitleResolution::Resolved("Editor".into())
        );
    }

    #[tokio::test]
    async fn test_resolve_any_without_scene() {
        let host = Arc::new(StaticHost::new());
        let resolver = resolver(host, SourceBindings::new());
        assert_eq!(
            resolver.resolve(&SourceId::Any).await,
            TitleResolution::Unresolved
        );
    }

    #[tokio::test]
    async fn test_slow_host_times_out() {
        let host = Arc::new(StaticHost::new());
        host.set_title("gc", Some("Game A".into())).await;
        host.set_latency(Some(Duration::from_millis(500))).await;

        let resolver = resolver(host, SourceBindings::new());
        assert_eq!(
            resolver.resolve(&SourceId::from("gc")).await,
            TitleResolution::Unresolved
        );
    }
}
