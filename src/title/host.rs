//! In-memory capture host used by the command-line adapter and tests

use crate::title::models::SceneInfo;
use crate::title::traits::CaptureHost;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Capture host whose state is pushed in by the caller
#[derive(Debug, Default)]
pub struct StaticHost {
    titles: RwLock<HashMap<String, String>>,
    scene: RwLock<Option<SceneInfo>>,
    latency: RwLock<Option<Duration>>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the window a source is hooked to; `None` unhooks it
    pub async fn set_title(&self, source_id: &str, title: Option<String>) {
        let mut titles = self.titles.write().await;
        match title {
            Some(title) => {
                titles.insert(source_id.to_string(), title);
            }
            None => {
                titles.remove(source_id);
            }
        }
    }

    pub async fn set_scene(&self, scene: Option<SceneInfo>) {
        *self.scene.write().await = scene;
    }

    /// Delay every query, simulating a host that is slow to answer
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CaptureHost for StaticHost {
    fn id(&self) -> &'static str {
        "static"
    }

    async fn bound_window_title(&self, source_id: &str) -> Result<Option<String>> {
        self.simulate_latency().await;
        Ok(self.titles.read().await.get(source_id).cloned())
    }

    async fn active_scene(&self) -> Result<Option<SceneInfo>> {
        self.simulate_latency().await;
        Ok(self.scene.read().await.clone())
    }
}
