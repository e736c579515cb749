//! Persisted per-scene source bindings
//!
//! Maps `scene collection -> scene -> source id` so that the "any" source
//! sentinel can follow the user's choice for each scene.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceBindings {
    collections: BTreeMap<String, BTreeMap<String, String>>,
}

impl SourceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load bindings, treating a missing or unreadable file as empty
    pub async fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read source bindings {:?}: {}", path, e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(bindings) => {
                debug!("Loaded source bindings from {:?}", path);
                bindings
            }
            Err(e) => {
                warn!("Ignoring corrupt source bindings {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Write bindings as pretty JSON, creating the parent directory
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create bindings directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize bindings")?;
        let mut file = fs::File::create(path)
            .await
            .context("Failed to create bindings file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write bindings")?;
        file.flush().await?;
        Ok(())
    }

    pub fn bind(&mut self, collection: &str, scene: &str, source_id: &str) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(scene.to_string(), source_id.to_string());
    }

    pub fn source_for(&self, collection: &str, scene: &str) -> Option<&str> {
        self.collections
            .get(collection)
            .and_then(|scenes| scenes.get(scene))
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn scenes_in(&self, collection: &str) -> Option<&BTreeMap<String, String>> {
        self.collections.get(collection)
    }
}
