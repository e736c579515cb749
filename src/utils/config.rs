//! Application configuration

use crate::utils::error::RecorderError;
use crate::utils::organizer::{fallback_folder_name, OrganizationPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Most retries a move may be given
pub const MAX_RETRY_ATTEMPTS: usize = 10;

/// Longest base delay between move retries (ms)
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Where files go
    pub policy: OrganizationPolicy,

    /// How files are moved
    pub filer: FilerSettings,

    /// Session bookkeeping
    pub sessions: SessionSettings,
}

/// Move retry and timeout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilerSettings {
    /// Retries after the first failed move attempt
    pub retry_attempts: usize,

    /// Base delay between retries, doubled after every failure (ms)
    pub retry_delay_ms: u64,

    /// Upper bound on a single move attempt (secs)
    pub operation_timeout_secs: u64,
}

impl Default for FilerSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 250,
            operation_timeout_secs: 120,
        }
    }
}

impl FilerSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Title resolution and session lifetime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Re-resolution attempts for a title that was not available at start
    pub title_resolve_attempts: u32,

    /// Upper bound on a single host query (ms)
    pub title_query_timeout_ms: u64,

    /// Tries per host query before giving up
    pub title_query_attempts: usize,

    /// Sessions with no events for this long are force-closed (secs)
    pub idle_timeout_secs: u64,

    /// How often stale sessions are looked for (secs)
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            title_resolve_attempts: 3,
            title_query_timeout_ms: 500,
            title_query_attempts: 2,
            idle_timeout_secs: 6 * 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    pub fn title_query_timeout(&self) -> Duration {
        Duration::from_millis(self.title_query_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl AppSettings {
    /// Load settings from JSON, falling back to defaults when the file is missing
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings {:?}", path))?;
        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| RecorderError::InvalidConfig(format!("{}: {}", path.display(), e)))?;

        Ok(settings.validated())
    }

    /// Write settings as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create settings directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        let mut file = fs::File::create(path)
            .await
            .context("Failed to create settings file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write settings")?;
        file.flush().await?;
        Ok(())
    }

    /// Replace values that cannot work with sane minimums
    pub fn validated(mut self) -> Self {
        let fallback = fallback_folder_name(&self.policy);
        if fallback != self.policy.fallback_folder_name {
            warn!(
                "Fallback folder name {:?} is not filesystem safe, using {:?}",
                self.policy.fallback_folder_name, fallback
            );
            self.policy.fallback_folder_name = fallback;
        }
        if self.filer.retry_attempts > MAX_RETRY_ATTEMPTS {
            warn!(
                "retry_attempts {} is too high, using {}",
                self.filer.retry_attempts, MAX_RETRY_ATTEMPTS
            );
            self.filer.retry_attempts = MAX_RETRY_ATTEMPTS;
        }
        if self.filer.retry_delay_ms > MAX_RETRY_DELAY_MS {
            warn!(
                "retry_delay_ms {} is too high, using {}",
                self.filer.retry_delay_ms, MAX_RETRY_DELAY_MS
            );
            self.filer.retry_delay_ms = MAX_RETRY_DELAY_MS;
        }
        if self.filer.operation_timeout_secs == 0 {
            self.filer.operation_timeout_secs = 1;
        }
        if self.sessions.title_query_timeout_ms == 0 {
            self.sessions.title_query_timeout_ms = 1;
        }
        if self.sessions.title_query_attempts == 0 {
            self.sessions.title_query_attempts = 1;
        }
        if self.sessions.sweep_interval_secs == 0 {
            self.sessions.sweep_interval_secs = 1;
        }
        if self.sessions.idle_timeout_secs == 0 {
            self.sessions.idle_timeout_secs = SessionSettings::default().idle_timeout_secs;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::organizer::{OrganizeMode, DEFAULT_FALLBACK_FOLDER};
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppSettings::default();
        assert_eq!(config.policy.mode, OrganizeMode::Basic);
        assert_eq!(config.policy.fallback_folder_name, DEFAULT_FALLBACK_FOLDER);
        assert!(config.policy.organize_replay_buffer);
        assert!(config.policy.organize_screenshots);
        assert!(!config.policy.prefix_filename_with_title);
        assert!(config.filer.retry_attempts > 0);
        assert!(config.sessions.title_query_attempts > 0);
    }

    #[test]
    fn test_validation_enforces_minimums() {
        let mut config = AppSettings::default();
        config.policy.fallback_folder_name = "a/b".into();
        config.filer.operation_timeout_secs = 0;
        config.sessions.title_query_attempts = 0;
        config.sessions.sweep_interval_secs = 0;

        let config = config.validated();
        assert_eq!(config.policy.fallback_folder_name, "a_b");
        assert_eq!(config.filer.operation_timeout_secs, 1);
        assert_eq!(config.sessions.title_query_attempts, 1);
        assert_eq!(config.sessions.sweep_interval_secs, 1);
    }

    #[test]
    fn test_validation_caps_retries() {
        let mut config = AppSettings::default();
        config.filer.retry_attempts = usize::MAX;
        config.filer.retry_delay_ms = u64::MAX;

        let config = config.validated();
        assert_eq!(config.filer.retry_attempts, MAX_RETRY_ATTEMPTS);
        assert_eq!(config.filer.retry_delay(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_huge_retry_delay_from_file_is_capped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"filer":{"retry_attempts":2,"retry_delay_ms":18446744073709551615}}"#,
        )
        .unwrap();

        let loaded = AppSettings::load(&path).await.unwrap();
        assert_eq!(loaded.filer.retry_attempts, 2);
        assert_eq!(loaded.filer.retry_delay_ms, MAX_RETRY_DELAY_MS);
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = AppSettings::load(&temp_dir.path().join("missing.json"))
            .await
            .unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join("settings.json");

        let mut settings = AppSettings::default();
        settings.policy.mode = OrganizeMode::GroupByDate;
        settings.policy.prefix_filename_with_title = true;
        settings.filer.retry_attempts = 5;
        settings.save(&path).await.unwrap();

        let loaded = AppSettings::load(&path).await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "policy": { "organize_screenshots": false } }"#).unwrap();

        let loaded = AppSettings::load(&path).await.unwrap();
        assert!(!loaded.policy.organize_screenshots);
        assert_eq!(loaded.filer, FilerSettings::default());
    }

    #[tokio::test]
    async fn test_invalid_json_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, b"nope").unwrap();

        let err = AppSettings::load(&path).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecorderError>(),
            Some(RecorderError::InvalidConfig(_))
        ));
    }
}
