//! Configuration loading for the export pipeline.
//!
//! Every field has a default; environment variables override them. A `.env`
//! file in the working directory is honoured when present.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::jobs::WorkerConfig;

pub const ENV_WORKER_ID: &str = "GRADELENS_WORKER_ID";
pub const ENV_POLL_INTERVAL_MS: &str = "GRADELENS_POLL_INTERVAL_MS";
pub const ENV_STUCK_AFTER_SECS: &str = "GRADELENS_STUCK_AFTER_SECS";
pub const ENV_ARTIFACT_DIR: &str = "GRADELENS_ARTIFACT_DIR";
pub const ENV_ARTIFACT_BASE_URL: &str = "GRADELENS_ARTIFACT_BASE_URL";
pub const ENV_DATA_FILE: &str = "GRADELENS_DATA_FILE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Name used in logs and `Claimed` events.
    pub worker_id: String,
    /// Periodic sweep interval (claims missed signals, reclaims stuck jobs).
    pub poll_interval: Duration,
    /// A `processing` job claimed longer ago than this is failed by the sweep.
    pub stuck_after: Duration,
    pub artifact_dir: PathBuf,
    pub artifact_base_url: String,
    /// JSON file of domain rows to seed the in-memory data source with.
    pub data_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_id: "export-worker".to_string(),
            poll_interval: Duration::from_secs(5),
            stuck_after: Duration::from_secs(15 * 60),
            artifact_dir: PathBuf::from("artifacts"),
            artifact_base_url: "/artifacts".to_string(),
            data_file: None,
        }
    }
}

impl PipelineConfig {
    /// Load from the process environment (after reading `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(id) = lookup(ENV_WORKER_ID).filter(|v| !v.trim().is_empty()) {
            config.worker_id = id;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            config.poll_interval = Duration::from_millis(parse_positive(ENV_POLL_INTERVAL_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_STUCK_AFTER_SECS) {
            config.stuck_after = Duration::from_secs(parse_positive(ENV_STUCK_AFTER_SECS, &raw)?);
        }
        if let Some(dir) = lookup(ENV_ARTIFACT_DIR).filter(|v| !v.trim().is_empty()) {
            config.artifact_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(ENV_ARTIFACT_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.artifact_base_url = url;
        }
        if let Some(path) = lookup(ENV_DATA_FILE).filter(|v| !v.trim().is_empty()) {
            config.data_file = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_worker_id(self.worker_id.clone())
            .with_poll_interval(self.poll_interval)
            .with_stuck_after(self.stuck_after)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        }),
    }
}
