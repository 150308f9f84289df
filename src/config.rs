//! Recorder configuration
//!
//! Loaded from a camelCase JSON file; every field has a default so a partial
//! file (or none at all) is valid.

use crate::capture::{CaptureConstraints, ReacquirePolicy};
use crate::recorder::encoder::DEFAULT_MIME_PREFERENCES;
use crate::upload::DEFAULT_BEACON_MAX_BYTES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `ingestionUrl`
pub const INGESTION_URL_ENV: &str = "SESSION_RECORDER_INGESTION_URL";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What to do when the user revokes the screen share mid-recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceLossPolicy {
    /// Try to get a new stream and keep the same recording going
    #[default]
    Reacquire,
    /// Stop and deliver what was captured
    Stop,
}

/// Configuration for the capture-and-delivery pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Endpoint accepting multipart recording uploads
    pub ingestion_url: String,

    /// Directory of the durable staging store
    pub staging_dir: PathBuf,

    /// Where the local-file fallback writes recordings
    pub download_dir: PathBuf,

    /// File name prefix for local-file fallback saves
    pub download_prefix: String,

    /// Encoder time slice in milliseconds
    pub slice_interval_ms: u64,

    /// How long to wait for the encoder's last fragment after stop
    pub finalize_timeout_ms: u64,

    /// Requested capture quality
    pub constraints: CaptureConstraints,

    /// Recording formats in order of preference
    pub mime_preferences: Vec<String>,

    /// Reaction to the user revoking the share
    pub source_loss_policy: SourceLossPolicy,

    /// Acquire attempts when reacquiring a lost source
    pub reacquire_attempts: u32,

    /// Delay before each reacquire attempt in milliseconds
    pub reacquire_delay_ms: u64,

    /// Largest payload the beacon tier will accept
    ///
    /// Recordings above it are not beaconed at unload; they stay staged and
    /// go out with the next load's drain.
    pub beacon_max_bytes: usize,

    /// Interval between elapsed-time progress reports in seconds
    pub progress_interval_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ingestion_url: "http://localhost:5000/save_screen_recording".to_string(),
            staging_dir: PathBuf::from("staging"),
            download_dir: PathBuf::from("downloads"),
            download_prefix: "session".to_string(),
            slice_interval_ms: 10_000,
            finalize_timeout_ms: 10_000,
            constraints: CaptureConstraints::default(),
            mime_preferences: DEFAULT_MIME_PREFERENCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            source_loss_policy: SourceLossPolicy::default(),
            reacquire_attempts: 3,
            reacquire_delay_ms: 1_000,
            beacon_max_bytes: DEFAULT_BEACON_MAX_BYTES,
            progress_interval_secs: 30,
        }
    }
}

impl RecorderConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(INGESTION_URL_ENV) {
            if !url.trim().is_empty() {
                self.ingestion_url = url.trim().to_string();
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ingestion_url.starts_with("http://") || self.ingestion_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "ingestion url must be http(s): {}",
                self.ingestion_url
            )));
        }
        if self.slice_interval_ms == 0 {
            return Err(ConfigError::Invalid("slice interval must be positive".into()));
        }
        if self.reacquire_attempts == 0 && self.source_loss_policy == SourceLossPolicy::Reacquire {
            return Err(ConfigError::Invalid(
                "reacquire policy needs at least one attempt".into(),
            ));
        }
        if self.constraints.ideal_width > self.constraints.max_width
            || self.constraints.ideal_height > self.constraints.max_height
            || self.constraints.ideal_frame_rate > self.constraints.max_frame_rate
        {
            return Err(ConfigError::Invalid("ideal constraints exceed maximums".into()));
        }
        Ok(())
    }

    pub fn slice_interval(&self) -> Duration {
        Duration::from_millis(self.slice_interval_ms)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn reacquire_policy(&self) -> ReacquirePolicy {
        ReacquirePolicy {
            attempts: self.reacquire_attempts,
            delay: Duration::from_millis(self.reacquire_delay_ms),
        }
    }
}
