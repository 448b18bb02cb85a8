//! Transfer options
//!
//! Every option struct deserializes with defaults for missing fields, so
//! callers can embed them in their own configuration files. Nothing here
//! reads the environment or the filesystem.

use crate::{FilestoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest byte range the read endpoint serves per call
pub const MAX_READ_LENGTH: usize = 1024 * 1024;

/// Raw payload limit of a single API call
pub const API_PAYLOAD_LIMIT: usize = 1_000_000;

/// How part files of a partitioned folder are ordered before concatenation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartOrder {
    /// Lexicographic order of the part paths
    #[default]
    ByName,
    /// Whatever order the `list` call returned
    Listing,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadOptions {
    /// Bytes requested per read call (default: 1,000,000)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Spill the accumulated download to an anonymous temp file once it
    /// exceeds this many bytes (default: never, keep in memory)
    #[serde(default)]
    pub spill_threshold: Option<usize>,

    #[serde(default)]
    pub part_order: PartOrder,
}

fn default_batch_size() -> usize {
    1_000_000
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            spill_threshold: None,
            part_order: PartOrder::default(),
        }
    }
}

impl DownloadOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_READ_LENGTH {
            return Err(FilestoreError::InvalidConfig(format!(
                "batch_size must be between 1 and {MAX_READ_LENGTH}, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadOptions {
    /// Write the column names as a separate first chunk (default: true)
    #[serde(default = "default_headers")]
    pub headers: bool,

    /// Encoded bytes per chunk that row batches are sized for (default: 50,000)
    #[serde(default = "default_chunk_target")]
    pub chunk_target: usize,

    /// Hard limit on the encoded size of any chunk (default: 700,000)
    #[serde(default = "default_chunk_ceiling")]
    pub chunk_ceiling: usize,
}

fn default_headers() -> bool {
    true
}
fn default_chunk_target() -> usize {
    50_000
}
fn default_chunk_ceiling() -> usize {
    700_000
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            headers: default_headers(),
            chunk_target: default_chunk_target(),
            chunk_ceiling: default_chunk_ceiling(),
        }
    }
}

impl UploadOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_target == 0 {
            return Err(FilestoreError::InvalidConfig(
                "chunk_target must be greater than 0".to_string(),
            ));
        }
        if self.chunk_ceiling < self.chunk_target {
            return Err(FilestoreError::InvalidConfig(format!(
                "chunk_ceiling ({}) must not be below chunk_target ({})",
                self.chunk_ceiling, self.chunk_target
            )));
        }
        if self.chunk_ceiling > API_PAYLOAD_LIMIT {
            return Err(FilestoreError::InvalidConfig(format!(
                "chunk_ceiling must not exceed the {API_PAYLOAD_LIMIT} byte API limit"
            )));
        }
        Ok(())
    }
}

/// Backoff for transient failures of a single call
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 3, 0 disables retrying)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    3
}
fn default_min_delay_ms() -> u64 {
    250
}
fn default_max_delay_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> backon::ExponentialBuilder {
        backon::ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms)))
            .with_max_times(self.max_retries)
    }
}

/// Everything needed to talk to one workspace
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    pub host: String,
    pub token: String,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub download: DownloadOptions,

    #[serde(default)]
    pub upload: UploadOptions,
}

fn default_timeout_secs() -> u64 {
    60
}

impl LinkConfig {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
            download: DownloadOptions::default(),
            upload: UploadOptions::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(FilestoreError::InvalidConfig(
                "token cannot be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(FilestoreError::InvalidConfig(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        self.download.validate()?;
        self.upload.validate()
    }
}
