//! TOML-based configuration for swarmshare nodes.
//!
//! Every field has a default, so an empty document is a valid configuration.
//!
//! ```toml
//! [transfer]
//! chunk_size = 262144
//! max_parallel_chunks = 16
//! request_timeout_ms = 5000
//!
//! [transfer.download_retry]
//! kind = "exponential"
//! initial_delay_ms = 500
//! multiplier = 2.0
//! max_delay_ms = 30000
//!
//! [transfer.upload_retry]
//! kind = "immediate"
//! max_attempts = 3
//!
//! [service]
//! tick_interval_ms = 250
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use swarmshare_core::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PARALLEL_CHUNKS, DEFAULT_MAX_PARALLEL_PER_FILE,
    DEFAULT_MAX_PARALLEL_PER_PEER, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SMALL_FILE_FRACTION,
    DEFAULT_SMALL_FILE_THRESHOLD,
};
use swarmshare_transfer::{RetryPolicy, TransferOptions};

use crate::error::NodeError;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub transfer: TransferSection,
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// Validate the `[transfer]` section and convert it into engine options.
    pub fn transfer_options(&self) -> Result<TransferOptions, NodeError> {
        let t = &self.transfer;
        if t.chunk_size == 0 {
            return Err(NodeError::Config("transfer.chunk_size must be non-zero".into()));
        }
        for (name, value) in [
            ("max_parallel_chunks", t.max_parallel_chunks),
            ("max_parallel_per_file", t.max_parallel_per_file),
            ("max_parallel_per_peer", t.max_parallel_per_peer),
        ] {
            if value == 0 {
                return Err(NodeError::Config(format!("transfer.{name} must be non-zero")));
            }
        }
        if !(0.0..=1.0).contains(&t.small_file_fraction) {
            return Err(NodeError::Config(format!(
                "transfer.small_file_fraction must be within [0, 1], got {}",
                t.small_file_fraction
            )));
        }

        Ok(TransferOptions {
            chunk_size: t.chunk_size,
            max_parallel_chunks: t.max_parallel_chunks,
            max_parallel_per_file: t.max_parallel_per_file,
            max_parallel_per_peer: t.max_parallel_per_peer,
            request_timeout: Duration::from_millis(t.request_timeout_ms),
            download_retry: t.download_retry.to_policy("download_retry")?,
            upload_retry: t.upload_retry.to_policy("upload_retry")?,
            small_file_threshold: t.small_file_threshold,
            small_file_fraction: t.small_file_fraction,
        })
    }
}

/// The `[transfer]` section.
#[derive(Debug, Deserialize)]
pub struct TransferSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    #[serde(default = "default_max_parallel_chunks")]
    pub max_parallel_chunks: usize,
    #[serde(default = "default_max_parallel_per_file")]
    pub max_parallel_per_file: usize,
    #[serde(default = "default_max_parallel_per_peer")]
    pub max_parallel_per_peer: usize,
    /// Milliseconds before an unanswered GET counts as a failure.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Files up to this many bytes get the small-file bonus.
    #[serde(default = "default_small_file_threshold")]
    pub small_file_threshold: u64,
    #[serde(default = "default_small_file_fraction")]
    pub small_file_fraction: f64,
    /// How long a peer stays unavailable after a MISSING or timeout.
    #[serde(default = "default_download_retry")]
    pub download_retry: RetryPolicyEntry,
    /// How failed reads of shared files are retried.
    #[serde(default = "default_upload_retry")]
    pub upload_retry: RetryPolicyEntry,
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_parallel_chunks() -> usize {
    DEFAULT_MAX_PARALLEL_CHUNKS
}

fn default_max_parallel_per_file() -> usize {
    DEFAULT_MAX_PARALLEL_PER_FILE
}

fn default_max_parallel_per_peer() -> usize {
    DEFAULT_MAX_PARALLEL_PER_PEER
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_small_file_threshold() -> u64 {
    DEFAULT_SMALL_FILE_THRESHOLD
}

fn default_small_file_fraction() -> f64 {
    DEFAULT_SMALL_FILE_FRACTION
}

fn default_download_retry() -> RetryPolicyEntry {
    RetryPolicyEntry::Exponential {
        max_attempts: Some(3),
        initial_delay_ms: 1_000,
        multiplier: 1.5,
        max_delay_ms: 10_000,
    }
}

fn default_upload_retry() -> RetryPolicyEntry {
    RetryPolicyEntry::Constant {
        max_attempts: Some(5),
        delay_ms: 2_000,
    }
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_parallel_chunks: default_max_parallel_chunks(),
            max_parallel_per_file: default_max_parallel_per_file(),
            max_parallel_per_peer: default_max_parallel_per_peer(),
            request_timeout_ms: default_request_timeout_ms(),
            small_file_threshold: default_small_file_threshold(),
            small_file_fraction: default_small_file_fraction(),
            download_retry: default_download_retry(),
            upload_retry: default_upload_retry(),
        }
    }
}

/// A retry policy table, tagged by `kind`. Omitting `max_attempts` means unlimited.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RetryPolicyEntry {
    Constant {
        max_attempts: Option<u32>,
        #[serde(default = "default_delay_ms")]
        delay_ms: u64,
    },
    Exponential {
        max_attempts: Option<u32>,
        #[serde(default = "default_delay_ms")]
        initial_delay_ms: u64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
    },
    Immediate {
        max_attempts: Option<u32>,
    },
}

fn default_delay_ms() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl RetryPolicyEntry {
    fn to_policy(&self, name: &str) -> Result<RetryPolicy, NodeError> {
        let policy = match *self {
            Self::Constant {
                max_attempts,
                delay_ms,
            } => RetryPolicy::constant(max_attempts, Duration::from_millis(delay_ms)),
            Self::Exponential {
                max_attempts,
                initial_delay_ms,
                multiplier,
                max_delay_ms,
            } => {
                if !(multiplier >= 1.0 && multiplier.is_finite()) {
                    return Err(NodeError::Config(format!(
                        "transfer.{name}.multiplier must be a finite value >= 1, got {multiplier}"
                    )));
                }
                RetryPolicy::exponential(
                    max_attempts,
                    Duration::from_millis(initial_delay_ms),
                    multiplier,
                    Duration::from_millis(max_delay_ms),
                )
            }
            Self::Immediate { max_attempts } => RetryPolicy::immediate(max_attempts),
        };
        Ok(policy)
    }
}

/// The `[service]` section.
#[derive(Debug, Deserialize)]
pub struct ServiceSection {
    /// Period of the timer that expires requests and retries reads.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Depth of the inbound command queue.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_command_buffer() -> usize {
    1024
}

impl ServiceSection {
    /// The timer period, rejecting zero.
    pub fn tick_interval(&self) -> Result<Duration, NodeError> {
        if self.tick_interval_ms == 0 {
            return Err(NodeError::Config("service.tick_interval_ms must be non-zero".into()));
        }
        Ok(Duration::from_millis(self.tick_interval_ms))
    }
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            command_buffer: default_command_buffer(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
