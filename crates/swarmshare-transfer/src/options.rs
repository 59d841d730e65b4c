//! Tunables shared by the download and upload managers.

use std::time::Duration;

use swarmshare_core::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PARALLEL_CHUNKS, DEFAULT_MAX_PARALLEL_PER_FILE,
    DEFAULT_MAX_PARALLEL_PER_PEER, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SMALL_FILE_FRACTION,
    DEFAULT_SMALL_FILE_THRESHOLD,
};

use crate::policy::RetryPolicy;

/// Engine configuration.
///
/// `download_retry` decides how long a peer stays unavailable after a MISSING
/// or timeout; `upload_retry` decides how often a failed read is retried before
/// the requester is told the data is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    pub chunk_size: u32,
    pub max_parallel_chunks: usize,
    pub max_parallel_per_file: usize,
    pub max_parallel_per_peer: usize,
    pub request_timeout: Duration,
    pub download_retry: RetryPolicy,
    pub upload_retry: RetryPolicy,
    /// Files at or below this many bytes get the small-file bonus.
    pub small_file_threshold: u64,
    /// Share of `max_parallel_chunks` reserved for small files.
    pub small_file_fraction: f64,
}

impl TransferOptions {
    /// Number of in-flight chunks small files may claim with a bonus.
    #[must_use]
    pub fn small_file_channels(&self) -> usize {
        let channels = (self.max_parallel_chunks as f64 * self.small_file_fraction).ceil();
        if channels <= 0.0 { 0 } else { channels as usize }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_parallel_chunks: DEFAULT_MAX_PARALLEL_CHUNKS,
            max_parallel_per_file: DEFAULT_MAX_PARALLEL_PER_FILE,
            max_parallel_per_peer: DEFAULT_MAX_PARALLEL_PER_PEER,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            download_retry: RetryPolicy::exponential(
                Some(3),
                Duration::from_secs(1),
                1.5,
                Duration::from_secs(10),
            ),
            upload_retry: RetryPolicy::constant(Some(5), Duration::from_secs(2)),
            small_file_threshold: DEFAULT_SMALL_FILE_THRESHOLD,
            small_file_fraction: DEFAULT_SMALL_FILE_FRACTION,
        }
    }
}
