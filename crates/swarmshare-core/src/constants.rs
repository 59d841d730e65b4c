//! Default tuning values for chunked transfers.
//!
//! Deployments override these through configuration; the engine itself only
//! reads them when building default options.

/// Default chunk size in bytes (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;

/// Default maximum number of chunk requests in flight across all files and peers.
pub const DEFAULT_MAX_PARALLEL_CHUNKS: usize = 10;

/// Default maximum number of chunk requests in flight for a single file.
pub const DEFAULT_MAX_PARALLEL_PER_FILE: usize = 5;

/// Default maximum number of chunk requests in flight to a single peer.
pub const DEFAULT_MAX_PARALLEL_PER_PEER: usize = 5;

/// Default time (milliseconds) after which an unanswered GET is abandoned.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2_000;

/// Files up to this many bytes count as "small" for scheduling purposes (5 MiB).
pub const DEFAULT_SMALL_FILE_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Fraction of `max_parallel_chunks` reserved as bonus channels for small files.
pub const DEFAULT_SMALL_FILE_FRACTION: f64 = 0.25;

/// Length of a peer identifier in bytes.
pub const PEER_ID_LEN: usize = 16;
