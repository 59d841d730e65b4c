//! Transfer scheduling and retry engine.
//!
//! This crate implements the decision logic between peer membership, the
//! wire transport, and file storage: per-chunk progress tracking, decaying
//! per-peer availability, the greedy chunk scheduler, and the download and
//! upload managers. It is synchronous and performs no I/O of its own; every
//! time-dependent call takes the current [`Instant`](std::time::Instant).

pub mod algorithm;
pub mod availability;
pub mod buffer_pool;
pub mod chunk;
pub mod context;
pub mod download;
pub mod error;
pub mod file_request;
pub mod options;
pub mod policy;
pub mod upload;

pub use algorithm::{DownloadAlgorithm, DownloadStatus, GreedyScheduler, ScheduledChunk};
pub use availability::{Availability, AvailabilityMap};
pub use buffer_pool::{BufferPool, PooledBuffer};
pub use chunk::{ChunkMap, ChunkRequest, ChunkState};
pub use context::{ChunkReader, ChunkWriter, DownloadContext, UploadContext};
pub use download::{DownloadEvent, DownloadManager};
pub use error::TransferError;
pub use file_request::FileRequest;
pub use options::TransferOptions;
pub use policy::RetryPolicy;
pub use upload::UploadManager;

pub use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};
