//! Chunk scheduling.
//!
//! The download manager exposes its state through [`DownloadStatus`] and asks a
//! [`DownloadAlgorithm`] for one chunk at a time until it declines.

mod greedy;

pub use greedy::GreedyScheduler;

use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};

use crate::availability::Availability;
use crate::chunk::ChunkRequest;

/// Read-only view of the download state consumed by a scheduler.
pub trait DownloadStatus {
    /// Active downloads, in a stable order.
    fn files(&self) -> Vec<&FileDescriptor>;

    /// Known peers, in a stable order.
    fn peers(&self) -> &[PeerId];

    /// GETs sent and not yet answered.
    fn pending_requests(&self) -> &[ChunkRequest];

    /// Availability of `file` at `peer` as of the view's timestamp.
    fn availability(&self, file: &FileDescriptor, peer: PeerId) -> Availability;

    /// Received fraction of `file` in `[0, 1]`.
    fn progress(&self, file: &FileDescriptor) -> f64;

    /// Up to `count` lowest waiting chunk indices of `file`.
    fn waiting_chunks(&self, file: &FileDescriptor, count: usize) -> Vec<u32>;

    fn has_waiting_chunks(&self, file: &FileDescriptor) -> bool;
}

/// One chunk chosen for request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledChunk {
    pub file: FileDescriptor,
    pub chunk: ChunkRange,
    pub peer: PeerId,
}

/// Picks the next chunk to request, or `None` when nothing is eligible.
pub trait DownloadAlgorithm {
    fn step(&mut self, status: &dyn DownloadStatus) -> Option<ScheduledChunk>;
}
