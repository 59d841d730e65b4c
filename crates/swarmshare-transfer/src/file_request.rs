//! State of one active download.

use std::path::{Path, PathBuf};
use std::time::Instant;

use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};

use crate::availability::{Availability, AvailabilityMap};
use crate::chunk::{ChunkMap, ChunkState};
use crate::error::TransferError;
use crate::policy::RetryPolicy;

/// Chunk progress and peer availability for a file being downloaded.
///
/// Peer reputation lives here rather than on the manager so that it is
/// dropped together with the download.
#[derive(Debug, Clone)]
pub struct FileRequest {
    file: FileDescriptor,
    path: PathBuf,
    chunk_size: u32,
    chunks: ChunkMap,
    availability: AvailabilityMap,
}

impl FileRequest {
    pub fn new(file: FileDescriptor, path: PathBuf, chunk_size: u32, policy: RetryPolicy) -> Self {
        let chunks = ChunkMap::new(file.chunk_count(chunk_size));
        Self {
            file,
            path,
            chunk_size,
            chunks,
            availability: AvailabilityMap::new(policy),
        }
    }

    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn chunks(&self) -> &ChunkMap {
        &self.chunks
    }

    pub fn chunk_range(&self, index: u32) -> ChunkRange {
        self.file.chunk_range(index, self.chunk_size)
    }

    pub fn chunk_state(&self, index: u32) -> Result<ChunkState, TransferError> {
        self.chunks.get(index)
    }

    #[must_use]
    pub fn availability(&self, peer: PeerId, now: Instant) -> Availability {
        self.availability.get(peer, now)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.chunks.is_complete()
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        self.chunks.progress()
    }

    /// Bytes written so far, counted in whole chunks and capped at the file size.
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        (u64::from(self.chunks.received()) * u64::from(self.chunk_size)).min(self.file.size())
    }

    /// Up to `count` lowest waiting chunk indices.
    pub fn waiting_chunks(&self, count: usize) -> Vec<u32> {
        self.chunks.find_waiting(count).collect()
    }

    #[must_use]
    pub fn has_waiting_chunks(&self) -> bool {
        self.chunks.waiting() > 0
    }

    /// A GET for chunk `index` was sent.
    pub fn handle_chunk_requested(&mut self, index: u32) -> Result<(), TransferError> {
        self.chunks.set(index, ChunkState::Pending)
    }

    /// Chunk `index` arrived from `peer`.
    pub fn handle_chunk_received(
        &mut self,
        index: u32,
        peer: PeerId,
        now: Instant,
    ) -> Result<(), TransferError> {
        self.chunks.set(index, ChunkState::Received)?;
        self.availability.set(peer, true, now);
        Ok(())
    }

    /// `peer` could not deliver chunk `index`, by MISSING reply or timeout.
    ///
    /// With `release` the chunk goes back to Waiting; without it only the
    /// peer's availability changes.
    pub fn handle_chunk_missing(
        &mut self,
        index: u32,
        peer: PeerId,
        now: Instant,
        release: bool,
    ) -> Result<(), TransferError> {
        self.availability.set(peer, false, now);
        if release {
            self.chunks.set(index, ChunkState::Waiting)?;
        }
        Ok(())
    }

    /// Pending chunk `index` was abandoned without blaming its peer.
    pub fn release_chunk(&mut self, index: u32) -> Result<(), TransferError> {
        self.chunks.set(index, ChunkState::Waiting)
    }

    pub fn remove_peer(&mut self, peer: PeerId) {
        self.availability.remove(peer);
    }
}
