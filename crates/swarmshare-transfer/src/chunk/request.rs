//! In-flight chunk requests.
//!
//! The same record serves both halves of the protocol: the download side
//! tracks GETs it sent and waits for their reply, the upload side tracks GETs
//! it received but could not serve yet.

use std::time::{Duration, Instant};

use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};

/// A GET for one chunk of one file, exchanged with one peer.
///
/// Identity for de-duplication is `(file, chunk.index, peer)`.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    file: FileDescriptor,
    chunk: ChunkRange,
    peer: PeerId,
    created: Instant,
    attempts: u32,
    expires: Instant,
}

impl ChunkRequest {
    /// A first attempt created at `now`, expiring after `expiry`.
    pub fn new(
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
        now: Instant,
        expiry: Duration,
    ) -> Self {
        Self {
            file,
            chunk,
            peer,
            created: now,
            attempts: 1,
            expires: now + expiry,
        }
    }

    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    pub fn chunk(&self) -> ChunkRange {
        self.chunk
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// Number of attempts made so far, starting at 1.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Moment at which the latest attempt is considered failed.
    pub fn expires(&self) -> Instant {
        self.expires
    }

    /// Whether the latest attempt's deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires
    }

    /// Whether this request is for `(file, index, peer)`.
    #[must_use]
    pub fn matches(&self, file: &FileDescriptor, index: u32, peer: PeerId) -> bool {
        self.chunk.index == index && self.peer == peer && self.file == *file
    }

    /// Same identity as `other`.
    #[must_use]
    pub fn same_target(&self, other: &ChunkRequest) -> bool {
        self.matches(&other.file, other.chunk.index, other.peer)
    }

    /// Record another attempt whose deadline is `expires`.
    pub fn add_attempt(&mut self, expires: Instant) {
        self.attempts += 1;
        self.expires = expires;
    }
}
