//! Per-file chunk state tracking.
//!
//! [`ChunkMap`] records whether each chunk of one file is waiting to be
//! requested, pending (requested without reply), or received. Legal moves are
//! `Waiting -> Pending`, `Pending -> Received`, and `Pending -> Waiting`;
//! Received is terminal. The map does not know which peer owns a pending
//! chunk; that is the download manager's concern.

use crate::error::TransferError;

/// Progress state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkState {
    Waiting,
    Pending,
    Received,
}

/// State of every chunk of one file, with O(1) counters.
#[derive(Debug, Clone)]
pub struct ChunkMap {
    states: Vec<ChunkState>,
    pending: u32,
    received: u32,
    /// Every chunk before this index has been received. Only ever advances.
    skip: u32,
}

impl ChunkMap {
    /// Create a map of `count` chunks, all Waiting.
    pub fn new(count: u32) -> Self {
        Self {
            states: vec![ChunkState::Waiting; count as usize],
            pending: 0,
            received: 0,
            skip: 0,
        }
    }

    /// Total number of chunks.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.states.len() as u32
    }

    #[must_use]
    pub fn pending(&self) -> u32 {
        self.pending
    }

    #[must_use]
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Chunks that are neither pending nor received.
    #[must_use]
    pub fn waiting(&self) -> u32 {
        self.count() - self.pending - self.received
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received == self.count()
    }

    /// Received fraction in `[0, 1]`. An empty file counts as complete.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.states.is_empty() {
            return 1.0;
        }
        f64::from(self.received) / f64::from(self.count())
    }

    /// Current state of chunk `index`.
    pub fn get(&self, index: u32) -> Result<ChunkState, TransferError> {
        self.states
            .get(index as usize)
            .copied()
            .ok_or(TransferError::ChunkOutOfRange {
                chunk: index,
                count: self.count(),
            })
    }

    /// Move chunk `index` to `state`.
    ///
    /// Re-applying the current state is a no-op. Leaving Received, or jumping
    /// from Waiting straight to Received, fails with
    /// [`TransferError::InvalidChunkTransition`] and leaves the map untouched.
    pub fn set(&mut self, index: u32, state: ChunkState) -> Result<(), TransferError> {
        let current = self.get(index)?;
        match (current, state) {
            (from, to) if from == to => return Ok(()),
            (ChunkState::Waiting, ChunkState::Pending) => {
                self.pending += 1;
            }
            (ChunkState::Pending, ChunkState::Waiting) => {
                self.pending -= 1;
            }
            (ChunkState::Pending, ChunkState::Received) => {
                self.pending -= 1;
                self.received += 1;
            }
            (from, to) => {
                return Err(TransferError::InvalidChunkTransition {
                    chunk: index,
                    from,
                    to,
                });
            }
        }
        self.states[index as usize] = state;
        if state == ChunkState::Received {
            self.advance_skip();
        }
        tracing::trace!(chunk = index, from = ?current, to = ?state, "chunk state changed");
        Ok(())
    }

    /// Up to `count` lowest chunk indices that are currently Waiting.
    ///
    /// The scan starts at the first non-received chunk, so callers that only
    /// need the head of the file pay for the received prefix once.
    pub fn find_waiting(&self, count: usize) -> impl Iterator<Item = u32> + '_ {
        let start = self.skip as usize;
        self.states[start..]
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == ChunkState::Waiting)
            .map(move |(offset, _)| (start + offset) as u32)
            .take(count)
    }

    fn advance_skip(&mut self) {
        while (self.skip as usize) < self.states.len()
            && self.states[self.skip as usize] == ChunkState::Received
        {
            self.skip += 1;
        }
    }
}
