//! Transfer engine error types.
//!
//! Only programmer-error-class conditions surface here. Transient I/O
//! failures, expired availability, and timed-out requests are absorbed by the
//! managers' state machines and never reach the caller.

use swarmshare_core::{ChunkRange, FileDescriptor};

use crate::chunk::ChunkState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("invalid transition for chunk {chunk}: {from:?} -> {to:?}")]
    InvalidChunkTransition {
        chunk: u32,
        from: ChunkState,
        to: ChunkState,
    },

    #[error("chunk {chunk} out of range (file has {count} chunks)")]
    ChunkOutOfRange { chunk: u32, count: u32 },

    /// A delivered chunk whose offset or size disagrees with the file's layout.
    #[error("chunk {chunk} delivered as {actual}, expected {expected}")]
    ChunkRangeMismatch {
        chunk: u32,
        expected: ChunkRange,
        actual: ChunkRange,
    },

    #[error("file {0} has already been requested")]
    AlreadyRequested(FileDescriptor),
}
