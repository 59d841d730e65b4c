//! Chunk-level bookkeeping: per-file progress maps and in-flight requests.

pub mod map;
pub mod request;

pub use map::{ChunkMap, ChunkState};
pub use request::ChunkRequest;
