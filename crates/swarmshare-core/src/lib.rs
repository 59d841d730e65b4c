//! Core value types for the swarmshare file-transfer engine.
//!
//! This crate defines the identifiers and ranges shared by every layer:
//! peers, file descriptors, and chunk ranges. It performs no I/O.

pub mod constants;
pub mod types;

pub use types::{ChunkRange, FileDescriptor, InvalidLength, PeerId};
