//! Capabilities the engine calls back into.
//!
//! The managers never touch the network or the disk directly. Transport is
//! reached through [`DownloadContext`] and [`UploadContext`], which are passed
//! per call so the caller keeps ownership of its outbound queue. Storage is
//! owned by the managers as a [`ChunkWriter`] or [`ChunkReader`].

use std::io;
use std::path::Path;

use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};

/// Outbound messages produced while downloading.
pub trait DownloadContext {
    /// Ask `peer` for `chunk` of `file`. Fire-and-forget.
    fn send_get(&mut self, file: &FileDescriptor, chunk: ChunkRange, peer: PeerId);
}

/// Outbound messages produced while serving uploads.
pub trait UploadContext {
    /// Deliver `data` for `chunk` of `file` to `peer`. `chunk.size == data.len()`.
    fn send_chunk(&mut self, file: &FileDescriptor, chunk: ChunkRange, peer: PeerId, data: &[u8]);

    /// Tell `peer` that `chunk` of `file` cannot be served.
    fn send_missing(&mut self, file: &FileDescriptor, chunk: ChunkRange, peer: PeerId);
}

/// Destination for downloaded bytes.
pub trait ChunkWriter {
    fn write(&mut self, path: &Path, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Called once after the last chunk of the file at `path` was written.
    fn close(&mut self, path: &Path) -> io::Result<()>;
}

/// Source of bytes for shared files.
pub trait ChunkReader {
    /// Read up to `buf.len()` bytes at `offset`, returning how many were read.
    fn read(&mut self, path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}
