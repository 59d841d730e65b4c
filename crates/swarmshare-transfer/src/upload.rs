//! Serving chunks of locally shared files.
//!
//! A GET is answered immediately when the read succeeds. A failed read is
//! queued and retried from [`UploadManager::handle_timer`] with delays taken
//! from the upload [`RetryPolicy`]; once the policy gives up the requester is
//! sent MISSING. Withdrawing a file answers its queued GETs with MISSING too.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};

use crate::buffer_pool::BufferPool;
use crate::chunk::ChunkRequest;
use crate::context::{ChunkReader, UploadContext};
use crate::options::TransferOptions;
use crate::policy::RetryPolicy;

/// Answers GET requests for shared files.
pub struct UploadManager<R> {
    policy: RetryPolicy,
    reader: R,
    shared: HashMap<FileDescriptor, PathBuf>,
    pending: Vec<ChunkRequest>,
    pool: Arc<BufferPool>,
}

impl<R: ChunkReader> UploadManager<R> {
    pub fn new(options: &TransferOptions, reader: R) -> Self {
        let pool = Arc::new(BufferPool::new(
            options.chunk_size as usize,
            options.max_parallel_chunks,
        ));
        Self::with_pool(options.upload_retry.clone(), reader, pool)
    }

    /// Build a manager that rents read buffers from an existing pool.
    pub fn with_pool(policy: RetryPolicy, reader: R, pool: Arc<BufferPool>) -> Self {
        Self {
            policy,
            reader,
            shared: HashMap::new(),
            pending: Vec::new(),
            pool,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    #[must_use]
    pub fn is_shared(&self, file: &FileDescriptor) -> bool {
        self.shared.contains_key(file)
    }

    /// Queued GETs awaiting a read retry.
    pub fn pending_requests(&self) -> &[ChunkRequest] {
        &self.pending
    }

    /// Share `file` from `path`, replacing any previous path.
    pub fn add(&mut self, file: FileDescriptor, path: PathBuf) {
        tracing::info!(file = %file, path = %path.display(), "upload: sharing");
        self.shared.insert(file, path);
    }

    /// Stop sharing `file`. Queued GETs for it are answered with MISSING.
    pub fn remove(&mut self, file: &FileDescriptor, ctx: &mut impl UploadContext) -> bool {
        let removed = self.shared.remove(file).is_some();
        let (dropped, kept): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|r| r.file() == file);
        self.pending = kept;
        for request in &dropped {
            ctx.send_missing(request.file(), request.chunk(), request.peer());
        }
        if removed {
            tracing::info!(file = %file, answered = dropped.len(), "upload: unshared");
        }
        removed
    }

    /// `peer` asked for `range` of `file`.
    pub fn handle_get(
        &mut self,
        file: FileDescriptor,
        range: ChunkRange,
        peer: PeerId,
        now: Instant,
        ctx: &mut impl UploadContext,
    ) {
        let Some(path) = self.shared.get(&file) else {
            tracing::debug!(file = %file, chunk = range.index, peer = %peer, "upload: get for unshared file");
            ctx.send_missing(&file, range, peer);
            return;
        };

        let outcome = read_and_reply(&mut self.reader, &self.pool, path, &file, range, peer, ctx);
        // A fresh GET supersedes a queued one for the same chunk.
        self.pending.retain(|r| !r.matches(&file, range.index, peer));

        let Err(err) = outcome else {
            return;
        };
        match self.policy.interval(0) {
            Some(delay) => {
                tracing::debug!(file = %file, chunk = range.index, peer = %peer, error = %err, "upload: read failed, queued for retry");
                self.pending.push(ChunkRequest::new(file, range, peer, now, delay));
            }
            None => {
                tracing::debug!(file = %file, chunk = range.index, peer = %peer, error = %err, "upload: read failed, giving up");
                ctx.send_missing(&file, range, peer);
            }
        }
    }

    /// Retry every queued GET whose delay has passed.
    pub fn handle_timer(&mut self, now: Instant, ctx: &mut impl UploadContext) {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|r| r.is_expired(now));
        self.pending = waiting;

        for mut request in due {
            let Some(path) = self.shared.get(request.file()) else {
                ctx.send_missing(request.file(), request.chunk(), request.peer());
                continue;
            };
            let outcome = read_and_reply(
                &mut self.reader,
                &self.pool,
                path,
                request.file(),
                request.chunk(),
                request.peer(),
                ctx,
            );
            let Err(err) = outcome else {
                tracing::debug!(file = %request.file(), chunk = request.chunk().index, attempts = request.attempts() + 1, "upload: retry succeeded");
                continue;
            };

            match self.policy.interval(request.attempts()) {
                Some(delay) => {
                    tracing::debug!(file = %request.file(), chunk = request.chunk().index, attempts = request.attempts(), error = %err, "upload: retry failed");
                    request.add_attempt(now + delay);
                    self.pending.push(request);
                }
                None => {
                    tracing::debug!(file = %request.file(), chunk = request.chunk().index, attempts = request.attempts(), error = %err, "upload: giving up");
                    ctx.send_missing(request.file(), request.chunk(), request.peer());
                }
            }
        }
    }
}

/// Read `range` into a pooled buffer and send whatever was read.
///
/// The reply's size is the byte count actually read, which may be shorter
/// than requested near end of file. Nothing is sent on failure.
fn read_and_reply<R: ChunkReader>(
    reader: &mut R,
    pool: &Arc<BufferPool>,
    path: &Path,
    file: &FileDescriptor,
    range: ChunkRange,
    peer: PeerId,
    ctx: &mut impl UploadContext,
) -> io::Result<()> {
    // Never rent more than the file can supply past `offset`.
    let remaining = file.size().saturating_sub(range.offset);
    let len = u64::from(range.size).min(remaining) as usize;
    let mut buf = pool.acquire(len);
    let read = reader.read(path, range.offset, &mut buf)?.min(buf.len());
    // read <= range.size, so it fits
    ctx.send_chunk(file, range.with_size(read as u32), peer, &buf[..read]);
    Ok(())
}
