//! Download orchestration.
//!
//! [`DownloadManager`] owns every active [`FileRequest`], the known peers, and
//! the GETs in flight. After each event it runs the scheduling loop: the
//! algorithm is asked for one chunk at a time, and each pick is sent and marked
//! Pending before the next question, until the algorithm declines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};

use crate::algorithm::{DownloadAlgorithm, DownloadStatus, GreedyScheduler, ScheduledChunk};
use crate::availability::Availability;
use crate::chunk::{ChunkRequest, ChunkState};
use crate::context::{ChunkWriter, DownloadContext};
use crate::error::TransferError;
use crate::file_request::FileRequest;
use crate::options::TransferOptions;

/// Observable outcome of a download step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Progress {
        file: FileDescriptor,
        bytes_received: u64,
    },
    Completed {
        file: FileDescriptor,
        path: PathBuf,
    },
    /// Reserved; the manager does not give up on downloads by itself.
    Failed { file: FileDescriptor },
}

/// Borrowed view of the manager's state, handed to the algorithm.
struct StatusView<'a> {
    downloads: &'a BTreeMap<FileDescriptor, FileRequest>,
    peers: &'a [PeerId],
    pending: &'a [ChunkRequest],
    now: Instant,
}

impl DownloadStatus for StatusView<'_> {
    fn files(&self) -> Vec<&FileDescriptor> {
        self.downloads.keys().collect()
    }

    fn peers(&self) -> &[PeerId] {
        self.peers
    }

    fn pending_requests(&self) -> &[ChunkRequest] {
        self.pending
    }

    fn availability(&self, file: &FileDescriptor, peer: PeerId) -> Availability {
        self.downloads
            .get(file)
            .map_or(Availability::AvailabilityExpired, |r| r.availability(peer, self.now))
    }

    fn progress(&self, file: &FileDescriptor) -> f64 {
        self.downloads.get(file).map_or(0.0, FileRequest::progress)
    }

    fn waiting_chunks(&self, file: &FileDescriptor, count: usize) -> Vec<u32> {
        self.downloads
            .get(file)
            .map(|r| r.waiting_chunks(count))
            .unwrap_or_default()
    }

    fn has_waiting_chunks(&self, file: &FileDescriptor) -> bool {
        self.downloads
            .get(file)
            .is_some_and(FileRequest::has_waiting_chunks)
    }
}

/// Drives all active downloads of one participant.
pub struct DownloadManager<W, A = GreedyScheduler> {
    options: TransferOptions,
    writer: W,
    algorithm: A,
    downloads: BTreeMap<FileDescriptor, FileRequest>,
    peers: Vec<PeerId>,
    pending: Vec<ChunkRequest>,
}

impl<W: ChunkWriter> DownloadManager<W> {
    pub fn new(options: TransferOptions, writer: W) -> Self {
        let algorithm = GreedyScheduler::new(&options);
        Self::with_algorithm(options, writer, algorithm)
    }
}

impl<W: ChunkWriter, A: DownloadAlgorithm> DownloadManager<W, A> {
    pub fn with_algorithm(options: TransferOptions, writer: W, algorithm: A) -> Self {
        Self {
            options,
            writer,
            algorithm,
            downloads: BTreeMap::new(),
            peers: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    // --- Queries ---

    /// Active downloads in scheduling order.
    pub fn files(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.downloads.keys()
    }

    pub fn peers(&self) -> &[PeerId] {
        &self.peers
    }

    pub fn pending_requests(&self) -> &[ChunkRequest] {
        &self.pending
    }

    #[must_use]
    pub fn is_active(&self, file: &FileDescriptor) -> bool {
        self.downloads.contains_key(file)
    }

    /// Received fraction of `file`, or `None` if it is not being downloaded.
    #[must_use]
    pub fn progress(&self, file: &FileDescriptor) -> Option<f64> {
        self.downloads.get(file).map(FileRequest::progress)
    }

    #[must_use]
    pub fn availability(
        &self,
        file: &FileDescriptor,
        peer: PeerId,
        now: Instant,
    ) -> Option<Availability> {
        self.downloads.get(file).map(|r| r.availability(peer, now))
    }

    pub fn file_request(&self, file: &FileDescriptor) -> Option<&FileRequest> {
        self.downloads.get(file)
    }

    /// The state view the scheduling algorithm sees at `now`.
    pub fn status(&self, now: Instant) -> impl DownloadStatus + '_ {
        StatusView {
            downloads: &self.downloads,
            peers: &self.peers,
            pending: &self.pending,
            now,
        }
    }

    // --- Membership ---

    pub fn add_peer(&mut self, peer: PeerId, now: Instant, ctx: &mut impl DownloadContext) {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
            tracing::debug!(peer = %peer, peers = self.peers.len(), "download: peer added");
        }
        self.schedule(now, ctx);
    }

    /// Forget `peer`, returning its in-flight chunks to Waiting.
    pub fn remove_peer(&mut self, peer: PeerId, now: Instant, ctx: &mut impl DownloadContext) {
        self.peers.retain(|p| *p != peer);
        for request in self.downloads.values_mut() {
            request.remove_peer(peer);
        }

        let (dropped, kept): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|r| r.peer() == peer);
        self.pending = kept;
        for request in &dropped {
            let Some(download) = self.downloads.get_mut(request.file()) else {
                continue;
            };
            if let Err(err) = download.release_chunk(request.chunk().index) {
                tracing::warn!(file = %request.file(), error = %err, "download: failed to release chunk");
            }
        }
        tracing::debug!(peer = %peer, released = dropped.len(), "download: peer removed");
        self.schedule(now, ctx);
    }

    // --- Local API ---

    /// Start downloading `file` into `path`.
    ///
    /// Any other download with the same file id is cancelled first, so a
    /// descriptor with a corrected size or hash replaces its predecessor. An
    /// empty file completes immediately.
    pub fn request(
        &mut self,
        file: FileDescriptor,
        path: PathBuf,
        now: Instant,
        ctx: &mut impl DownloadContext,
    ) -> Result<Vec<DownloadEvent>, TransferError> {
        if self.downloads.contains_key(&file) {
            return Err(TransferError::AlreadyRequested(file));
        }

        let superseded: Vec<FileDescriptor> = self
            .downloads
            .keys()
            .filter(|f| f.id() == file.id())
            .cloned()
            .collect();
        for old in &superseded {
            self.remove_download(old);
            tracing::info!(old = %old, new = %file, "download: superseded");
        }

        let request = FileRequest::new(
            file.clone(),
            path,
            self.options.chunk_size,
            self.options.download_retry.clone(),
        );
        tracing::info!(
            file = %file,
            path = %request.path().display(),
            chunks = request.chunks().count(),
            "download: requested"
        );

        let mut events = Vec::new();
        if request.is_complete() {
            self.close(request.path());
            tracing::info!(file = %file, "download: completed");
            events.push(DownloadEvent::Completed {
                file,
                path: request.path().to_path_buf(),
            });
        } else {
            self.downloads.insert(file, request);
        }

        self.schedule(now, ctx);
        Ok(events)
    }

    /// Stop downloading `file`. Returns whether it was active.
    pub fn cancel(
        &mut self,
        file: &FileDescriptor,
        now: Instant,
        ctx: &mut impl DownloadContext,
    ) -> bool {
        let cancelled = self.remove_download(file);
        if cancelled {
            tracing::info!(file = %file, "download: cancelled");
        }
        self.schedule(now, ctx);
        cancelled
    }

    // --- Network events ---

    /// `peer` delivered `data` for `range` of `file`.
    pub fn handle_chunk(
        &mut self,
        file: &FileDescriptor,
        range: ChunkRange,
        data: &[u8],
        peer: PeerId,
        now: Instant,
        ctx: &mut impl DownloadContext,
    ) -> Result<Vec<DownloadEvent>, TransferError> {
        let result = self.receive_chunk(file, range, data, peer, now);
        self.schedule(now, ctx);
        result
    }

    /// `peer` reported `range` of `file` missing.
    pub fn handle_missing(
        &mut self,
        file: &FileDescriptor,
        range: ChunkRange,
        peer: PeerId,
        now: Instant,
        ctx: &mut impl DownloadContext,
    ) -> Result<(), TransferError> {
        let result = self.chunk_missing(file, range.index, peer, now);
        self.schedule(now, ctx);
        result
    }

    /// Expire GETs whose deadline has passed, as if each peer replied MISSING.
    pub fn handle_timer(
        &mut self,
        now: Instant,
        ctx: &mut impl DownloadContext,
    ) -> Result<(), TransferError> {
        let (expired, kept): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|r| r.is_expired(now));
        self.pending = kept;

        let mut result = Ok(());
        for request in expired {
            tracing::debug!(
                file = %request.file(),
                chunk = request.chunk().index,
                peer = %request.peer(),
                "download: request timed out"
            );
            let Some(download) = self.downloads.get_mut(request.file()) else {
                continue;
            };
            let outcome =
                download.handle_chunk_missing(request.chunk().index, request.peer(), now, true);
            if result.is_ok() {
                result = outcome;
            }
        }

        self.schedule(now, ctx);
        result
    }

    // --- Internals ---

    fn receive_chunk(
        &mut self,
        file: &FileDescriptor,
        range: ChunkRange,
        data: &[u8],
        peer: PeerId,
        now: Instant,
    ) -> Result<Vec<DownloadEvent>, TransferError> {
        let Some(download) = self.downloads.get_mut(file) else {
            tracing::debug!(file = %file, chunk = range.index, peer = %peer, "download: chunk for inactive file ignored");
            return Ok(Vec::new());
        };

        match download.chunk_state(range.index)? {
            ChunkState::Received => {
                tracing::debug!(file = %file, chunk = range.index, peer = %peer, "download: duplicate chunk ignored");
                return Ok(Vec::new());
            }
            ChunkState::Waiting => {
                return Err(TransferError::InvalidChunkTransition {
                    chunk: range.index,
                    from: ChunkState::Waiting,
                    to: ChunkState::Received,
                });
            }
            ChunkState::Pending => {}
        }

        let expected = download.chunk_range(range.index);
        if range.offset != expected.offset || range.size > expected.size {
            return Err(TransferError::ChunkRangeMismatch {
                chunk: range.index,
                expected,
                actual: range,
            });
        }

        let len = data.len().min(range.size as usize);
        if let Err(err) = self.writer.write(download.path(), expected.offset, &data[..len]) {
            tracing::warn!(file = %file, chunk = range.index, error = %err, "download: write failed");
        }
        download.handle_chunk_received(range.index, peer, now)?;
        self.pending.retain(|r| !(r.chunk().index == range.index && r.file() == file));

        let mut events = vec![DownloadEvent::Progress {
            file: file.clone(),
            bytes_received: download.bytes_received(),
        }];
        tracing::trace!(file = %file, chunk = range.index, peer = %peer, "download: chunk received");

        if download.is_complete() {
            let path = download.path().to_path_buf();
            self.remove_download(file);
            self.close(&path);
            tracing::info!(file = %file, path = %path.display(), "download: completed");
            events.push(DownloadEvent::Completed {
                file: file.clone(),
                path,
            });
        }
        Ok(events)
    }

    fn chunk_missing(
        &mut self,
        file: &FileDescriptor,
        index: u32,
        peer: PeerId,
        now: Instant,
    ) -> Result<(), TransferError> {
        let Some(download) = self.downloads.get_mut(file) else {
            tracing::debug!(file = %file, chunk = index, peer = %peer, "download: missing for inactive file ignored");
            return Ok(());
        };

        let position = self.pending.iter().position(|r| r.matches(file, index, peer));
        if position.is_none() {
            tracing::debug!(file = %file, chunk = index, peer = %peer, "download: stale missing");
        }
        download.handle_chunk_missing(index, peer, now, position.is_some())?;
        if let Some(position) = position {
            self.pending.remove(position);
        }
        Ok(())
    }

    /// Drop a download and its in-flight requests. Returns whether it existed.
    fn remove_download(&mut self, file: &FileDescriptor) -> bool {
        self.pending.retain(|r| r.file() != file);
        self.downloads.remove(file).is_some()
    }

    fn close(&mut self, path: &Path) {
        if let Err(err) = self.writer.close(path) {
            tracing::warn!(path = %path.display(), error = %err, "download: close failed");
        }
    }

    /// Issue GETs until the algorithm declines.
    fn schedule(&mut self, now: Instant, ctx: &mut impl DownloadContext) {
        loop {
            let view = StatusView {
                downloads: &self.downloads,
                peers: &self.peers,
                pending: &self.pending,
                now,
            };
            let Some(ScheduledChunk { file, chunk, peer }) = self.algorithm.step(&view) else {
                break;
            };

            let Some(download) = self.downloads.get_mut(&file) else {
                tracing::warn!(file = %file, "download: algorithm picked an inactive file");
                break;
            };
            match download.chunk_state(chunk.index) {
                Ok(ChunkState::Waiting) => {}
                state => {
                    tracing::warn!(file = %file, chunk = chunk.index, state = ?state, "download: algorithm picked a chunk that is not waiting");
                    break;
                }
            }
            if let Err(err) = download.handle_chunk_requested(chunk.index) {
                tracing::warn!(file = %file, chunk = chunk.index, error = %err, "download: failed to mark chunk pending");
                break;
            }

            ctx.send_get(&file, chunk, peer);
            self.pending.push(ChunkRequest::new(
                file,
                chunk,
                peer,
                now,
                self.options.request_timeout,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    use crate::policy::RetryPolicy;

    #[derive(Default)]
    struct RecordingWriter {
        writes: Vec<(PathBuf, u64, Vec<u8>)>,
        closes: Vec<PathBuf>,
        fail_writes: bool,
    }

    impl ChunkWriter for RecordingWriter {
        fn write(&mut self, path: &Path, offset: u64, data: &[u8]) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::other("disk full"));
            }
            self.writes.push((path.to_path_buf(), offset, data.to_vec()));
            Ok(())
        }

        fn close(&mut self, path: &Path) -> io::Result<()> {
            self.closes.push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Gets(Vec<(FileDescriptor, ChunkRange, PeerId)>);

    impl DownloadContext for Gets {
        fn send_get(&mut self, file: &FileDescriptor, chunk: ChunkRange, peer: PeerId) {
            self.0.push((file.clone(), chunk, peer));
        }
    }

    fn options() -> TransferOptions {
        TransferOptions {
            chunk_size: 10,
            max_parallel_chunks: 4,
            max_parallel_per_file: 4,
            max_parallel_per_peer: 4,
            request_timeout: Duration::from_millis(100),
            download_retry: RetryPolicy::constant(None, Duration::from_millis(50)),
            ..TransferOptions::default()
        }
    }

    fn manager() -> DownloadManager<RecordingWriter> {
        DownloadManager::new(options(), RecordingWriter::default())
    }

    fn peer(n: u128) -> PeerId {
        PeerId::from_u128(n)
    }

    #[test]
    fn test_request_without_peers_sends_nothing() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();
        assert!(ctx.0.is_empty());
        assert!(mgr.is_active(&file));
        assert_eq!(mgr.progress(&file), Some(0.0));
    }

    #[test]
    fn test_peer_join_fills_capacity() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();
        mgr.add_peer(peer(1), now, &mut ctx);

        let indices: Vec<u32> = ctx.0.iter().map(|(_, c, _)| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(mgr.pending_requests().len(), 4);
        assert_eq!(mgr.file_request(&file).unwrap().chunks().pending(), 4);
    }

    #[test]
    fn test_duplicate_request_is_rejected() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();
        let err = mgr
            .request(file.clone(), "/tmp/b".into(), now, &mut ctx)
            .unwrap_err();
        assert_eq!(err, TransferError::AlreadyRequested(file.clone()));
        assert_eq!(mgr.file_request(&file).unwrap().path(), Path::new("/tmp/a"));
    }

    #[test]
    fn test_request_with_same_id_supersedes() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let old = FileDescriptor::unhashed(1, 100);
        let new = FileDescriptor::new(1, "abcd", 120);
        mgr.request(old.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();
        mgr.request(new.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();

        assert!(!mgr.is_active(&old));
        assert!(mgr.is_active(&new));
        assert!(mgr.pending_requests().iter().all(|r| *r.file() == new));
        assert_eq!(mgr.pending_requests().len(), 4);
    }

    #[test]
    fn test_cancel_is_idempotent_and_frees_capacity() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let a = FileDescriptor::unhashed(1, 100);
        let b = FileDescriptor::unhashed(2, 100);
        mgr.request(a.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();
        mgr.request(b.clone(), "/tmp/b".into(), now, &mut ctx).unwrap();
        assert!(mgr.pending_requests().iter().all(|r| *r.file() == a));

        assert!(mgr.cancel(&a, now, &mut ctx));
        assert!(!mgr.cancel(&a, now, &mut ctx));
        assert_eq!(mgr.pending_requests().len(), 4);
        assert!(mgr.pending_requests().iter().all(|r| *r.file() == b));
    }

    #[test]
    fn test_chunk_is_written_and_clipped() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();

        let events = mgr
            .handle_chunk(&file, file.chunk_range(2, 10), &[7u8; 16], peer(1), now, &mut ctx)
            .unwrap();
        assert_eq!(
            events,
            vec![DownloadEvent::Progress {
                file: file.clone(),
                bytes_received: 10,
            }]
        );
        assert_eq!(mgr.writer().writes, vec![(PathBuf::from("/tmp/a"), 20, vec![7u8; 10])]);
        assert_eq!(mgr.availability(&file, peer(1), now), Some(Availability::Available));
        // The freed slot went to the next waiting chunk.
        assert_eq!(ctx.0.last().unwrap().1.index, 4);
    }

    #[test]
    fn test_chunk_with_foreign_layout_is_rejected() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();

        for range in [ChunkRange::new(2, 50, 10), ChunkRange::new(2, 20, 11)] {
            let err = mgr
                .handle_chunk(&file, range, &[7u8; 11], peer(1), now, &mut ctx)
                .unwrap_err();
            assert_eq!(
                err,
                TransferError::ChunkRangeMismatch {
                    chunk: 2,
                    expected: file.chunk_range(2, 10),
                    actual: range,
                }
            );
        }
        assert!(mgr.writer().writes.is_empty());
        let request = mgr.file_request(&file).unwrap();
        assert_eq!(request.chunk_state(2), Ok(ChunkState::Pending));

        // A short but well-placed reply is still accepted.
        mgr.handle_chunk(&file, ChunkRange::new(2, 20, 6), &[7u8; 6], peer(1), now, &mut ctx)
            .unwrap();
        assert_eq!(mgr.writer().writes, vec![(PathBuf::from("/tmp/a"), 20, vec![7u8; 6])]);
    }

    #[test]
    fn test_write_failure_still_marks_received() {
        let now = Instant::now();
        let mut mgr = manager();
        mgr.writer_mut().fail_writes = true;
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();

        mgr.handle_chunk(&file, file.chunk_range(0, 10), &[0u8; 10], peer(1), now, &mut ctx)
            .unwrap();
        assert_eq!(
            mgr.file_request(&file).unwrap().chunk_state(0).unwrap(),
            ChunkState::Received
        );
    }

    #[test]
    fn test_duplicate_chunk_is_ignored() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();
        let range = file.chunk_range(0, 10);

        mgr.handle_chunk(&file, range, &[1u8; 10], peer(1), now, &mut ctx).unwrap();
        let events = mgr
            .handle_chunk(&file, range, &[1u8; 10], peer(1), now, &mut ctx)
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(mgr.writer().writes.len(), 1);
    }

    #[test]
    fn test_chunk_never_requested_is_a_protocol_violation() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();

        let err = mgr
            .handle_chunk(&file, file.chunk_range(5, 10), &[0u8; 10], peer(1), now, &mut ctx)
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::InvalidChunkTransition {
                chunk: 5,
                from: ChunkState::Waiting,
                to: ChunkState::Received,
            }
        );
        assert!(mgr.writer().writes.is_empty());
    }

    #[test]
    fn test_chunk_for_unknown_file_is_ignored() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        let file = FileDescriptor::unhashed(9, 100);
        let events = mgr
            .handle_chunk(&file, file.chunk_range(0, 10), &[0u8; 10], peer(1), now, &mut ctx)
            .unwrap();
        assert!(events.is_empty());
        assert!(mgr
            .handle_missing(&file, file.chunk_range(0, 10), peer(1), now, &mut ctx)
            .is_ok());
    }

    #[test]
    fn test_missing_moves_chunk_to_other_peer() {
        let now = Instant::now();
        let mut opts = options();
        opts.max_parallel_chunks = 1;
        let mut mgr = DownloadManager::new(opts, RecordingWriter::default());
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        mgr.add_peer(peer(2), now, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();
        assert_eq!(ctx.0, vec![(file.clone(), file.chunk_range(0, 10), peer(1))]);

        mgr.handle_missing(&file, file.chunk_range(0, 10), peer(1), now, &mut ctx)
            .unwrap();
        assert_eq!(mgr.availability(&file, peer(1), now), Some(Availability::Unavailable));
        assert_eq!(ctx.0.len(), 2);
        assert_eq!(ctx.0[1], (file.clone(), file.chunk_range(0, 10), peer(2)));
    }

    #[test]
    fn test_stale_missing_only_marks_peer() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();

        mgr.handle_missing(&file, file.chunk_range(0, 10), peer(2), now, &mut ctx)
            .unwrap();
        assert_eq!(mgr.pending_requests().len(), 4);
        assert_eq!(
            mgr.file_request(&file).unwrap().chunk_state(0).unwrap(),
            ChunkState::Pending
        );
        assert_eq!(mgr.availability(&file, peer(2), now), Some(Availability::Unavailable));
    }

    #[test]
    fn test_timeout_fires_strictly_after_expiry() {
        let start = Instant::now();
        let mut opts = options();
        opts.max_parallel_chunks = 1;
        let mut mgr = DownloadManager::new(opts, RecordingWriter::default());
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), start, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), start, &mut ctx).unwrap();

        mgr.handle_timer(start + Duration::from_millis(100), &mut ctx).unwrap();
        assert_eq!(ctx.0.len(), 1);
        assert_eq!(mgr.pending_requests()[0].created(), start);

        let late = start + Duration::from_millis(101);
        mgr.handle_timer(late, &mut ctx).unwrap();
        // The only peer is now unavailable, so nothing is reissued yet.
        assert!(mgr.pending_requests().is_empty());
        assert_eq!(mgr.availability(&file, peer(1), late), Some(Availability::Unavailable));
        assert_eq!(
            mgr.file_request(&file).unwrap().chunk_state(0).unwrap(),
            ChunkState::Waiting
        );

        // Once the unavailability window passes the chunk is requested again.
        mgr.handle_timer(late + Duration::from_millis(51), &mut ctx).unwrap();
        assert_eq!(ctx.0.len(), 2);
        assert_eq!(ctx.0[1].1.index, 0);
    }

    #[test]
    fn test_removing_peer_releases_its_chunks() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();
        assert_eq!(mgr.pending_requests().len(), 4);

        mgr.remove_peer(peer(1), now, &mut ctx);
        assert!(mgr.peers().is_empty());
        assert!(mgr.pending_requests().is_empty());
        assert_eq!(mgr.file_request(&file).unwrap().chunks().waiting(), 10);

        mgr.add_peer(peer(2), now, &mut ctx);
        assert_eq!(mgr.pending_requests().len(), 4);
        assert!(mgr.pending_requests().iter().all(|r| r.peer() == peer(2)));
    }

    #[test]
    fn test_empty_file_completes_on_request() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        let file = FileDescriptor::unhashed(1, 0);
        let events = mgr.request(file.clone(), "/tmp/empty".into(), now, &mut ctx).unwrap();
        assert_eq!(
            events,
            vec![DownloadEvent::Completed {
                file: file.clone(),
                path: PathBuf::from("/tmp/empty"),
            }]
        );
        assert!(!mgr.is_active(&file));
        assert_eq!(mgr.writer().closes, vec![PathBuf::from("/tmp/empty")]);
    }

    #[test]
    fn test_status_view_reflects_state() {
        let now = Instant::now();
        let mut mgr = manager();
        let mut ctx = Gets::default();
        mgr.add_peer(peer(1), now, &mut ctx);
        let file = FileDescriptor::unhashed(1, 100);
        mgr.request(file.clone(), "/tmp/a".into(), now, &mut ctx).unwrap();

        let status = mgr.status(now);
        assert_eq!(status.files(), vec![&file]);
        assert_eq!(status.peers(), &[peer(1)]);
        assert_eq!(status.pending_requests().len(), 4);
        assert_eq!(status.waiting_chunks(&file, 2), vec![4, 5]);
        assert!(status.has_waiting_chunks(&file));
    }
}
