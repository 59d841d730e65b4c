//! End-to-end download scenarios against recording fakes.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use swarmshare_transfer::{
    ChunkRange, ChunkWriter, DownloadContext, DownloadEvent, DownloadManager, FileDescriptor,
    PeerId, RetryPolicy, TransferOptions,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum StorageCall {
    Write { offset: u64, len: usize },
    Close(PathBuf),
}

#[derive(Default)]
struct RecordingStorage {
    calls: Vec<StorageCall>,
}

impl ChunkWriter for RecordingStorage {
    fn write(&mut self, _path: &Path, offset: u64, data: &[u8]) -> io::Result<()> {
        self.calls.push(StorageCall::Write {
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn close(&mut self, path: &Path) -> io::Result<()> {
        self.calls.push(StorageCall::Close(path.to_path_buf()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTransport {
    gets: Vec<(FileDescriptor, ChunkRange, PeerId)>,
}

impl DownloadContext for RecordingTransport {
    fn send_get(&mut self, file: &FileDescriptor, chunk: ChunkRange, peer: PeerId) {
        self.gets.push((file.clone(), chunk, peer));
    }
}

fn options(max_parallel: usize) -> TransferOptions {
    TransferOptions {
        chunk_size: 10,
        max_parallel_chunks: max_parallel,
        max_parallel_per_file: max_parallel,
        max_parallel_per_peer: max_parallel,
        request_timeout: Duration::from_secs(2),
        download_retry: RetryPolicy::exponential(
            None,
            Duration::from_millis(20),
            2.0,
            Duration::from_millis(80),
        ),
        ..TransferOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn twenty_chunk_file_from_one_peer() {
    let now = Instant::now();
    let peer = PeerId::from_u128(1);
    let file = FileDescriptor::new(1, "", 200);
    let path = PathBuf::from("/downloads/file.bin");
    let mut manager = DownloadManager::new(options(20), RecordingStorage::default());
    let mut transport = RecordingTransport::default();

    manager.add_peer(peer, now, &mut transport);
    manager
        .request(file.clone(), path.clone(), now, &mut transport)
        .unwrap();
    assert_eq!(transport.gets.len(), 20);
    assert!(transport.gets.iter().all(|(f, _, p)| *f == file && *p == peer));

    let mut events = Vec::new();
    let requested: Vec<ChunkRange> = transport.gets.iter().map(|(_, c, _)| *c).collect();
    for chunk in requested {
        let data = vec![0x5a; chunk.size as usize];
        events.extend(
            manager
                .handle_chunk(&file, chunk, &data, peer, now, &mut transport)
                .unwrap(),
        );
    }

    let calls = &manager.writer().calls;
    assert_eq!(calls.len(), 21);
    assert_eq!(calls[19], StorageCall::Write { offset: 190, len: 10 });
    assert_eq!(calls[20], StorageCall::Close(path.clone()));

    let completions: Vec<&DownloadEvent> = events
        .iter()
        .filter(|e| matches!(e, DownloadEvent::Completed { .. }))
        .collect();
    assert_eq!(
        completions,
        vec![&DownloadEvent::Completed {
            file: file.clone(),
            path,
        }]
    );
    assert_eq!(
        events.iter().rev().nth(1),
        Some(&DownloadEvent::Progress {
            file: file.clone(),
            bytes_received: 200,
        })
    );

    assert!(manager.pending_requests().is_empty());
    assert_eq!(manager.files().count(), 0);
    assert_eq!(transport.gets.len(), 20);
}

#[test]
fn last_chunk_is_requested_clipped() {
    let now = Instant::now();
    let peer = PeerId::from_u128(1);
    let file = FileDescriptor::new(2, "", 25);
    let mut manager = DownloadManager::new(options(10), RecordingStorage::default());
    let mut transport = RecordingTransport::default();

    manager.add_peer(peer, now, &mut transport);
    manager
        .request(file.clone(), "/downloads/small".into(), now, &mut transport)
        .unwrap();
    let ranges: Vec<ChunkRange> = transport.gets.iter().map(|(_, c, _)| *c).collect();
    assert_eq!(
        ranges,
        vec![
            ChunkRange::new(0, 0, 10),
            ChunkRange::new(1, 10, 10),
            ChunkRange::new(2, 20, 5),
        ]
    );
}

#[test]
fn bounded_parallelism_refills_as_chunks_arrive() {
    let now = Instant::now();
    let peer = PeerId::from_u128(1);
    let file = FileDescriptor::new(3, "", 200);
    let mut manager = DownloadManager::new(options(3), RecordingStorage::default());
    let mut transport = RecordingTransport::default();

    manager.add_peer(peer, now, &mut transport);
    manager
        .request(file.clone(), "/downloads/f".into(), now, &mut transport)
        .unwrap();
    assert_eq!(transport.gets.len(), 3);

    let mut completed = 0;
    while let Some(request) = manager.pending_requests().first().cloned() {
        assert!(manager.pending_requests().len() <= 3);
        let data = vec![0u8; request.chunk().size as usize];
        let events = manager
            .handle_chunk(&file, request.chunk(), &data, peer, now, &mut transport)
            .unwrap();
        completed += events
            .iter()
            .filter(|e| matches!(e, DownloadEvent::Completed { .. }))
            .count();
    }
    assert_eq!(completed, 1);
    assert_eq!(transport.gets.len(), 20);
}

#[test]
fn unresponsive_peer_is_backed_off_and_others_take_over() {
    let start = Instant::now();
    let slow = PeerId::from_u128(1);
    let fast = PeerId::from_u128(2);
    let file = FileDescriptor::new(4, "", 40);
    let mut manager = DownloadManager::new(options(2), RecordingStorage::default());
    let mut transport = RecordingTransport::default();

    manager.add_peer(slow, start, &mut transport);
    manager
        .request(file.clone(), "/downloads/g".into(), start, &mut transport)
        .unwrap();
    assert_eq!(transport.gets.len(), 2);
    manager.add_peer(fast, start, &mut transport);

    let later = start + Duration::from_millis(2_001);
    manager.handle_timer(later, &mut transport).unwrap();
    let reissued: Vec<_> = transport.gets[2..].iter().map(|(_, c, p)| (c.index, *p)).collect();
    assert_eq!(reissued, vec![(0, fast), (1, fast)]);
}
