//! Weighted greedy scheduler.
//!
//! Every `(file, peer)` pair with waiting chunks that passes admission control
//! is scored, and the lowest waiting chunk of the best pair is returned. The
//! score is a weighted sum of four terms:
//!
//! | term | value |
//! |---|---|
//! | small file | 1 while small-file bonus channels remain, else 0 |
//! | almost finished | progress of the file |
//! | hard to find | 1 - mean availability score of the file over all peers |
//! | availability | score of this peer for this file |
//!
//! Availability scores rank an expired record above a confirmed one so that
//! load spreads to peers worth retrying.

use std::collections::HashMap;

use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};

use super::{DownloadAlgorithm, DownloadStatus, ScheduledChunk};
use crate::availability::Availability;
use crate::options::TransferOptions;

const SMALL_FILE_WEIGHT: f64 = 10.0;
const ALMOST_FINISHED_WEIGHT: f64 = 1.0;
const HARD_TO_FIND_WEIGHT: f64 = 2.0;
const AVAILABILITY_WEIGHT: f64 = 1.0;

fn availability_score(availability: Availability) -> f64 {
    match availability {
        Availability::Available => 0.5,
        Availability::AvailabilityExpired => 1.0,
        Availability::Unavailable => 0.0,
    }
}

/// Counts of in-flight requests, gathered once per step.
#[derive(Default)]
struct PendingCounts<'a> {
    total: usize,
    small: usize,
    per_file: HashMap<&'a FileDescriptor, usize>,
    per_peer: HashMap<PeerId, usize>,
}

impl<'a> PendingCounts<'a> {
    fn collect(status: &'a dyn DownloadStatus, small_file_threshold: u64) -> Self {
        let mut counts = Self::default();
        for request in status.pending_requests() {
            counts.total += 1;
            if request.file().size() <= small_file_threshold {
                counts.small += 1;
            }
            *counts.per_file.entry(request.file()).or_default() += 1;
            *counts.per_peer.entry(request.peer()).or_default() += 1;
        }
        counts
    }

    fn for_file(&self, file: &FileDescriptor) -> usize {
        self.per_file.get(file).copied().unwrap_or(0)
    }

    fn for_peer(&self, peer: PeerId) -> usize {
        self.per_peer.get(&peer).copied().unwrap_or(0)
    }
}

/// The default [`DownloadAlgorithm`].
#[derive(Debug, Clone)]
pub struct GreedyScheduler {
    max_parallel_chunks: usize,
    max_parallel_per_file: usize,
    max_parallel_per_peer: usize,
    chunk_size: u32,
    small_file_threshold: u64,
    small_file_channels: usize,
}

impl GreedyScheduler {
    pub fn new(options: &TransferOptions) -> Self {
        Self {
            max_parallel_chunks: options.max_parallel_chunks,
            max_parallel_per_file: options.max_parallel_per_file,
            max_parallel_per_peer: options.max_parallel_per_peer,
            chunk_size: options.chunk_size,
            small_file_threshold: options.small_file_threshold,
            small_file_channels: options.small_file_channels(),
        }
    }

    fn file_score(
        &self,
        status: &dyn DownloadStatus,
        file: &FileDescriptor,
        small_pending: usize,
    ) -> f64 {
        let small = if file.size() <= self.small_file_threshold
            && small_pending < self.small_file_channels
        {
            1.0
        } else {
            0.0
        };

        let peers = status.peers();
        let mean_availability = if peers.is_empty() {
            0.0
        } else {
            peers
                .iter()
                .map(|peer| availability_score(status.availability(file, *peer)))
                .sum::<f64>()
                / peers.len() as f64
        };

        SMALL_FILE_WEIGHT * small
            + ALMOST_FINISHED_WEIGHT * status.progress(file)
            + HARD_TO_FIND_WEIGHT * (1.0 - mean_availability)
    }
}

impl DownloadAlgorithm for GreedyScheduler {
    fn step(&mut self, status: &dyn DownloadStatus) -> Option<ScheduledChunk> {
        let pending = PendingCounts::collect(status, self.small_file_threshold);
        if pending.total >= self.max_parallel_chunks {
            return None;
        }

        let mut best: Option<(f64, &FileDescriptor, PeerId)> = None;
        for file in status.files() {
            if pending.for_file(file) >= self.max_parallel_per_file
                || !status.has_waiting_chunks(file)
            {
                continue;
            }
            let file_score = self.file_score(status, file, pending.small);

            for &peer in status.peers() {
                if pending.for_peer(peer) >= self.max_parallel_per_peer {
                    continue;
                }
                let availability = status.availability(file, peer);
                if availability == Availability::Unavailable {
                    continue;
                }
                let score = file_score + AVAILABILITY_WEIGHT * availability_score(availability);
                if best.is_none_or(|(best_score, _, _)| score > best_score) {
                    best = Some((score, file, peer));
                }
            }
        }

        let (score, file, peer) = best?;
        let index = status.waiting_chunks(file, 1).first().copied()?;
        let chunk = ChunkRange::from_index(index, self.chunk_size, file.size());
        tracing::trace!(file = %file, chunk = index, peer = %peer, score, "scheduler: picked chunk");
        Some(ScheduledChunk {
            file: file.clone(),
            chunk,
            peer,
        })
    }
}
