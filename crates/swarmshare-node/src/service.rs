//! The file-sharing service task.
//!
//! One tokio task owns a [`DownloadManager`] and an [`UploadManager`]. Every
//! input (membership changes, network messages, local API calls, and the
//! periodic tick) arrives through a single queue or the tick interval and is
//! handled to completion before the next, so the engine never sees concurrent
//! calls. Outbound messages and download events leave through unbounded
//! channels and never block the task.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use swarmshare_core::{ChunkRange, FileDescriptor, PeerId};
use swarmshare_transfer::{
    ChunkReader, ChunkWriter, DownloadContext, DownloadEvent, DownloadManager, TransferError,
    UploadContext, UploadManager,
};

use crate::config::NodeConfig;
use crate::error::NodeError;

pub type Result<T> = std::result::Result<T, NodeError>;

/// A message for the transport to deliver to `peer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Get {
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
    },
    Chunk {
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
        data: Vec<u8>,
    },
    Missing {
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
    },
}

/// Snapshot of the service state.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    pub downloads: Vec<FileDescriptor>,
    pub peers: Vec<PeerId>,
    pub pending_gets: usize,
    pub queued_uploads: usize,
}

#[derive(Debug)]
enum Command {
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    Get {
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
    },
    Chunk {
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
        data: Vec<u8>,
    },
    Missing {
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
    },
    Request {
        file: FileDescriptor,
        path: PathBuf,
        reply: oneshot::Sender<std::result::Result<(), TransferError>>,
    },
    Cancel {
        file: FileDescriptor,
        reply: oneshot::Sender<bool>,
    },
    Share {
        file: FileDescriptor,
        path: PathBuf,
        reply: oneshot::Sender<()>,
    },
    Unshare {
        file: FileDescriptor,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<ServiceStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle for feeding the service.
///
/// Network-facing methods only enqueue; local API methods wait for the
/// service's answer.
#[derive(Clone, Debug)]
pub struct FileShareHandle {
    tx: mpsc::Sender<Command>,
}

impl FileShareHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| NodeError::ChannelClosed)
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.map_err(|_| NodeError::ChannelClosed)
    }

    pub async fn peer_joined(&self, peer: PeerId) -> Result<()> {
        self.send(Command::PeerJoined(peer)).await
    }

    pub async fn peer_left(&self, peer: PeerId) -> Result<()> {
        self.send(Command::PeerLeft(peer)).await
    }

    /// `peer` asked for `chunk` of `file`.
    pub async fn deliver_get(
        &self,
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
    ) -> Result<()> {
        self.send(Command::Get { file, chunk, peer }).await
    }

    /// `peer` sent `data` for `chunk` of `file`.
    pub async fn deliver_chunk(
        &self,
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
        data: Vec<u8>,
    ) -> Result<()> {
        self.send(Command::Chunk {
            file,
            chunk,
            peer,
            data,
        })
        .await
    }

    /// `peer` reported `chunk` of `file` missing.
    pub async fn deliver_missing(
        &self,
        file: FileDescriptor,
        chunk: ChunkRange,
        peer: PeerId,
    ) -> Result<()> {
        self.send(Command::Missing { file, chunk, peer }).await
    }

    /// Start downloading `file` into `path`.
    pub async fn request(&self, file: FileDescriptor, path: PathBuf) -> Result<()> {
        self.call(|reply| Command::Request { file, path, reply })
            .await?
            .map_err(NodeError::from)
    }

    /// Stop downloading `file`. Returns whether it was active.
    pub async fn cancel(&self, file: FileDescriptor) -> Result<bool> {
        self.call(|reply| Command::Cancel { file, reply }).await
    }

    /// Serve `file` from `path`.
    pub async fn share(&self, file: FileDescriptor, path: PathBuf) -> Result<()> {
        self.call(|reply| Command::Share { file, path, reply }).await
    }

    /// Stop serving `file`. Returns whether it was shared.
    pub async fn unshare(&self, file: FileDescriptor) -> Result<bool> {
        self.call(|reply| Command::Unshare { file, reply }).await
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        self.call(|reply| Command::Status { reply }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Command::Shutdown { reply }).await
    }
}

/// Transport capability backed by the outbound channel.
struct ChannelContext {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelContext {
    fn emit(&self, message: OutboundMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("service: outbound receiver dropped, message discarded");
        }
    }
}

impl DownloadContext for ChannelContext {
    fn send_get(&mut self, file: &FileDescriptor, chunk: ChunkRange, peer: PeerId) {
        self.emit(OutboundMessage::Get {
            file: file.clone(),
            chunk,
            peer,
        });
    }
}

impl UploadContext for ChannelContext {
    fn send_chunk(&mut self, file: &FileDescriptor, chunk: ChunkRange, peer: PeerId, data: &[u8]) {
        self.emit(OutboundMessage::Chunk {
            file: file.clone(),
            chunk,
            peer,
            data: data.to_vec(),
        });
    }

    fn send_missing(&mut self, file: &FileDescriptor, chunk: ChunkRange, peer: PeerId) {
        self.emit(OutboundMessage::Missing {
            file: file.clone(),
            chunk,
            peer,
        });
    }
}

/// Current time on the tokio clock, so paused-time tests drive the engine too.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Spawn the service task.
///
/// `store` is cloned once for the download side and once for the upload side.
/// Must be called from within a tokio runtime.
///
/// # Note
/// The store is called synchronously from the service task, so a blocking
/// store such as [`FsChunkStore`](crate::storage::FsChunkStore) occupies that
/// task's worker thread for the duration of each chunk read or write.
pub fn start_service<S>(
    config: &NodeConfig,
    store: S,
) -> Result<(
    FileShareHandle,
    mpsc::UnboundedReceiver<OutboundMessage>,
    mpsc::UnboundedReceiver<DownloadEvent>,
    JoinHandle<Result<()>>,
)>
where
    S: ChunkWriter + ChunkReader + Clone + Send + 'static,
{
    let options = config.transfer_options()?;
    let tick = config.service.tick_interval()?;
    if config.service.command_buffer == 0 {
        return Err(NodeError::Config("service.command_buffer must be non-zero".into()));
    }

    let (tx, rx) = mpsc::channel(config.service.command_buffer);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let service = Service {
        uploads: UploadManager::new(&options, store.clone()),
        downloads: DownloadManager::new(options, store),
        ctx: ChannelContext { tx: outbound_tx },
        events: events_tx,
    };
    let join = tokio::spawn(service.run(rx, tick));
    Ok((FileShareHandle { tx }, outbound_rx, events_rx, join))
}

/// Signal shutdown and wait for the task to finish.
pub async fn stop_service(handle: &FileShareHandle, join: JoinHandle<Result<()>>) -> Result<()> {
    handle.shutdown().await?;
    join.await?
}

struct Service<S> {
    downloads: DownloadManager<S>,
    uploads: UploadManager<S>,
    ctx: ChannelContext,
    events: mpsc::UnboundedSender<DownloadEvent>,
}

impl<S: ChunkWriter + ChunkReader> Service<S> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, tick: Duration) -> Result<()> {
        let mut interval = tokio::time::interval(tick);
        // Don't fire immediately
        interval.tick().await;

        tracing::info!(tick_ms = tick.as_millis() as u64, "service: entering event loop");

        loop {
            tokio::select! {
                biased;

                command = rx.recv() => {
                    let Some(command) = command else {
                        tracing::info!("service: command channel closed, exiting");
                        break;
                    };
                    if self.handle_command(command).is_break() {
                        tracing::info!("service: shutdown requested");
                        break;
                    }
                }

                _ = interval.tick() => {
                    self.handle_tick();
                }
            }
        }
        Ok(())
    }

    fn handle_tick(&mut self) {
        let now = now();
        if let Err(err) = self.downloads.handle_timer(now, &mut self.ctx) {
            tracing::warn!(error = %err, "service: timeout handling failed");
        }
        self.uploads.handle_timer(now, &mut self.ctx);
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        let now = now();
        match command {
            Command::PeerJoined(peer) => {
                tracing::info!(peer = %peer, "service: peer joined");
                self.downloads.add_peer(peer, now, &mut self.ctx);
            }
            Command::PeerLeft(peer) => {
                tracing::info!(peer = %peer, "service: peer left");
                self.downloads.remove_peer(peer, now, &mut self.ctx);
            }
            Command::Get { file, chunk, peer } => {
                self.uploads.handle_get(file, chunk, peer, now, &mut self.ctx);
            }
            Command::Chunk {
                file,
                chunk,
                peer,
                data,
            } => {
                match self
                    .downloads
                    .handle_chunk(&file, chunk, &data, peer, now, &mut self.ctx)
                {
                    Ok(events) => self.publish(events),
                    Err(err) => {
                        tracing::warn!(file = %file, chunk = %chunk, peer = %peer, error = %err, "service: rejected chunk");
                    }
                }
            }
            Command::Missing { file, chunk, peer } => {
                if let Err(err) = self
                    .downloads
                    .handle_missing(&file, chunk, peer, now, &mut self.ctx)
                {
                    tracing::warn!(file = %file, chunk = %chunk, peer = %peer, error = %err, "service: rejected missing");
                }
            }
            Command::Request { file, path, reply } => {
                let result = self
                    .downloads
                    .request(file, path, now, &mut self.ctx)
                    .map(|events| self.publish(events));
                let _ = reply.send(result);
            }
            Command::Cancel { file, reply } => {
                let _ = reply.send(self.downloads.cancel(&file, now, &mut self.ctx));
            }
            Command::Share { file, path, reply } => {
                self.uploads.add(file, path);
                let _ = reply.send(());
            }
            Command::Unshare { file, reply } => {
                let _ = reply.send(self.uploads.remove(&file, &mut self.ctx));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn publish(&self, events: Vec<DownloadEvent>) {
        for event in events {
            if self.events.send(event).is_err() {
                tracing::debug!("service: event receiver dropped");
            }
        }
    }

    fn status(&self) -> ServiceStatus {
        ServiceStatus {
            downloads: self.downloads.files().cloned().collect(),
            peers: self.downloads.peers().to_vec(),
            pending_gets: self.downloads.pending_requests().len(),
            queued_uploads: self.uploads.pending_requests().len(),
        }
    }
}
