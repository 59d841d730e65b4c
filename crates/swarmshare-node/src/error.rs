//! Error types for the node service.

use swarmshare_transfer::TransferError;

/// Errors that can occur while configuring or talking to the service.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("service channel closed")]
    ChannelClosed,
    #[error("service task failed: {0}")]
    ServiceJoin(#[from] tokio::task::JoinError),
}
