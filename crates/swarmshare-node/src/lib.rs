//! Runtime wiring for the swarmshare transfer engine.
//!
//! This crate provides configuration, logging setup, filesystem storage, and
//! the tokio service task that serializes network and local events into one
//! engine instance.

pub mod config;
pub mod error;
pub mod logging;
pub mod service;
pub mod storage;

pub use config::NodeConfig;
pub use error::NodeError;
pub use service::{FileShareHandle, OutboundMessage, ServiceStatus, start_service, stop_service};
pub use storage::FsChunkStore;
