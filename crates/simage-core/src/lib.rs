//! simage core - distributed perceptual image hashing.
//!
//! Image loading is pipelined locally so disk I/O never stalls hashing, and
//! hashing itself is spread across workers that talk over a message broker.
//!
//! # Architecture
//!
//! ```text
//! discover → ImageProducer → HashDispatcher → [hash.request] → HashWorker
//!                                                                  │
//!        Persistence ← ResultHandler ← [hash.result] ←─────────────┘
//! ```
//!
//! The broker, the record store, and the tracking registry are reached
//! through the [`Session`], [`Persistence`] and [`TrackingRegistry`] traits.
//!
//! # Usage
//!
//! ```rust,ignore
//! use simage_core::{Config, ImageProducer, RecordStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> simage_core::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(RecordStore::open(&config.records_path())?);
//!     let producer = ImageProducer::from_config(&config, store);
//!
//!     producer.submit(["./photos/cat.jpg"]);
//!     if let Some(loaded) = producer.next().await {
//!         println!("{:?}: {}x{}", loaded.path, loaded.width, loaded.height);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod messaging;
pub mod persistence;
pub mod pipeline;
pub mod tracking;

// Re-exports for convenient access
pub use config::Config;
pub use dispatch::{
    HashDispatcher, HashRequester, HashWorker, MessageHandler, RepositoryResponder,
    ResultHandler, ResultSummary,
};
pub use error::{
    AttributeError, ConfigError, PersistenceError, PipelineError, PipelineResult, ProtocolError,
    RegistryError, Result, SessionError, SimageError,
};
pub use messaging::{ChannelSession, Message, MessageFactory, ProtocolMessage, Session};
pub use persistence::{ImageRecord, PendingHashImage, Persistence, RecordStore};
pub use pipeline::{FileDiscovery, ImageProducer, LoadedImage, Progress};
pub use tracking::{InMemoryTrackingRegistry, TrackingRegistry};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
