//! Message handlers that move work between the loader, the hash workers,
//! and the repository.
//!
//! - **dispatcher**: turns loaded images into hash requests
//! - **workers**: hash and resize workers
//! - **results**: records hash results and corrupt reports
//! - **repository**: answers pending and tracking queries
//! - **attributes**: hashes stored in extended file attributes
//!
//! Every handler consumes one broker address. [`serve`] runs a handler
//! against a [`Consumer`] until its address is unbound.

pub mod attributes;
pub mod dispatcher;
pub mod repository;
pub mod results;
pub mod workers;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::{ProtocolError, Result};
use crate::messaging::{Consumer, Message, ProtocolMessage};

pub use attributes::{AttributeUpdateHandler, ExtendedAttributeHandler, HashAttribute};
pub use dispatcher::{HashDispatcher, HashRequester};
pub use repository::RepositoryResponder;
pub use results::{ResultHandler, ResultStats, ResultSummary};
pub use workers::{HashWorker, ResizeWorker};

/// Handles messages received on one address.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<()>;
}

/// Feed every message from `consumer` to `handler`.
///
/// A failed message is logged and dropped; the loop keeps going. Returns the
/// number of messages received once the address is unbound and drained.
pub async fn serve(consumer: Consumer, handler: Arc<dyn MessageHandler>) -> u64 {
    let mut received = 0u64;
    while let Some(message) = consumer.receive().await {
        received += 1;
        if let Err(e) = handler.handle(message).await {
            tracing::warn!("Dropped message on '{}': {}", consumer.address(), e);
        }
    }
    tracing::debug!(
        "Stopped serving '{}' after {} messages",
        consumer.address(),
        received
    );
    received
}

/// Run [`serve`] on its own task.
pub fn spawn(consumer: Consumer, handler: Arc<dyn MessageHandler>) -> JoinHandle<u64> {
    tokio::spawn(serve(consumer, handler))
}

fn unexpected(expected: &'static str, actual: &ProtocolMessage) -> ProtocolError {
    ProtocolError::UnexpectedKind {
        expected,
        actual: actual.kind().as_str(),
    }
}
