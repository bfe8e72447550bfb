//! Recording hash results and corrupt reports.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::{unexpected, MessageHandler};
use crate::error::Result;
use crate::messaging::{Message, MessageFactory, ProtocolMessage, Session};
use crate::persistence::{ImageRecord, Persistence};
use crate::tracking::TrackingRegistry;

/// Counts of what the result handler has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultSummary {
    pub recorded: u64,
    pub corrupt: u64,
    pub failed: u64,
}

impl ResultSummary {
    /// Results that have been dealt with one way or another.
    pub fn settled(&self) -> u64 {
        self.recorded + self.corrupt + self.failed
    }
}

/// Shared, observable result counters.
pub struct ResultStats {
    recorded: AtomicU64,
    corrupt: AtomicU64,
    failed: AtomicU64,
    settled: watch::Sender<u64>,
}

impl Default for ResultStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStats {
    pub fn new() -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            recorded: AtomicU64::new(0),
            corrupt: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            settled,
        }
    }

    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            recorded: self.recorded.load(Ordering::Acquire),
            corrupt: self.corrupt.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }

    /// Watch the number of settled results.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.settled.subscribe()
    }

    fn bump(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::AcqRel);
        self.settled.send_modify(|n| *n += 1);
    }
}

/// Consumes hash results and corrupt reports.
///
/// A result is resolved to its path, recorded, and its tracking id released.
/// With an attribute address set, an attribute update is sent as well so the
/// hash also ends up on the file itself.
pub struct ResultHandler {
    registry: Arc<dyn TrackingRegistry>,
    persistence: Arc<dyn Persistence>,
    session: Arc<dyn Session>,
    attribute_address: Option<String>,
    stats: Arc<ResultStats>,
}

impl ResultHandler {
    pub fn new(
        registry: Arc<dyn TrackingRegistry>,
        persistence: Arc<dyn Persistence>,
        session: Arc<dyn Session>,
    ) -> Self {
        Self {
            registry,
            persistence,
            session,
            attribute_address: None,
            stats: Arc::new(ResultStats::new()),
        }
    }

    /// Also send an attribute update to `address` for every recorded hash.
    pub fn with_attribute_updates(mut self, address: impl Into<String>) -> Self {
        self.attribute_address = Some(address.into());
        self
    }

    pub fn stats(&self) -> Arc<ResultStats> {
        Arc::clone(&self.stats)
    }

    async fn record(&self, tracking_id: i32, hash: u64) -> Result<()> {
        let path = self.registry.resolve(tracking_id)?;
        let stored = self
            .persistence
            .add_record(ImageRecord::new(&path, hash))
            .await;
        // The id is never resolved again, whether or not the record landed.
        self.registry.release(tracking_id)?;
        stored?;
        tracing::debug!("Recorded {:?} with hash {:016x}", path, hash);

        // Recorded either way; the attribute is only a cache.
        if let Some(address) = &self.attribute_address {
            let update = MessageFactory::attribute_update(&path, hash);
            if let Err(e) = self.session.send(address, update).await {
                tracing::warn!("Failed to send attribute update for {:?}: {}", path, e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for ResultHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        match MessageFactory::decode(message) {
            Ok(ProtocolMessage::HashResult { tracking_id, hash }) => {
                let outcome = self.record(tracking_id, hash).await;
                match &outcome {
                    Ok(()) => self.stats.bump(&self.stats.recorded),
                    Err(_) => self.stats.bump(&self.stats.failed),
                }
                outcome
            }
            Ok(ProtocolMessage::CorruptReport { path }) => {
                tracing::warn!("Corrupt image: {:?}", path);
                self.stats.bump(&self.stats.corrupt);
                Ok(())
            }
            Ok(other) => Err(unexpected("hash-result or corrupt-report", &other).into()),
            Err(e) => Err(e.into()),
        }
    }
}
