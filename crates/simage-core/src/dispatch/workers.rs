//! Worker-side handlers: hashing resized images and resizing full images.

use async_trait::async_trait;
use std::sync::Arc;

use super::dispatcher::HashRequester;
use super::{unexpected, MessageHandler};
use crate::error::Result;
use crate::messaging::{Body, Message, MessageFactory, ProtocolMessage, Session};
use crate::pipeline::{resize_for_hashing, Hasher};

/// Answers hash requests with hash results.
pub struct HashWorker {
    session: Arc<dyn Session>,
    result_address: String,
    hasher: Arc<Hasher>,
}

impl HashWorker {
    pub fn new(session: Arc<dyn Session>, result_address: impl Into<String>) -> Self {
        Self {
            session,
            result_address: result_address.into(),
            hasher: Arc::new(Hasher::new()),
        }
    }
}

#[async_trait]
impl MessageHandler for HashWorker {
    async fn handle(&self, message: Message) -> Result<()> {
        let (tracking_id, image) = match MessageFactory::decode(message)? {
            ProtocolMessage::HashRequest { tracking_id, image } => (tracking_id, image),
            other => return Err(unexpected("hash-request", &other).into()),
        };

        let hasher = Arc::clone(&self.hasher);
        let hashed = tokio::task::spawn_blocking(move || hasher.hash_encoded(&image)).await;

        match hashed {
            Ok(Ok(hash)) => {
                tracing::debug!("Hashed {} as {:016x}", tracking_id, hash);
                self.session
                    .send(
                        &self.result_address,
                        MessageFactory::hash_result(hash, tracking_id),
                    )
                    .await?;
            }
            // The request carries no path, so there is nobody to report a
            // corrupt image to. The path stays pending.
            Ok(Err(e)) => tracing::warn!("Tracking id {} is not a decodable image: {}", tracking_id, e),
            Err(e) => tracing::error!("Hash task for {} failed: {}", tracking_id, e),
        }
        Ok(())
    }
}

/// Turns resize requests into hash requests, or into corrupt reports when
/// the image cannot be decoded.
pub struct ResizeWorker {
    requester: HashRequester,
    session: Arc<dyn Session>,
    result_address: String,
    dimension: u32,
}

impl ResizeWorker {
    pub fn new(
        requester: HashRequester,
        session: Arc<dyn Session>,
        result_address: impl Into<String>,
        dimension: u32,
    ) -> Self {
        Self {
            requester,
            session,
            result_address: result_address.into(),
            dimension,
        }
    }
}

fn resize_body(body: Body, dimension: u32) -> std::result::Result<Vec<u8>, String> {
    let bytes = body.into_bytes().map_err(|e| e.to_string())?;
    let image = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;
    resize_for_hashing(&image, dimension).map_err(|e| e.to_string())
}

#[async_trait]
impl MessageHandler for ResizeWorker {
    async fn handle(&self, message: Message) -> Result<()> {
        let (path, body) = match MessageFactory::decode(message)? {
            ProtocolMessage::ResizeRequest { path, image } => (path, image),
            other => return Err(unexpected("resize-request", &other).into()),
        };

        let dimension = self.dimension;
        let resized = tokio::task::spawn_blocking(move || resize_body(body, dimension))
            .await
            .unwrap_or_else(|e| Err(format!("Task join error: {}", e)));

        match resized {
            Ok(resized) => {
                self.requester.request(&path, resized).await?;
            }
            Err(reason) => {
                tracing::warn!("Reporting {:?} as corrupt: {}", path, reason);
                self.session
                    .send(&self.result_address, MessageFactory::corrupt_report(&path))
                    .await?;
            }
        }
        Ok(())
    }
}
