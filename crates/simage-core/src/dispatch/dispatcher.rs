//! Sending hash requests for images the loader has decoded.

use std::path::Path;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::messaging::{MessageFactory, Session};
use crate::persistence::{PendingHashImage, Persistence};
use crate::pipeline::{resize_for_hashing, ImageProducer, LoadedImage};
use crate::tracking::TrackingRegistry;

/// Issues hash requests: assigns a tracking id, marks the path pending, and
/// sends the request.
#[derive(Clone)]
pub struct HashRequester {
    session: Arc<dyn Session>,
    registry: Arc<dyn TrackingRegistry>,
    persistence: Arc<dyn Persistence>,
    request_address: String,
}

impl HashRequester {
    pub fn new(
        session: Arc<dyn Session>,
        registry: Arc<dyn TrackingRegistry>,
        persistence: Arc<dyn Persistence>,
        request_address: impl Into<String>,
    ) -> Self {
        Self {
            session,
            registry,
            persistence,
            request_address: request_address.into(),
        }
    }

    /// Request a hash of `resized` on behalf of `path`. Returns the tracking id.
    ///
    /// The path is marked pending before an id is assigned, so a failed
    /// store never holds an id. If sending fails the id is released again and
    /// the path stays pending.
    pub async fn request(&self, path: &Path, resized: Vec<u8>) -> Result<i32> {
        self.persistence
            .add_pending(PendingHashImage::new(path))
            .await?;
        let tracking_id = self.registry.assign(path);

        let message = MessageFactory::hash_request(resized, tracking_id);
        if let Err(e) = self.session.send(&self.request_address, message).await {
            let _ = self.registry.release(tracking_id);
            return Err(e.into());
        }

        tracing::debug!("Requested hash for {:?} as {}", path, tracking_id);
        Ok(tracking_id)
    }
}

/// Drains an [`ImageProducer`], resizing each image and requesting its hash.
pub struct HashDispatcher {
    requester: HashRequester,
    dimension: u32,
}

impl HashDispatcher {
    pub fn new(requester: HashRequester, dimension: u32) -> Self {
        Self {
            requester,
            dimension,
        }
    }

    /// Resize one loaded image and request its hash.
    pub async fn dispatch(&self, loaded: LoadedImage) -> Result<i32> {
        let LoadedImage { path, image, .. } = loaded;
        let dimension = self.dimension;

        let resized = tokio::task::spawn_blocking(move || resize_for_hashing(&image, dimension))
            .await
            .map_err(|e| PipelineError::Decode {
                path: path.clone(),
                message: format!("Task join error: {}", e),
            })?
            .map_err(|e| PipelineError::Decode {
                path: path.clone(),
                message: format!("Resize failed: {}", e),
            })?;

        self.requester.request(&path, resized).await
    }

    /// Dispatch everything the producer emits until it is shut down and drained.
    ///
    /// Returns the number of hash requests sent.
    pub async fn run(&self, producer: &ImageProducer) -> u64 {
        let mut sent = 0u64;
        while let Some(loaded) = producer.next().await {
            let path = loaded.path.clone();
            match self.dispatch(loaded).await {
                Ok(_) => sent += 1,
                Err(e) => tracing::warn!("Failed to dispatch {:?}: {}", path, e),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use crate::messaging::{ChannelSession, ProtocolMessage};
    use crate::persistence::{ImageRecord, RecordStore};
    use async_trait::async_trait;
    use crate::tracking::InMemoryTrackingRegistry;
    use image::{DynamicImage, GenericImageView, RgbImage};
    use std::path::PathBuf;

    fn loaded(path: &str) -> LoadedImage {
        LoadedImage {
            path: PathBuf::from(path),
            image: DynamicImage::ImageRgb8(RgbImage::new(40, 20)),
            width: 40,
            height: 20,
        }
    }

    #[tokio::test]
    async fn test_dispatch_sends_resized_request() {
        let session = Arc::new(ChannelSession::new());
        let requests = session.bind("hash.request");
        let registry = Arc::new(InMemoryTrackingRegistry::new());
        let store = Arc::new(RecordStore::in_memory());

        let dispatcher = HashDispatcher::new(
            HashRequester::new(session, registry.clone(), store.clone(), "hash.request"),
            16,
        );
        let id = dispatcher.dispatch(loaded("/pics/a.png")).await.unwrap();

        assert_eq!(registry.resolve(id).unwrap(), PathBuf::from("/pics/a.png"));
        assert_eq!(
            store.pending_images().await.unwrap(),
            vec![PendingHashImage::new("/pics/a.png")]
        );

        let message = requests.try_receive().unwrap();
        assert!(message.is_durable());
        match MessageFactory::decode(message).unwrap() {
            ProtocolMessage::HashRequest { tracking_id, image } => {
                assert_eq!(tracking_id, id);
                let decoded = image::load_from_memory(&image).unwrap();
                assert_eq!(decoded.dimensions(), (16, 16));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_failure_releases_id() {
        let session = Arc::new(ChannelSession::new());
        let registry = Arc::new(InMemoryTrackingRegistry::new());
        let requester = HashRequester::new(
            session,
            registry.clone(),
            Arc::new(RecordStore::in_memory()),
            "nobody.listens",
        );

        let result = requester.request(Path::new("/a.png"), vec![1, 2, 3]).await;
        assert!(result.is_err());
        assert_eq!(registry.in_flight(), 0);
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl Persistence for ReadOnlyStore {
        async fn is_path_recorded(&self, _path: &Path) -> std::result::Result<bool, PersistenceError> {
            Ok(false)
        }

        async fn add_record(&self, _record: ImageRecord) -> std::result::Result<(), PersistenceError> {
            Err(PersistenceError::new("read-only file system"))
        }

        async fn add_pending(&self, _image: PendingHashImage) -> std::result::Result<(), PersistenceError> {
            Err(PersistenceError::new("read-only file system"))
        }

        async fn pending_images(&self) -> std::result::Result<Vec<PendingHashImage>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_holds_no_id() {
        let session = Arc::new(ChannelSession::new());
        let requests = session.bind("hash.request");
        let registry = Arc::new(InMemoryTrackingRegistry::new());
        let requester =
            HashRequester::new(session, registry.clone(), Arc::new(ReadOnlyStore), "hash.request");

        for name in ["/a.png", "/b.png", "/c.png"] {
            let err = requester.request(Path::new(name), vec![1]).await.err().unwrap();
            assert!(matches!(err, crate::error::SimageError::Persistence(_)));
        }

        assert_eq!(registry.in_flight(), 0);
        assert!(requests.try_receive().is_none());
    }
}
