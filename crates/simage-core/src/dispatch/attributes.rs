//! Hashes stored in a file's extended attributes.
//!
//! A file that already carries a valid hash attribute does not need to be
//! hashed again; its hash can be recorded straight away.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{unexpected, MessageHandler};
use crate::error::{AttributeError, PipelineError, Result};
use crate::messaging::{Message, MessageFactory, ProtocolMessage};
use crate::persistence::{ImageRecord, Persistence};

/// Access to the hash kept in a file's extended attributes.
pub trait HashAttribute: Send + Sync {
    /// Whether `path` carries a hash attribute that is still current.
    fn are_attributes_valid(&self, path: &Path) -> bool;

    fn read_hash(&self, path: &Path) -> std::result::Result<u64, AttributeError>;

    fn write_hash(&self, path: &Path, hash: u64) -> std::result::Result<(), AttributeError>;
}

/// Records hashes found in extended attributes.
pub struct ExtendedAttributeHandler {
    attributes: Arc<dyn HashAttribute>,
    persistence: Arc<dyn Persistence>,
}

impl ExtendedAttributeHandler {
    pub fn new(attributes: Arc<dyn HashAttribute>, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            attributes,
            persistence,
        }
    }

    /// Record the stored hash of `path`.
    ///
    /// Returns `true` only if a valid hash was read and recorded; in every
    /// other case the file still needs hashing.
    pub async fn handle(&self, path: &Path) -> bool {
        if !self.attributes.are_attributes_valid(path) {
            return false;
        }

        let hash = match self.attributes.read_hash(path) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!("{}", e);
                return false;
            }
        };

        match self.persistence.add_record(ImageRecord::new(path, hash)).await {
            Ok(()) => {
                tracing::debug!("Recorded {:?} from extended attributes", path);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to record attribute hash for {:?}: {}", path, e);
                false
            }
        }
    }
}

/// Writes hashes from attribute updates onto the files.
pub struct AttributeUpdateHandler {
    attributes: Arc<dyn HashAttribute>,
}

impl AttributeUpdateHandler {
    pub fn new(attributes: Arc<dyn HashAttribute>) -> Self {
        Self { attributes }
    }
}

#[async_trait]
impl MessageHandler for AttributeUpdateHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        let (path, hash) = match MessageFactory::decode(message)? {
            ProtocolMessage::AttributeUpdate { path, hash } => (path, hash),
            other => return Err(unexpected("attribute-update", &other).into()),
        };

        let attributes = Arc::clone(&self.attributes);
        let target: PathBuf = path.clone();
        tokio::task::spawn_blocking(move || attributes.write_hash(&target, hash))
            .await
            .map_err(|e| PipelineError::Io {
                path: path.clone(),
                source: std::io::Error::other(e),
            })??;

        tracing::debug!("Wrote hash attribute to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use crate::persistence::{PendingHashImage, RecordStore};
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Stored {
        Missing,
        Hash(u64),
        Unreadable,
        Invalid,
    }

    /// Attribute store with one canned answer for every file.
    struct StubAttributes {
        stored: Stored,
        written: Mutex<HashMap<PathBuf, u64>>,
    }

    impl StubAttributes {
        fn new(stored: Stored) -> Arc<Self> {
            Arc::new(Self {
                stored,
                written: Mutex::new(HashMap::new()),
            })
        }
    }

    impl HashAttribute for StubAttributes {
        fn are_attributes_valid(&self, _path: &Path) -> bool {
            !matches!(self.stored, Stored::Missing)
        }

        fn read_hash(&self, path: &Path) -> std::result::Result<u64, AttributeError> {
            match self.stored {
                Stored::Hash(hash) => Ok(hash),
                Stored::Missing | Stored::Unreadable => Err(AttributeError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other("read failed"),
                }),
                Stored::Invalid => Err(AttributeError::InvalidValue {
                    path: path.to_path_buf(),
                    message: "not a hash".to_string(),
                }),
            }
        }

        fn write_hash(&self, path: &Path, hash: u64) -> std::result::Result<(), AttributeError> {
            self.written.lock().unwrap().insert(path.to_path_buf(), hash);
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl Persistence for FailingStore {
        async fn is_path_recorded(&self, _path: &Path) -> std::result::Result<bool, PersistenceError> {
            Ok(false)
        }

        async fn add_record(&self, _record: ImageRecord) -> std::result::Result<(), PersistenceError> {
            Err(PersistenceError::new("disk full"))
        }

        async fn add_pending(&self, _image: PendingHashImage) -> std::result::Result<(), PersistenceError> {
            Ok(())
        }

        async fn pending_images(&self) -> std::result::Result<Vec<PendingHashImage>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_file_with_hash_is_recorded() {
        let store = Arc::new(RecordStore::in_memory());
        let handler = ExtendedAttributeHandler::new(StubAttributes::new(Stored::Hash(5)), store.clone());

        assert!(handler.handle(Path::new("foo")).await);
        assert_eq!(store.hash_of(Path::new("foo")), Some(5));
    }

    #[tokio::test]
    async fn test_file_without_hash() {
        let store = Arc::new(RecordStore::in_memory());
        let handler = ExtendedAttributeHandler::new(StubAttributes::new(Stored::Missing), store.clone());

        assert!(!handler.handle(Path::new("foo")).await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_record_error() {
        let handler =
            ExtendedAttributeHandler::new(StubAttributes::new(Stored::Hash(5)), Arc::new(FailingStore));
        assert!(!handler.handle(Path::new("foo")).await);
    }

    #[tokio::test]
    async fn test_read_error() {
        let handler = ExtendedAttributeHandler::new(
            StubAttributes::new(Stored::Unreadable),
            Arc::new(RecordStore::in_memory()),
        );
        assert!(!handler.handle(Path::new("foo")).await);
    }

    #[tokio::test]
    async fn test_invalid_attribute_value() {
        let handler = ExtendedAttributeHandler::new(
            StubAttributes::new(Stored::Invalid),
            Arc::new(RecordStore::in_memory()),
        );
        assert!(!handler.handle(Path::new("foo")).await);
    }

    #[tokio::test]
    async fn test_update_writes_attribute() {
        let attributes = StubAttributes::new(Stored::Missing);
        let handler = AttributeUpdateHandler::new(attributes.clone());

        handler
            .handle(MessageFactory::attribute_update(Path::new("/a.png"), 12))
            .await
            .unwrap();

        assert_eq!(
            attributes.written.lock().unwrap().get(Path::new("/a.png")),
            Some(&12)
        );
    }
}
