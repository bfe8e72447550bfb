//! Answering repository queries.

use async_trait::async_trait;
use std::sync::Arc;

use super::{unexpected, MessageHandler};
use crate::error::Result;
use crate::messaging::{Message, MessageFactory, ProtocolMessage, Session};
use crate::persistence::Persistence;
use crate::tracking::TrackingRegistry;

/// Answers pending and track queries.
///
/// Queries carry no reply-to, so every answer goes to one fixed address.
pub struct RepositoryResponder {
    persistence: Arc<dyn Persistence>,
    registry: Arc<dyn TrackingRegistry>,
    session: Arc<dyn Session>,
    reply_address: String,
}

impl RepositoryResponder {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        registry: Arc<dyn TrackingRegistry>,
        session: Arc<dyn Session>,
        reply_address: impl Into<String>,
    ) -> Self {
        Self {
            persistence,
            registry,
            session,
            reply_address: reply_address.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for RepositoryResponder {
    async fn handle(&self, message: Message) -> Result<()> {
        let reply = match MessageFactory::decode(message)? {
            ProtocolMessage::PendingQuery => {
                let pending = self.persistence.pending_images().await?;
                tracing::debug!("Answering pending query with {} paths", pending.len());
                MessageFactory::pending_response(&pending)?
            }
            ProtocolMessage::TrackQuery { path } => {
                let tracking_id = self.registry.assign(&path);
                tracing::debug!("Tracking {:?} as {} on request", path, tracking_id);
                MessageFactory::track_response(tracking_id)
            }
            other => return Err(unexpected("pending-query or track-query", &other).into()),
        };

        self.session.send(&self.reply_address, reply).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{ChannelSession, ReplyKind};
    use crate::persistence::{PendingHashImage, RecordStore};
    use crate::tracking::InMemoryTrackingRegistry;
    use std::path::{Path, PathBuf};

    fn responder(
        session: &Arc<ChannelSession>,
        store: Arc<RecordStore>,
        registry: Arc<InMemoryTrackingRegistry>,
    ) -> RepositoryResponder {
        RepositoryResponder::new(store, registry, session.clone(), "repository.reply")
    }

    #[tokio::test]
    async fn test_pending_query_lists_pending_paths() {
        let session = Arc::new(ChannelSession::new());
        let replies = session.bind("repository.reply");
        let store = Arc::new(RecordStore::in_memory());
        for path in ["/b.png", "/a.png"] {
            store.add_pending(PendingHashImage::new(path)).await.unwrap();
        }

        responder(&session, store, Arc::new(InMemoryTrackingRegistry::new()))
            .handle(MessageFactory::pending_query())
            .await
            .unwrap();

        let reply = replies.try_receive().unwrap();
        assert!(!reply.is_durable());
        assert_eq!(
            MessageFactory::decode_reply(reply, ReplyKind::Pending).unwrap(),
            ProtocolMessage::PendingResponse {
                paths: vec!["/b.png".to_string(), "/a.png".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_track_query_assigns_id() {
        let session = Arc::new(ChannelSession::new());
        let replies = session.bind("repository.reply");
        let registry = Arc::new(InMemoryTrackingRegistry::new());

        responder(&session, Arc::new(RecordStore::in_memory()), registry.clone())
            .handle(MessageFactory::track_query(Path::new("/a/b.jpg")))
            .await
            .unwrap();

        match MessageFactory::decode_reply(replies.try_receive().unwrap(), ReplyKind::Track).unwrap() {
            ProtocolMessage::TrackResponse { tracking_id } => {
                assert_eq!(registry.resolve(tracking_id).unwrap(), PathBuf::from("/a/b.jpg"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tasks_are_not_answered() {
        let session = Arc::new(ChannelSession::new());
        let replies = session.bind("repository.reply");
        let result = responder(
            &session,
            Arc::new(RecordStore::in_memory()),
            Arc::new(InMemoryTrackingRegistry::new()),
        )
        .handle(MessageFactory::hash_result(1, 2))
        .await;

        assert!(result.is_err());
        assert!(replies.try_receive().is_none());
    }
}
