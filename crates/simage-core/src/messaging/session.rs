//! Broker session abstraction and an in-process implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::message::{Body, Message};
use crate::error::SessionError;

/// Sends messages to named broker addresses.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (handlers hold an `Arc<dyn Session>`).
#[async_trait]
pub trait Session: Send + Sync {
    /// Deliver `message` to the queue bound at `address`.
    async fn send(&self, address: &str, message: Message) -> Result<(), SessionError>;
}

/// In-process broker: one unbounded FIFO queue per bound address.
///
/// Several [`Consumer`]s of the same address compete for messages, the way
/// several workers share one broker queue.
#[derive(Default)]
pub struct ChannelSession {
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
}

/// Receiving end of an address bound on a [`ChannelSession`].
#[derive(Clone)]
pub struct Consumer {
    address: Arc<str>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>>,
}

impl ChannelSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a queue to `address`, replacing any queue bound there before.
    pub fn bind(&self, address: &str) -> Consumer {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_queues().insert(address.to_string(), tx);
        tracing::debug!("Bound queue at '{}'", address);
        Consumer {
            address: Arc::from(address),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Drop the queue at `address`; consumers drain what is left and then see `None`.
    pub fn unbind(&self, address: &str) {
        self.lock_queues().remove(address);
    }

    fn lock_queues(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<Message>>> {
        // A poisoned map is still structurally valid.
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Session for ChannelSession {
    async fn send(&self, address: &str, mut message: Message) -> Result<(), SessionError> {
        let sender = self
            .lock_queues()
            .get(address)
            .cloned()
            .ok_or_else(|| SessionError::UnknownAddress(address.to_string()))?;

        // The broker reads streamed bodies on delivery.
        let streamed = matches!(message.body(), Body::Stream(_));
        if streamed {
            let body = message.take_body();
            let bytes = tokio::task::spawn_blocking(move || body.into_bytes())
                .await
                .map_err(|e| SessionError::StreamBody(std::io::Error::other(e)))?
                .map_err(SessionError::StreamBody)?;
            message.set_body(Body::Bytes(bytes));
        }

        sender
            .send(message)
            .map_err(|_| SessionError::Closed(address.to_string()))
    }
}

impl Consumer {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait for the next message. Returns `None` once the address is unbound
    /// and its queue is drained.
    pub async fn receive(&self) -> Option<Message> {
        self.receiver.lock().await.recv().await
    }

    /// Take a message if one is already queued.
    pub fn try_receive(&self) -> Option<Message> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MessageFactory;
    use std::io::Cursor;
    use std::path::Path;

    #[tokio::test]
    async fn test_send_to_bound_address() {
        let session = ChannelSession::new();
        let consumer = session.bind("q");

        session.send("q", MessageFactory::pending_query()).await.unwrap();
        let message = consumer.receive().await.unwrap();
        assert_eq!(message.string_property("repository_query").unwrap(), "pending");
    }

    #[tokio::test]
    async fn test_send_to_unknown_address_fails() {
        let session = ChannelSession::new();
        let err = session
            .send("nowhere", MessageFactory::pending_query())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownAddress(a) if a == "nowhere"));
    }

    #[tokio::test]
    async fn test_stream_body_is_materialized_on_send() {
        let session = ChannelSession::new();
        let consumer = session.bind("resize");

        let message = MessageFactory::resize_request(Path::new("/a.jpg"), Cursor::new(vec![7u8; 4]));
        session.send("resize", message).await.unwrap();

        let received = consumer.receive().await.unwrap();
        assert_eq!(received.body_bytes().unwrap(), &[7, 7, 7, 7]);
    }

    #[tokio::test]
    async fn test_unbind_ends_consumers() {
        let session = ChannelSession::new();
        let consumer = session.bind("q");
        session.send("q", MessageFactory::pending_query()).await.unwrap();
        session.unbind("q");

        assert!(consumer.receive().await.is_some());
        assert!(consumer.receive().await.is_none());
    }
}
