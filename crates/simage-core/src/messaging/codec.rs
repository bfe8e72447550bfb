//! Encoding domain events into broker messages and decoding them back.
//!
//! The factory is stateless: every function builds a complete [`Message`]
//! that is ready to hand to a [`Session`](super::Session), or rejects a
//! received message outright. A message that fails to decode must not be
//! dispatched any further.

use std::io::Read;
use std::path::{Path, PathBuf};

use super::message::{Body, BodyReader, BodyWriter, Message};
use super::protocol::{
    MessageKind, MessageProperty, ProtocolMessage, QueryType, ReplyKind, TaskType,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::persistence::PendingHashImage;

/// Builds pre-configured messages for every kind in the protocol.
pub struct MessageFactory;

impl MessageFactory {
    /// Request a hash for an already resized image.
    ///
    /// The path stays with the sender; the reply is matched by `tracking_id`.
    pub fn hash_request(resized_image: Vec<u8>, tracking_id: i32) -> Message {
        let mut message = Message::new(MessageKind::HashRequest.is_durable());
        message.put_int(MessageProperty::Id.as_str(), tracking_id);
        message.set_body(Body::Bytes(resized_image));
        message
    }

    /// Report a computed hash. Both values travel as properties so a
    /// receiver can route on them without touching the body.
    pub fn hash_result(hash: u64, tracking_id: i32) -> Message {
        let mut message = Message::new(MessageKind::HashResult.is_durable());
        set_task(&mut message, TaskType::Result);
        message.put_int(MessageProperty::Id.as_str(), tracking_id);
        message.put_long(MessageProperty::HashResult.as_str(), hash as i64);
        message
    }

    /// Report an image that could not be processed.
    pub fn corrupt_report(path: &Path) -> Message {
        let mut message = Message::new(MessageKind::CorruptReport.is_durable());
        set_task(&mut message, TaskType::Corr);
        set_path(&mut message, path);
        message
    }

    /// Ask the repository for all images still waiting on a hash.
    pub fn pending_query() -> Message {
        let mut message = Message::new(MessageKind::PendingQuery.is_durable());
        set_query(&mut message, QueryType::Pending);
        message
    }

    /// Answer a pending query. Paths keep the order of `pending_images`.
    ///
    /// Nothing is returned if the body cannot be serialized, so a partially
    /// written message can never be sent.
    pub fn pending_response(pending_images: &[PendingHashImage]) -> ProtocolResult<Message> {
        let paths: Vec<String> = pending_images
            .iter()
            .map(|p| p.path.to_string_lossy().into_owned())
            .collect();
        Self::pending_response_paths(&paths)
    }

    fn pending_response_paths(paths: &[String]) -> ProtocolResult<Message> {
        let body = serde_json::to_vec(paths)?;

        let mut message = Message::new(MessageKind::PendingResponse.is_durable());
        message.set_body(Body::Bytes(body));
        Ok(message)
    }

    /// Ask the repository for a tracking id for `path`.
    pub fn track_query(path: &Path) -> Message {
        let mut message = Message::new(MessageKind::TrackQuery.is_durable());
        set_query(&mut message, QueryType::Track);

        let mut body = BodyWriter::new();
        body.write_string(&path.to_string_lossy());
        message.set_body(body.into_body());
        message
    }

    /// Answer a track query.
    pub fn track_response(tracking_id: i32) -> Message {
        let mut message = Message::new(MessageKind::TrackResponse.is_durable());

        let mut body = BodyWriter::new();
        body.write_int(tracking_id);
        message.set_body(body.into_body());
        message
    }

    /// Ask for `hash` to be written to the extended attributes of `path`.
    pub fn attribute_update(path: &Path, hash: u64) -> Message {
        let mut message = Message::new(MessageKind::AttributeUpdate.is_durable());
        set_task(&mut message, TaskType::EaUpdate);
        set_path(&mut message, path);

        let mut body = BodyWriter::new();
        body.write_long(hash as i64);
        message.set_body(body.into_body());
        message
    }

    /// Ask a worker to resize and hash the image behind `image`.
    ///
    /// The reader is attached as-is and not read here.
    pub fn resize_request(path: &Path, image: impl Read + Send + 'static) -> Message {
        let mut message = Message::new(MessageKind::ResizeRequest.is_durable());
        message.set_body(Body::stream(image));
        set_task(&mut message, TaskType::Hash);
        set_path(&mut message, path);
        message
    }

    /// Encode a typed message.
    ///
    /// A hash request must carry image bytes; without them it could not be
    /// told apart from other id-only messages on decode.
    pub fn encode(message: ProtocolMessage) -> ProtocolResult<Message> {
        let encoded = match message {
            ProtocolMessage::HashRequest { image, .. } if image.is_empty() => {
                return Err(empty_hash_request());
            }
            ProtocolMessage::HashRequest { tracking_id, image } => {
                Self::hash_request(image, tracking_id)
            }
            ProtocolMessage::HashResult { tracking_id, hash } => {
                Self::hash_result(hash, tracking_id)
            }
            ProtocolMessage::CorruptReport { path } => Self::corrupt_report(&path),
            ProtocolMessage::AttributeUpdate { path, hash } => Self::attribute_update(&path, hash),
            ProtocolMessage::ResizeRequest { path, image } => {
                let mut message = Message::new(MessageKind::ResizeRequest.is_durable());
                message.set_body(image);
                set_task(&mut message, TaskType::Hash);
                set_path(&mut message, &path);
                message
            }
            ProtocolMessage::PendingQuery => Self::pending_query(),
            ProtocolMessage::PendingResponse { paths } => Self::pending_response_paths(&paths)?,
            ProtocolMessage::TrackQuery { path } => Self::track_query(&path),
            ProtocolMessage::TrackResponse { tracking_id } => Self::track_response(tracking_id),
        };
        Ok(encoded)
    }

    /// Decode a message carrying a task or query discriminator, or a hash request.
    ///
    /// Replies have no discriminator; use [`MessageFactory::decode_reply`] for those.
    pub fn decode(mut message: Message) -> ProtocolResult<ProtocolMessage> {
        let task = message
            .optional_string_property(MessageProperty::Task.as_str())?
            .map(str::parse::<TaskType>)
            .transpose()?;
        let query = message
            .optional_string_property(MessageProperty::RepositoryQuery.as_str())?
            .map(str::parse::<QueryType>)
            .transpose()?;

        match (task, query) {
            (Some(_), Some(_)) => Err(ProtocolError::ConflictingDiscriminators),
            (Some(task), None) => decode_task(task, &mut message),
            (None, Some(query)) => decode_query(query, &message),
            (None, None) if message.has_property(MessageProperty::Id.as_str()) => {
                let tracking_id = message.int_property(MessageProperty::Id.as_str())?;
                let image = take_bytes(&mut message)?;
                if image.is_empty() {
                    return Err(empty_hash_request());
                }
                Ok(ProtocolMessage::HashRequest { tracking_id, image })
            }
            (None, None) => Err(ProtocolError::MissingDiscriminator),
        }
    }

    /// Decode a reply to a query this side issued.
    pub fn decode_reply(message: Message, expected: ReplyKind) -> ProtocolResult<ProtocolMessage> {
        let expected_name = match expected {
            ReplyKind::Pending => MessageKind::PendingResponse.as_str(),
            ReplyKind::Track => MessageKind::TrackResponse.as_str(),
        };
        for property in [MessageProperty::Task, MessageProperty::RepositoryQuery] {
            if message.has_property(property.as_str()) {
                return Err(ProtocolError::UnexpectedDiscriminator {
                    expected: expected_name,
                    property: property.to_string(),
                });
            }
        }

        let body = message.body_bytes()?;
        match expected {
            ReplyKind::Pending => {
                let paths: Vec<String> = serde_json::from_slice(body).map_err(|e| {
                    ProtocolError::MalformedBody(format!("pending path list: {e}"))
                })?;
                Ok(ProtocolMessage::PendingResponse { paths })
            }
            ReplyKind::Track => {
                let mut reader = BodyReader::new(body);
                let tracking_id = reader.read_int()?;
                reader.finish()?;
                Ok(ProtocolMessage::TrackResponse { tracking_id })
            }
        }
    }
}

fn set_query(message: &mut Message, query: QueryType) {
    message.put_string(MessageProperty::RepositoryQuery.as_str(), query.as_str());
}

fn set_task(message: &mut Message, task: TaskType) {
    message.put_string(MessageProperty::Task.as_str(), task.as_str());
}

fn set_path(message: &mut Message, path: &Path) {
    message.put_string(MessageProperty::Path.as_str(), path.to_string_lossy());
}

fn path_of(message: &Message) -> ProtocolResult<PathBuf> {
    message
        .string_property(MessageProperty::Path.as_str())
        .map(PathBuf::from)
}

fn empty_hash_request() -> ProtocolError {
    ProtocolError::MalformedBody("hash request carries no image data".to_string())
}

fn expect_empty_body(message: &Message) -> ProtocolResult<()> {
    if message.body().is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::MalformedBody(
            "expected an empty body".to_string(),
        ))
    }
}

fn take_bytes(message: &mut Message) -> ProtocolResult<Vec<u8>> {
    message
        .take_body()
        .into_bytes()
        .map_err(|e| ProtocolError::MalformedBody(format!("failed to read body: {e}")))
}

fn decode_task(task: TaskType, message: &mut Message) -> ProtocolResult<ProtocolMessage> {
    match task {
        TaskType::Result => {
            let tracking_id = message.int_property(MessageProperty::Id.as_str())?;
            let hash = message.long_property(MessageProperty::HashResult.as_str())? as u64;
            expect_empty_body(message)?;
            Ok(ProtocolMessage::HashResult { tracking_id, hash })
        }
        TaskType::Corr => {
            let path = path_of(message)?;
            expect_empty_body(message)?;
            Ok(ProtocolMessage::CorruptReport { path })
        }
        TaskType::EaUpdate => {
            let path = path_of(message)?;
            let mut reader = BodyReader::new(message.body_bytes()?);
            let hash = reader.read_long()? as u64;
            reader.finish()?;
            Ok(ProtocolMessage::AttributeUpdate { path, hash })
        }
        TaskType::Hash => {
            let path = path_of(message)?;
            let image = message.take_body();
            Ok(ProtocolMessage::ResizeRequest { path, image })
        }
    }
}

fn decode_query(query: QueryType, message: &Message) -> ProtocolResult<ProtocolMessage> {
    match query {
        QueryType::Pending => {
            expect_empty_body(message)?;
            Ok(ProtocolMessage::PendingQuery)
        }
        QueryType::Track => {
            let mut reader = BodyReader::new(message.body_bytes()?);
            let path = reader.read_string()?;
            reader.finish()?;
            Ok(ProtocolMessage::TrackQuery {
                path: PathBuf::from(path),
            })
        }
    }
}
