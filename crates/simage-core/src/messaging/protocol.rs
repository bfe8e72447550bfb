//! Wire schema: property names, discriminator values, and the typed message model.
//!
//! | kind             | durable | key properties              | body                    |
//! |------------------|---------|-----------------------------|-------------------------|
//! | hash-request     | yes     | id                          | raw image bytes         |
//! | hash-result      | yes     | id, hashResult, task=result | empty                   |
//! | corrupt-report   | yes     | path, task=corr             | empty                   |
//! | attribute-update | yes     | path, task=eaupdate         | hash (64-bit)           |
//! | resize-request   | yes     | path, task=hash             | streamed image bytes    |
//! | pending-query    | no      | repository_query=pending    | empty                   |
//! | pending-response | no      | -                           | serialized string list  |
//! | track-query      | no      | repository_query=TRACK      | UTF-8 path string       |
//! | track-response   | no      | -                           | tracking id (32-bit)    |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::message::Body;
use crate::error::ProtocolError;

/// Property names used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageProperty {
    RepositoryQuery,
    Id,
    HashResult,
    Task,
    Path,
}

impl MessageProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageProperty::RepositoryQuery => "repository_query",
            MessageProperty::Id => "id",
            MessageProperty::HashResult => "hashResult",
            MessageProperty::Task => "task",
            MessageProperty::Path => "path",
        }
    }
}

impl fmt::Display for MessageProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-kinds of repository queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Pending,
    Track,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::Pending => "pending",
            QueryType::Track => "TRACK",
        }
    }
}

impl FromStr for QueryType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueryType::Pending),
            "TRACK" => Ok(QueryType::Track),
            other => Err(ProtocolError::UnknownDiscriminator {
                property: MessageProperty::RepositoryQuery.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Sub-kinds of task-carrying messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    /// Resize and hash the attached image
    Hash,
    /// Image could not be processed
    Corr,
    /// Hash computed for a tracking id
    Result,
    /// Write a hash to the file's extended attributes
    EaUpdate,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Hash => "hash",
            TaskType::Corr => "corr",
            TaskType::Result => "result",
            TaskType::EaUpdate => "eaupdate",
        }
    }
}

impl FromStr for TaskType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash" => Ok(TaskType::Hash),
            "corr" => Ok(TaskType::Corr),
            "result" => Ok(TaskType::Result),
            "eaupdate" => Ok(TaskType::EaUpdate),
            other => Err(ProtocolError::UnknownDiscriminator {
                property: MessageProperty::Task.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    HashRequest,
    HashResult,
    CorruptReport,
    AttributeUpdate,
    ResizeRequest,
    PendingQuery,
    PendingResponse,
    TrackQuery,
    TrackResponse,
}

impl MessageKind {
    /// Whether the broker must persist this kind until acknowledged.
    pub fn is_durable(self) -> bool {
        matches!(
            self,
            MessageKind::HashRequest
                | MessageKind::HashResult
                | MessageKind::CorruptReport
                | MessageKind::AttributeUpdate
                | MessageKind::ResizeRequest
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::HashRequest => "hash-request",
            MessageKind::HashResult => "hash-result",
            MessageKind::CorruptReport => "corrupt-report",
            MessageKind::AttributeUpdate => "attribute-update",
            MessageKind::ResizeRequest => "resize-request",
            MessageKind::PendingQuery => "pending-query",
            MessageKind::PendingResponse => "pending-response",
            MessageKind::TrackQuery => "track-query",
            MessageKind::TrackResponse => "track-response",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replies carry no discriminator, so the receiver names what it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Pending,
    Track,
}

/// A decoded message. Each variant carries exactly the fields its kind defines.
#[derive(Debug, PartialEq)]
pub enum ProtocolMessage {
    HashRequest { tracking_id: i32, image: Vec<u8> },
    HashResult { tracking_id: i32, hash: u64 },
    CorruptReport { path: PathBuf },
    AttributeUpdate { path: PathBuf, hash: u64 },
    ResizeRequest { path: PathBuf, image: Body },
    PendingQuery,
    PendingResponse { paths: Vec<String> },
    TrackQuery { path: PathBuf },
    TrackResponse { tracking_id: i32 },
}

impl ProtocolMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolMessage::HashRequest { .. } => MessageKind::HashRequest,
            ProtocolMessage::HashResult { .. } => MessageKind::HashResult,
            ProtocolMessage::CorruptReport { .. } => MessageKind::CorruptReport,
            ProtocolMessage::AttributeUpdate { .. } => MessageKind::AttributeUpdate,
            ProtocolMessage::ResizeRequest { .. } => MessageKind::ResizeRequest,
            ProtocolMessage::PendingQuery => MessageKind::PendingQuery,
            ProtocolMessage::PendingResponse { .. } => MessageKind::PendingResponse,
            ProtocolMessage::TrackQuery { .. } => MessageKind::TrackQuery,
            ProtocolMessage::TrackResponse { .. } => MessageKind::TrackResponse,
        }
    }
}
