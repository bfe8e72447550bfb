//! Error types for the simage hashing pipeline and message protocol.
//!
//! Errors are organized by concern so callers can tell a dropped pipeline
//! item apart from a rejected message or a missing tracking id.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for simage operations.
#[derive(Error, Debug)]
pub enum SimageError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Malformed or unrecognized messages
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Tracking id lookups
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Record lookup or insert failures
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Broker session failures
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Extended attribute access
    #[error("Attribute error: {0}")]
    Attribute(#[from] AttributeError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Per-item failures inside the loading pipeline.
///
/// None of these stop the loader; they are logged and the item is dropped.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// File could not be read
    #[error("Failed to load {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File contents are not a decodable image
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Record lookup failed, so the record state is unknown
    #[error("Failed to query records for {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: PersistenceError,
    },
}

/// A message that cannot be interpreted. Such messages must not be dispatched.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Neither a task nor a query property, and no other identifying field
    #[error("Message carries no task or query discriminator")]
    MissingDiscriminator,

    /// Both a task and a query discriminator are present
    #[error("Message declares both a task and a query")]
    ConflictingDiscriminators,

    /// A reply carries a discriminator, so it is not the expected reply
    #[error("Expected a {expected} reply but the message declares '{property}'")]
    UnexpectedDiscriminator {
        expected: &'static str,
        property: String,
    },

    /// Well-formed message of a kind the receiver does not handle
    #[error("Expected a {expected} message, got {actual}")]
    UnexpectedKind {
        expected: &'static str,
        actual: &'static str,
    },

    /// Discriminator value is not part of the schema
    #[error("Unknown {property} value '{value}'")]
    UnknownDiscriminator { property: String, value: String },

    /// A property the message kind requires is absent
    #[error("Missing required property '{0}'")]
    MissingProperty(String),

    /// A property is present but has the wrong type
    #[error("Property '{property}' should be {expected}")]
    WrongPropertyType {
        property: String,
        expected: &'static str,
    },

    /// Body is too short, too long, or not valid UTF-8
    #[error("Malformed message body: {0}")]
    MalformedBody(String),

    /// Building a serialized body failed
    #[error("Failed to serialize message body: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tracking registry errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Id was never assigned or has already been released
    #[error("Tracking id {0} is not registered")]
    NotFound(i32),
}

/// Failure reported by a [`Persistence`](crate::persistence::Persistence) backend.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct PersistenceError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PersistenceError {
    /// Create an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying backend error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Broker session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No queue is bound to the address
    #[error("No queue bound to address '{0}'")]
    UnknownAddress(String),

    /// The consumer side of the address has gone away
    #[error("Address '{0}' is closed")]
    Closed(String),

    /// A streamed body could not be read for delivery
    #[error("Failed to read streamed body: {0}")]
    StreamBody(#[source] std::io::Error),
}

/// Reading or writing the hash stored in a file's extended attributes.
#[derive(Error, Debug)]
pub enum AttributeError {
    /// Attributes could not be read or written
    #[error("Failed to access attributes of {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A hash attribute exists but does not hold a valid hash
    #[error("Invalid hash attribute on {path}: {message}")]
    InvalidValue { path: PathBuf, message: String },
}

/// Convenience type alias for simage results.
pub type Result<T> = std::result::Result<T, SimageError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Convenience type alias for protocol results.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
