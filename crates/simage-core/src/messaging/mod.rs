//! Message protocol between the image loader, hash workers, and the repository.
//!
//! - **message**: broker envelope (durability, typed properties, body)
//! - **protocol**: property names, discriminators, and the typed message model
//! - **codec**: encoding and decoding every message kind
//! - **session**: broker session trait and an in-process broker

pub mod codec;
pub mod message;
pub mod protocol;
pub mod session;

// Re-exports for convenient access
pub use codec::MessageFactory;
pub use message::{Body, Message, PropertyValue};
pub use protocol::{
    MessageKind, MessageProperty, ProtocolMessage, QueryType, ReplyKind, TaskType,
};
pub use session::{ChannelSession, Consumer, Session};
