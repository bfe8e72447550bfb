//! Image loading pipeline.
//!
//! - **discovery**: Find candidate image files in directories
//! - **channel**: Clearable queues between the stages
//! - **decode**: Read and decode image files
//! - **producer**: Background loader feeding a bounded output queue
//! - **hash**: Perceptual hashing and the pre-hash resize

pub mod channel;
pub mod decode;
pub mod discovery;
pub mod hash;
pub mod producer;

pub use channel::{Backlog, BoundedQueue};
pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::FileDiscovery;
pub use hash::{resize_for_hashing, Hasher};
pub use producer::{ImageProducer, LoadedImage, Progress};
