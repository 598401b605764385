//! # Core Protocol Components
//!
//! Framing, value encodings and pluggable codecs.
//!
//! ## Components
//! - **Frame**: [`Header`] and opaque [`Body`]
//! - **Segment**: Tokio codec for length-prefixed segments
//! - **Serialization**: Bincode, JSON and MessagePack value encodings
//! - **Codec**: Split read/write framer over one connection
//! - **Registry**: Negotiated codec identifier → constructor
//!
//! ## Wire Format
//! ```text
//! [HeaderLen(4)] [Header(N)] [BodyLen(4)] [Body(M)]
//! ```
//!
//! ## Limits
//! - Each segment is bounded by the configured maximum frame size (16MB default)
//! - Length validation happens before allocation

pub mod codec;
pub mod frame;
pub mod registry;
pub mod segment;
pub mod serialization;

pub use codec::{Codec, CodecReader, CodecWriter, Transport};
pub use frame::{Body, Header};
pub use registry::{CodecRegistry, CodecType, NewCodecFn};
pub use serialization::SerializationFormat;
