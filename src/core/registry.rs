//! Codec registry: negotiated codec identifier → codec constructor.
//!
//! The registry is assembled before a server starts accepting connections and
//! is only read afterwards, so lookups need no locking. New codecs are added
//! with [`CodecRegistry::register`]; the handshake never matches on concrete
//! codec types.

use crate::config::MAX_FRAME_SIZE;
use crate::core::codec::{new_stream_codec, Codec, Transport};
use crate::core::serialization::SerializationFormat;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Constructor that wraps a freshly negotiated stream in a codec
pub type NewCodecFn = Arc<dyn Fn(Transport) -> Codec + Send + Sync + 'static>;

/// Codec identifier carried in the negotiation record.
///
/// Borrowed for the built-in identifiers, owned for anything read off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodecType(Cow<'static, str>);

impl CodecType {
    pub const BINCODE: CodecType = CodecType(Cow::Borrowed("application/bincode"));
    pub const JSON: CodecType = CodecType(Cow::Borrowed("application/json"));
    pub const MSGPACK: CodecType = CodecType(Cow::Borrowed("application/msgpack"));

    pub fn new(name: impl Into<String>) -> Self {
        CodecType(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CodecType {
    fn from(name: &str) -> Self {
        CodecType::new(name)
    }
}

/// Table of codec constructors keyed by [`CodecType`]
#[derive(Clone)]
pub struct CodecRegistry {
    constructors: HashMap<CodecType, NewCodecFn>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }
}

impl CodecRegistry {
    /// A registry with no codecs at all
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry holding the built-in stream codecs, one per
    /// [`SerializationFormat`], each limited to `max_frame_size` bytes per segment.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        let mut registry = Self::empty();
        for format in SerializationFormat::ALL {
            registry.register(
                format.codec_type(),
                Arc::new(move |transport: Transport| {
                    new_stream_codec(transport, format, max_frame_size)
                }),
            );
        }
        registry
    }

    /// Add or replace the constructor for `codec_type`
    pub fn register(&mut self, codec_type: impl Into<CodecType>, constructor: NewCodecFn) -> &mut Self {
        self.constructors.insert(codec_type.into(), constructor);
        self
    }

    /// Constructor for `codec_type`, or `None` when it was never registered
    pub fn get(&self, codec_type: &CodecType) -> Option<NewCodecFn> {
        self.constructors.get(codec_type).cloned()
    }

    pub fn contains(&self, codec_type: &CodecType) -> bool {
        self.constructors.contains_key(codec_type)
    }

    /// Registered identifiers, sorted for stable output
    pub fn codec_types(&self) -> Vec<CodecType> {
        let mut types: Vec<CodecType> = self.constructors.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codec_types", &self.codec_types())
            .finish()
    }
}
