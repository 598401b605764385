//! # Serialization Formats
//!
//! Value encodings a codec can be built on. Supports bincode (compact binary),
//! JSON (debugging/interop) and MessagePack (compact, self-describing).
//!
//! A format turns a typed value into the bytes of one segment and back. The
//! framing around those bytes is the job of [`SegmentCodec`].
//!
//! ## Performance Characteristics
//! - **Bincode**: fastest, not self-describing
//! - **MessagePack**: compact, self-describing
//! - **JSON**: human-readable, largest
//!
//! [`SegmentCodec`]: crate::core::segment::SegmentCodec

use crate::core::frame::Body;
use crate::core::registry::CodecType;
use crate::error::{RpcError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum SerializationFormat {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode,
    /// Human-readable JSON format (debugging, interop)
    Json,
    /// Compact binary format (MessagePack, efficient)
    MessagePack,
}

impl SerializationFormat {
    /// All built-in formats, in registration order
    pub const ALL: [SerializationFormat; 3] = [
        SerializationFormat::Bincode,
        SerializationFormat::Json,
        SerializationFormat::MessagePack,
    ];

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Bincode => "Bincode",
            SerializationFormat::Json => "JSON",
            SerializationFormat::MessagePack => "MessagePack",
        }
    }

    /// The codec identifier a client negotiates to get this format
    pub fn codec_type(self) -> CodecType {
        match self {
            SerializationFormat::Bincode => CodecType::BINCODE,
            SerializationFormat::Json => CodecType::JSON,
            SerializationFormat::MessagePack => CodecType::MSGPACK,
        }
    }

    /// Serialize a value to bytes
    pub fn to_bytes<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializationFormat::Bincode => {
                bincode::serialize(value).map_err(|e| RpcError::SerializeError(e.to_string()))
            }
            SerializationFormat::Json => {
                serde_json::to_vec(value).map_err(|e| RpcError::SerializeError(e.to_string()))
            }
            SerializationFormat::MessagePack => rmp_serde::to_vec_named(value)
                .map_err(|e| RpcError::SerializeError(e.to_string())),
        }
    }

    /// Deserialize a value from bytes
    pub fn from_bytes<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            SerializationFormat::Bincode => {
                bincode::deserialize(data).map_err(|e| RpcError::DeserializeError(e.to_string()))
            }
            SerializationFormat::Json => {
                serde_json::from_slice(data).map_err(|e| RpcError::DeserializeError(e.to_string()))
            }
            SerializationFormat::MessagePack => {
                rmp_serde::from_slice(data).map_err(|e| RpcError::DeserializeError(e.to_string()))
            }
        }
    }

    /// Encode a value as a message body
    pub fn encode_body<T: Serialize + ?Sized>(self, value: &T) -> Result<Body> {
        self.to_bytes(value).map(Body::from)
    }

    /// Decode a message body into a typed value
    pub fn decode_body<T: DeserializeOwned>(self, body: &Body) -> Result<T> {
        self.from_bytes(body.as_bytes())
    }

    /// The body sent alongside an error-tagged header
    pub fn sentinel_body(self) -> Body {
        self.encode_body(&()).unwrap_or_default()
    }
}

impl std::fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::Header;

    #[test]
    fn test_format_names() {
        assert_eq!(SerializationFormat::Bincode.name(), "Bincode");
        assert_eq!(SerializationFormat::Json.name(), "JSON");
        assert_eq!(SerializationFormat::MessagePack.name(), "MessagePack");
    }

    #[test]
    fn test_default_format() {
        assert_eq!(SerializationFormat::default(), SerializationFormat::Bincode);
    }

    #[test]
    fn test_codec_types_are_distinct() {
        assert_eq!(SerializationFormat::Json.codec_type().as_str(), "application/json");
        assert_ne!(
            SerializationFormat::Bincode.codec_type(),
            SerializationFormat::MessagePack.codec_type()
        );
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_json_header_uses_wire_field_names() {
        let header = Header::new("Foo.Sum", 3);
        let bytes = SerializationFormat::Json.to_bytes(&header).expect("serialize");
        let text = std::str::from_utf8(&bytes).expect("utf8");
        assert_eq!(text, r#"{"ServiceMethod":"Foo.Sum","Seq":3,"Error":""}"#);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_header_survives_every_format() {
        let mut header = Header::new("Arith.Div", u64::MAX);
        header.error = "division by zero".to_string();

        for format in SerializationFormat::ALL {
            let bytes = format.to_bytes(&header).expect("serialize");
            let recovered: Header = format.from_bytes(&bytes).expect("deserialize");
            assert_eq!(recovered, header, "format {format}");
        }
    }

    #[test]
    fn test_sentinel_body_decodes_as_unit() {
        for format in SerializationFormat::ALL {
            let sentinel = format.sentinel_body();
            let decoded: Result<()> = format.decode_body(&sentinel);
            assert!(decoded.is_ok(), "format {format}");
        }
    }

    #[test]
    fn test_type_mismatch_is_a_deserialize_error() {
        let body = SerializationFormat::Json.sentinel_body();
        let decoded: Result<String> = SerializationFormat::Json.decode_body(&body);
        assert!(matches!(decoded, Err(RpcError::DeserializeError(_))));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_messagepack_is_more_compact_than_json() {
        let header = Header::new("Foo.Sum", 42);
        let json = SerializationFormat::Json.to_bytes(&header).expect("json").len();
        let msgpack = SerializationFormat::MessagePack.to_bytes(&header).expect("msgpack").len();
        assert!(msgpack < json);
    }
}
