//! Frame contents: the header every message carries and its opaque body.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Precedes every request and every response.
///
/// `seq` is assigned by the caller and echoed back unchanged; it is the only
/// thing tying a response to its request, since responses on one connection
/// may be written in any order. A non-empty `error` means the body that
/// follows is a sentinel, not a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    /// `Type.Method` name of the procedure
    #[serde(rename = "ServiceMethod")]
    pub service_method: String,
    /// Caller-assigned sequence number
    #[serde(rename = "Seq")]
    pub seq: u64,
    /// Empty on success
    #[serde(rename = "Error", default)]
    pub error: String,
}

impl Header {
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Encoded body bytes, interpreted with the connection's
/// [`SerializationFormat`](crate::core::serialization::SerializationFormat).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body(Bytes);

impl Body {
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body(Bytes::from(bytes))
    }
}
