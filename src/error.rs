//! # Error Types
//!
//! Error handling for the RPC transport.
//!
//! This module defines every error variant that can occur while negotiating a
//! connection, framing messages, dispatching requests and writing responses.
//!
//! ## Error Categories
//! - **I/O Errors**: Stream failures, including end-of-stream
//! - **Handshake Errors**: Bad magic number, unknown codec, malformed record
//! - **Framing Errors**: Oversized segments, (de)serialization failures
//! - **Dispatch Errors**: Unknown or ill-formed methods, overloaded connection
//! - **Service Errors**: Failures reported by a registered method
//!
//! Errors that reach a worker are reported to the peer through the `Error`
//! field of the response header; they never abort the connection.
//!
//! ## Example Usage
//! ```rust
//! use wire_rpc::error::{RpcError, Result};
//! use tracing::error;
//!
//! fn check_seq(seq: u64) -> Result<u64> {
//!     if seq == u64::MAX {
//!         return Err(RpcError::Custom("sequence space exhausted".into()));
//!     }
//!     Ok(seq + 1)
//! }
//!
//! if let Err(e) = check_seq(u64::MAX) {
//!     error!(error = %e, "Bad sequence number");
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake errors
    pub const ERR_HANDSHAKE_EMPTY: &str = "connection closed before negotiation record";
    pub const ERR_HANDSHAKE_TOO_LONG: &str = "negotiation record exceeds maximum size";

    /// Dispatch errors
    pub const ERR_SERVER_BUSY: &str = "rpc server: too many requests in flight";
    pub const ERR_HANDLER_PANICKED: &str = "rpc server: method handler panicked";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_TRAILING_BYTES: &str = "stream ended inside a frame";
}

/// RpcError is the primary error type for all transport operations
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid magic number: {0:#x}")]
    InvalidMagicNumber(u64),

    #[error("Unsupported codec type: {0}")]
    UnsupportedCodec(String),

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("rpc server: can't find method {0}")]
    UnknownMethod(String),

    #[error("rpc server: service/method request ill-formed: {0}")]
    MalformedMethod(String),

    #[error("rpc server: method already registered: {0}")]
    DuplicateMethod(String),

    #[error("{}", constants::ERR_SERVER_BUSY)]
    ServerBusy,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Service(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl RpcError {
    /// True when the peer simply went away: a clean end-of-stream or one
    /// that cut a frame short.
    pub fn is_disconnect(&self) -> bool {
        match self {
            RpcError::ConnectionClosed => true,
            RpcError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Type alias for Results using RpcError
pub type Result<T> = std::result::Result<T, RpcError>;
