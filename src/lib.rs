//! # wire-rpc
//!
//! Server side of a small framed RPC transport.
//!
//! A client connects, sends one JSON negotiation record naming a codec, then
//! streams request frames (`Header` + body). The server answers each request
//! with exactly one response frame carrying the same sequence number. Requests
//! on a connection run concurrently; responses are written one whole frame at
//! a time and may come back in any order.
//!
//! ## Modules
//! - [`core`]: headers, bodies, segment framing, value formats, codecs
//! - [`protocol`]: handshake and the per-connection request pipeline
//! - [`service`]: typed method registry
//! - [`server`]: server assembly and per-connection entry point
//! - [`transport`]: TCP and Unix listeners
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging, metrics

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::{Body, Codec, CodecRegistry, CodecType, Header, SerializationFormat};
pub use crate::error::{Result, RpcError};
pub use crate::protocol::NegotiationRecord;
pub use crate::server::{Server, ServerBuilder};
pub use crate::service::ServiceRegistry;
