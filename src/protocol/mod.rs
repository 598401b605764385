//! # Connection Protocol
//!
//! What happens on a connection after it is accepted.
//!
//! ## Components
//! - **Handshake**: Reads the negotiation record and picks a codec
//! - **Pipeline**: Concurrent request/response loop over the negotiated codec

pub mod handshake;
pub mod pipeline;

pub use handshake::NegotiationRecord;
pub use pipeline::PipelineContext;
