//! # Services
//!
//! Typed method registration and argument binding.
//!
//! A server looks every request's `ServiceMethod` up in a [`ServiceRegistry`].
//! The matching entry decodes the body into the method's argument type and
//! hands back an [`Invocation`] that the request's worker awaits.

pub mod registry;

pub use registry::{split_method, Invocation, ServiceRegistry};
