//! # Server
//!
//! A [`Server`] bundles everything connections share: the codec registry, the
//! service registry, configuration and metrics. It is assembled once with a
//! [`ServerBuilder`] and is cheap to clone into connection tasks.
//!
//! ## Example
//! ```no_run
//! use wire_rpc::server::Server;
//! use tokio::net::TcpListener;
//!
//! # async fn run() -> wire_rpc::error::Result<()> {
//! let server = Server::builder()
//!     .register("Foo.Sum", |(a, b): (i64, i64)| async move { Ok::<_, String>(a + b) })?
//!     .build()?;
//!
//! let listener = TcpListener::bind("127.0.0.1:9999").await?;
//! server.serve(listener).await
//! # }
//! ```

use crate::config::ServerConfig;
use crate::core::codec::AsyncStream;
use crate::core::registry::{CodecRegistry, CodecType, NewCodecFn};
use crate::error::{RpcError, Result};
use crate::protocol::handshake;
use crate::protocol::pipeline::{self, PipelineContext};
use crate::service::ServiceRegistry;
use crate::utils::metrics::{Metrics, MetricsSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builder for [`Server`]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    codecs: Option<CodecRegistry>,
    services: ServiceRegistry,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the codec table. Without this the built-in codecs are used,
    /// limited to the configured `max_frame_size`.
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Some(codecs);
        self
    }

    /// Add one codec on top of the current table
    pub fn register_codec(mut self, codec_type: impl Into<CodecType>, constructor: NewCodecFn) -> Self {
        let max_frame_size = self.config.max_frame_size;
        self.codecs
            .get_or_insert_with(|| CodecRegistry::with_max_frame_size(max_frame_size))
            .register(codec_type, constructor);
        self
    }

    pub fn services(mut self, services: ServiceRegistry) -> Self {
        self.services = services;
        self
    }

    /// Register one method; see [`ServiceRegistry::register`]
    pub fn register<A, R, E, F, Fut>(mut self, method: &str, handler: F) -> Result<Self>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.services.register(method, handler)?;
        Ok(self)
    }

    /// Validate the configuration and freeze the registries
    pub fn build(self) -> Result<Server> {
        let errors = self.config.validate();
        if !errors.is_empty() {
            return Err(RpcError::ConfigError(format!(
                "Invalid server configuration:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        let codecs = self
            .codecs
            .unwrap_or_else(|| CodecRegistry::with_max_frame_size(self.config.max_frame_size));
        if codecs.is_empty() {
            return Err(RpcError::ConfigError("No codecs registered".to_string()));
        }

        let config = Arc::new(self.config);
        let pipeline = PipelineContext {
            services: Arc::new(self.services),
            metrics: Arc::new(Metrics::new()),
            max_in_flight: config.max_in_flight,
            overload_policy: config.overload_policy,
            max_frame_size: config.max_frame_size,
        };

        Ok(Server {
            codecs: Arc::new(codecs),
            config,
            pipeline,
        })
    }
}

/// RPC server shared by all of its connections
#[derive(Debug, Clone)]
pub struct Server {
    codecs: Arc<CodecRegistry>,
    config: Arc<ServerConfig>,
    pipeline: PipelineContext,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.pipeline.services
    }

    pub fn metrics(&self) -> &Metrics {
        &self.pipeline.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.pipeline.metrics.snapshot()
    }

    /// Handshake and serve one connection to completion.
    ///
    /// Errors are logged, never returned: whatever happens on this stream
    /// stays on this stream.
    pub async fn serve_connection<S: AsyncStream>(&self, stream: S) {
        let metrics = &self.pipeline.metrics;
        let _open = OpenConnection::new(metrics);

        match handshake::accept(stream, &self.codecs, self.config.handshake_timeout).await {
            Ok(codec) => {
                metrics.handshake_success();
                debug!(format = %codec.format(), "rpc server: connection ready");
                pipeline::serve_codec(codec, self.pipeline.clone()).await;
            }
            Err(e) => {
                metrics.handshake_failed();
                warn!(error = %e, "rpc server: handshake rejected");
            }
        }
    }
}

/// Counts a connection as active for as long as it lives, including when
/// its task is aborted at shutdown.
struct OpenConnection<'a>(&'a Metrics);

impl<'a> OpenConnection<'a> {
    fn new(metrics: &'a Metrics) -> Self {
        metrics.connection_established();
        Self(metrics)
    }
}

impl Drop for OpenConnection<'_> {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}
