//! # Listener Transports
//!
//! Accept loops that feed connections into a [`Server`].
//!
//! ## Supported Transports
//! - **TCP**: [`Server::serve`], [`Server::serve_with_shutdown`]
//! - **Unix domain sockets** (Unix only): [`Server::serve_unix`]
//!
//! Each accepted stream gets its own task running the handshake and the
//! request pipeline. A failure on one connection never stops the loop.
//! On shutdown the loop stops accepting and waits, up to the configured
//! `shutdown_timeout`, for open connections to drain. Connections still open
//! after that are aborted.

#[cfg(unix)]
pub mod local;
pub mod tcp;

use crate::core::codec::AsyncStream;
use crate::error::Result;
use crate::server::Server;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// Pause after a failed accept; errors like EMFILE persist and would spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A listening socket that yields byte streams
pub trait Acceptor: Send {
    type Stream: AsyncStream;

    /// Wait for the next connection; the string names the peer for logs
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, String)>> + Send;
}

impl Server {
    /// Accept connections from `acceptor` until `shutdown` resolves.
    pub(crate) async fn run_acceptor<A, F>(&self, mut acceptor: A, shutdown: F) -> Result<()>
    where
        A: Acceptor,
        F: Future<Output = ()> + Send,
    {
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server. Waiting for connections to close...");
                    break;
                }

                accept_result = acceptor.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            info!(peer = %peer, "New connection established");
                            let server = self.clone();
                            connections.spawn(async move {
                                server.serve_connection(stream).await;
                                info!(peer = %peer, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }

                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    log_connection_exit(finished);
                }
            }
        }

        info!(connections = connections.len(), "Waiting for connections to close");
        let drained = tokio::time::timeout(self.config().shutdown_timeout, async {
            while let Some(finished) = connections.join_next().await {
                log_connection_exit(finished);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                connections = connections.len(),
                "Shutdown timeout reached, aborting remaining connections"
            );
            connections.shutdown().await;
        } else {
            info!("All connections closed, shutting down");
        }

        self.metrics().log_metrics();
        Ok(())
    }
}

fn log_connection_exit(finished: std::result::Result<(), JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}
