//! Unix domain socket listener.

use crate::error::Result;
use crate::server::Server;
use crate::transport::Acceptor;
use std::future::Future;
use std::io;
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

impl Acceptor for UnixListener {
    type Stream = UnixStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(UnixStream, String)>> + Send {
        async move {
            let (stream, addr) = UnixListener::accept(self).await?;
            let peer = addr
                .as_pathname()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| String::from("unnamed"));
            Ok((stream, peer))
        }
    }
}

impl Server {
    /// Serve on a Unix domain socket at `path` until `shutdown_rx` yields.
    ///
    /// A stale socket file at `path` is removed before binding and the file
    /// is removed again on shutdown.
    #[instrument(skip(self, path, shutdown_rx), fields(socket_path = %path.as_ref().display()))]
    pub async fn serve_unix<P: AsRef<Path>>(
        &self,
        path: P,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            tokio::fs::remove_file(&path).await.ok();
        }

        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "Listening on unix socket");

        let result = self
            .run_acceptor(listener, async move {
                let _ = shutdown_rx.recv().await;
            })
            .await;

        if path.exists() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                error!(error = %e, path = %path.display(), "Failed to remove socket file");
            } else {
                info!(path = %path.display(), "Removed socket file");
            }
        }

        result
    }
}
