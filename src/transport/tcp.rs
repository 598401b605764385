use crate::error::Result;
use crate::server::Server;
use crate::transport::Acceptor;
use std::future::Future;
use std::io;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, instrument};

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, String)>> + Send {
        async move {
            let (stream, addr) = TcpListener::accept(self).await?;
            stream.set_nodelay(true)?;
            Ok((stream, addr.to_string()))
        }
    }
}

impl Server {
    /// Bind a TCP listener on the configured `address`
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.config().address).await?;
        info!(address = %listener.local_addr()?, "Listening");
        Ok(listener)
    }

    /// Accept TCP connections forever
    #[instrument(skip_all, fields(address = ?listener.local_addr().ok()))]
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.run_acceptor(listener, futures::future::pending()).await
    }

    /// Accept TCP connections until `shutdown_rx` yields or its sender is dropped
    #[instrument(skip_all, fields(address = ?listener.local_addr().ok()))]
    pub async fn serve_with_shutdown(
        &self,
        listener: TcpListener,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        self.run_acceptor(listener, async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
    }
}
