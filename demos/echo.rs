//! Small end-to-end demo.
//!
//! `cargo run --example echo` starts a server on an ephemeral port, makes
//! five calls over JSON and shuts down.
//!
//! `cargo run --example echo -- --serve` instead listens on the configured
//! address (`WIRE_RPC_SERVER_ADDRESS`, default `127.0.0.1:9999`) until Ctrl-C.

use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::info;
use wire_rpc::config::RpcConfig;
use wire_rpc::protocol::handshake;
use wire_rpc::utils::logging::init_logging;
use wire_rpc::{CodecRegistry, Header, NegotiationRecord, Result, SerializationFormat, Server};

fn build_server(config: &RpcConfig) -> Result<Server> {
    Server::builder()
        .config(config.server.clone())
        .register("Foo.Sum", |(a, b): (i64, i64)| async move {
            Ok::<_, String>(a + b)
        })?
        .register("Foo.Echo", |msg: String| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, String>(format!("wire-rpc resp {msg}"))
        })?
        .build()
}

async fn run_client(addr: String) -> Result<()> {
    let stream = TcpStream::connect(&addr).await?;
    let format = SerializationFormat::Json;
    let mut codec = handshake::connect(
        stream,
        &NegotiationRecord::new(format.codec_type()),
        &CodecRegistry::default(),
    )
    .await?;

    for seq in 0..5u64 {
        let body = format.encode_body(&format!("req {seq}"))?;
        codec.write(&Header::new("Foo.Echo", seq), &body).await?;
    }
    codec.close().await?;

    for _ in 0..5 {
        let header = codec.read_header().await?;
        let body = codec.read_body().await?;
        if header.is_error() {
            info!(seq = header.seq, error = %header.error, "call failed");
        } else {
            let reply: String = format.decode_body(&body)?;
            info!(seq = header.seq, reply = %reply, "call returned");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RpcConfig::from_env()?;
    config.validate_strict()?;
    init_logging(&config.logging)?;

    let server = build_server(&config)?;

    if std::env::args().any(|arg| arg == "--serve") {
        let listener = server.bind().await?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C");
                let _ = shutdown_tx.send(()).await;
            }
        });
        return server.serve_with_shutdown(listener, shutdown_rx).await;
    }

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.serve_with_shutdown(listener, shutdown_rx).await })
    };

    run_client(addr).await?;

    let _ = shutdown_tx.send(()).await;
    if let Ok(result) = serving.await {
        result?;
    }
    info!(metrics = ?server.metrics_snapshot(), "demo finished");
    Ok(())
}
