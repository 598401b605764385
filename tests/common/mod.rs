//! Shared fixtures for integration tests: a server with a handful of test
//! methods and a bare client that speaks the wire protocol directly.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use wire_rpc::config::ServerConfig;
use wire_rpc::protocol::handshake;
use wire_rpc::{Codec, CodecRegistry, Header, NegotiationRecord, RpcError, SerializationFormat, Server};

/// Methods available on every test server:
///
/// - `Foo.Sum`: `Vec<i64>` -> sum
/// - `Foo.Echo`: `String` -> same string
/// - `Foo.Sleep`: milliseconds -> the same value, after sleeping that long
/// - `Foo.Blob`: `(seq, len)` -> `len` bytes filled with `seq as u8`
/// - `Foo.Fail`: always fails with the given message
/// - `Foo.Panic`: panics
/// - `Foo.Wait`: blocks until `gate` is notified
pub fn test_server(config: ServerConfig, gate: Arc<Notify>) -> Server {
    Server::builder()
        .config(config)
        .register("Foo.Sum", |args: Vec<i64>| async move {
            Ok::<_, String>(args.iter().sum::<i64>())
        })
        .unwrap()
        .register("Foo.Echo", |arg: String| async move { Ok::<_, String>(arg) })
        .unwrap()
        .register("Foo.Sleep", |millis: u64| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, String>(millis)
        })
        .unwrap()
        .register("Foo.Blob", |(seq, len): (u64, usize)| async move {
            Ok::<_, String>(vec![seq as u8; len])
        })
        .unwrap()
        .register("Foo.Fail", |msg: String| async move { Err::<(), _>(msg) })
        .unwrap()
        .register("Foo.Panic", |_: ()| async move {
            if true {
                panic!("handler blew up");
            }
            Ok::<(), String>(())
        })
        .unwrap()
        .register("Foo.Wait", move |_: ()| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok::<_, String>("released".to_string())
            }
        })
        .unwrap()
        .build()
        .unwrap()
}

pub fn default_server() -> Server {
    test_server(ServerConfig::default(), Arc::new(Notify::new()))
}

/// Open an in-memory connection to `server` and negotiate `format`.
pub async fn connect(server: &Server, format: SerializationFormat) -> (Codec, JoinHandle<()>) {
    let (client, server_side) = tokio::io::duplex(4 * 1024 * 1024);
    let server = server.clone();
    let task = tokio::spawn(async move { server.serve_connection(server_side).await });

    let codec = handshake::connect(
        client,
        &NegotiationRecord::new(format.codec_type()),
        &CodecRegistry::default(),
    )
    .await
    .expect("handshake");
    (codec, task)
}

/// Write one request frame.
pub async fn send<A: Serialize + ?Sized>(codec: &mut Codec, method: &str, seq: u64, arg: &A) {
    let body = codec.format().encode_body(arg).expect("encode arg");
    codec
        .write(&Header::new(method, seq), &body)
        .await
        .expect("write request");
}

/// Read one response frame, decoding the body as `R` unless the header
/// carries an error, in which case the body must be the unit sentinel.
pub async fn recv<R: DeserializeOwned>(codec: &mut Codec) -> (Header, Option<R>) {
    let header = codec.read_header().await.expect("response header");
    let body = codec.read_body().await.expect("response body");
    if header.is_error() {
        let _: () = codec.format().decode_body(&body).expect("sentinel body");
        (header, None)
    } else {
        (header, Some(codec.format().decode_body(&body).expect("reply body")))
    }
}

/// After the server has drained and closed, the next read sees end-of-stream.
pub async fn expect_closed(codec: &mut Codec) {
    match codec.read_header().await {
        Err(e) if e.is_disconnect() => {}
        Err(RpcError::Io(e)) => panic!("unexpected I/O error: {e}"),
        other => panic!("expected closed connection, got {other:?}"),
    }
}
