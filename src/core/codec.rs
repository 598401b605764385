//! # Codec
//!
//! A codec frames headers and bodies over one connection's byte stream.
//!
//! The contract has four operations: read a header, read a body, write a
//! header-body pair, close. Reading and writing happen concurrently on a
//! connection (one read loop, many response writers), so a [`Codec`] is made
//! of a read side and a write side that can be split apart with
//! [`Codec::into_split`]. The write side is not internally synchronized: when
//! several tasks write responses, the caller serializes them.
//!
//! ## Write semantics
//! `write` encodes the header, encodes the body, then flushes. If anything in
//! that sequence fails, the flush is still attempted and the stream is shut
//! down; the writer stays poisoned and rejects later writes.

use crate::core::frame::{Body, Header};
use crate::core::segment::SegmentCodec;
use crate::core::serialization::SerializationFormat;
use crate::error::{RpcError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error};

/// Any bidirectional byte stream a codec can run over
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased stream handed to codec constructors
pub type Transport = Box<dyn AsyncStream>;

/// Read side of a codec
pub trait CodecReader: Send {
    /// Read the next header. A clean end-of-stream is [`RpcError::ConnectionClosed`].
    fn read_header(&mut self) -> BoxFuture<'_, Result<Header>>;

    /// Read the body that follows the last header.
    fn read_body(&mut self) -> BoxFuture<'_, Result<Body>>;
}

/// Write side of a codec
pub trait CodecWriter: Send {
    /// Write one complete frame and flush it.
    fn write<'a>(&'a mut self, header: &'a Header, body: &'a Body) -> BoxFuture<'a, Result<()>>;

    /// Flush and shut down the stream. Closing twice is a no-op.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// One connection's codec instance
pub struct Codec {
    format: SerializationFormat,
    reader: Box<dyn CodecReader>,
    writer: Box<dyn CodecWriter>,
}

impl Codec {
    pub fn new(
        format: SerializationFormat,
        reader: Box<dyn CodecReader>,
        writer: Box<dyn CodecWriter>,
    ) -> Self {
        Self {
            format,
            reader,
            writer,
        }
    }

    /// Format used for bodies on this connection
    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    pub async fn read_header(&mut self) -> Result<Header> {
        self.reader.read_header().await
    }

    pub async fn read_body(&mut self) -> Result<Body> {
        self.reader.read_body().await
    }

    pub async fn write(&mut self, header: &Header, body: &Body) -> Result<()> {
        self.writer.write(header, body).await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }

    /// Separate the read and write sides so they can be driven by different tasks
    pub fn into_split(self) -> (Box<dyn CodecReader>, Box<dyn CodecWriter>) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").field("format", &self.format).finish()
    }
}

/// Build the stock codec: length-prefixed segments, values encoded with `format`.
pub fn new_stream_codec(
    transport: Transport,
    format: SerializationFormat,
    max_frame_size: usize,
) -> Codec {
    let (read_half, write_half) = tokio::io::split(transport);
    let segments = SegmentCodec::new(max_frame_size);

    let reader = StreamReader {
        frames: FramedRead::new(read_half, segments),
        format,
    };
    let writer = StreamWriter {
        frames: FramedWrite::new(write_half, segments),
        format,
        closed: false,
    };

    Codec::new(format, Box::new(reader), Box::new(writer))
}

struct StreamReader {
    frames: FramedRead<ReadHalf<Transport>, SegmentCodec>,
    format: SerializationFormat,
}

impl StreamReader {
    async fn next_segment(&mut self) -> Result<Bytes> {
        match self.frames.next().await {
            Some(segment) => segment,
            None => Err(RpcError::ConnectionClosed),
        }
    }
}

impl CodecReader for StreamReader {
    fn read_header(&mut self) -> BoxFuture<'_, Result<Header>> {
        Box::pin(async move {
            let segment = self.next_segment().await?;
            self.format.from_bytes(&segment)
        })
    }

    fn read_body(&mut self) -> BoxFuture<'_, Result<Body>> {
        Box::pin(async move { self.next_segment().await.map(Body::from) })
    }
}

struct StreamWriter {
    frames: FramedWrite<WriteHalf<Transport>, SegmentCodec>,
    format: SerializationFormat,
    closed: bool,
}

impl StreamWriter {
    async fn encode_frame(&mut self, header: &Header, body: &Body) -> Result<()> {
        let header_bytes = self.format.to_bytes(header).inspect_err(|e| {
            error!(error = %e, seq = header.seq, "rpc codec: error encoding header");
        })?;
        self.frames.feed(Bytes::from(header_bytes)).await?;

        self.frames
            .feed(body.as_bytes().clone())
            .await
            .inspect_err(|e| {
                error!(error = %e, seq = header.seq, "rpc codec: error encoding body");
            })
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.frames.close().await
    }
}

impl CodecWriter for StreamWriter {
    fn write<'a>(&'a mut self, header: &'a Header, body: &'a Body) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.closed {
                return Err(RpcError::ConnectionClosed);
            }

            let encoded = self.encode_frame(header, body).await;
            let flushed = self.frames.flush().await;

            match encoded.and(flushed) {
                Ok(()) => Ok(()),
                Err(e) => {
                    if let Err(close_err) = self.shutdown().await {
                        debug!(error = %close_err, "rpc codec: shutdown after failed write");
                    }
                    Err(e)
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.shutdown())
    }
}
