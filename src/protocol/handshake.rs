//! Connection handshake: codec negotiation.
//!
//! Right after connecting, a client sends one [`NegotiationRecord`] as a line
//! of JSON:
//!
//! ```text
//! {"MagicNumber":3927901,"CodecType":"application/json"}\n
//! ```
//!
//! JSON is used because no codec exists yet; the record has to describe
//! itself. The server checks the magic number, looks the codec type up in its
//! [`CodecRegistry`] and wraps the rest of the stream in that codec. Any
//! failure is terminal for the connection and nothing is written back, since
//! there is no codec to write with.
//!
//! The record is read through a `BufReader` that then becomes the codec's
//! transport, so frames the client pipelined behind the record are not lost.

use crate::config::{MAGIC_NUMBER, MAX_HANDSHAKE_SIZE};
use crate::core::codec::{AsyncStream, Codec};
use crate::core::registry::{CodecRegistry, CodecType, NewCodecFn};
use crate::error::{constants, RpcError, Result};
use crate::utils::timeout::with_timeout_error;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, instrument};

/// First message on every connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    #[serde(rename = "MagicNumber")]
    pub magic_number: u64,
    #[serde(rename = "CodecType")]
    pub codec_type: CodecType,
}

impl NegotiationRecord {
    /// A record with the protocol magic number asking for `codec_type`
    pub fn new(codec_type: impl Into<CodecType>) -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: codec_type.into(),
        }
    }
}

impl Default for NegotiationRecord {
    fn default() -> Self {
        Self::new(CodecType::BINCODE)
    }
}

/// Read one newline-terminated negotiation record.
///
/// The record may also end at end-of-stream without a newline. Anything
/// longer than [`MAX_HANDSHAKE_SIZE`] is rejected.
pub async fn read_record<R>(reader: &mut R) -> Result<NegotiationRecord>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(128);
    let read = (&mut *reader)
        .take(MAX_HANDSHAKE_SIZE as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Err(RpcError::HandshakeError(
            constants::ERR_HANDSHAKE_EMPTY.to_string(),
        ));
    }
    if read == MAX_HANDSHAKE_SIZE && line.last() != Some(&b'\n') {
        return Err(RpcError::HandshakeError(
            constants::ERR_HANDSHAKE_TOO_LONG.to_string(),
        ));
    }

    serde_json::from_slice(&line)
        .map_err(|e| RpcError::HandshakeError(format!("malformed negotiation record: {e}")))
}

/// Validate a record against the protocol constant and the registry.
pub fn select_codec(record: &NegotiationRecord, codecs: &CodecRegistry) -> Result<NewCodecFn> {
    if record.magic_number != MAGIC_NUMBER {
        return Err(RpcError::InvalidMagicNumber(record.magic_number));
    }

    codecs
        .get(&record.codec_type)
        .ok_or_else(|| RpcError::UnsupportedCodec(record.codec_type.to_string()))
}

/// Server side: negotiate a codec on a freshly accepted stream.
///
/// On error the stream is dropped, which closes the connection.
#[instrument(level = "debug", skip_all)]
pub async fn accept<S: AsyncStream>(
    stream: S,
    codecs: &CodecRegistry,
    timeout: Duration,
) -> Result<Codec> {
    let mut reader = BufReader::new(stream);
    let record = with_timeout_error(read_record(&mut reader), timeout).await?;
    let constructor = select_codec(&record, codecs)?;

    debug!(codec = %record.codec_type, "rpc server: codec negotiated");
    Ok(constructor(Box::new(reader)))
}

/// Write `record` as one JSON line and flush it.
pub async fn write_record<W>(writer: &mut W, record: &NegotiationRecord) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line =
        serde_json::to_vec(record).map_err(|e| RpcError::SerializeError(e.to_string()))?;
    line.push(b'\n');

    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Client side: send `record` and wrap the stream in the matching codec.
///
/// The record is checked against `codecs` first, so a client never announces
/// a codec it cannot speak itself.
pub async fn connect<S: AsyncStream>(
    mut stream: S,
    record: &NegotiationRecord,
    codecs: &CodecRegistry,
) -> Result<Codec> {
    let constructor = select_codec(record, codecs)?;
    write_record(&mut stream, record).await?;
    Ok(constructor(Box::new(stream)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::core::frame::Header;
    use crate::core::segment::SegmentCodec;
    use crate::core::serialization::SerializationFormat;
    use bytes::{Bytes, BytesMut};
    use tokio::io::duplex;
    use tokio_util::codec::Encoder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_record_wire_shape() {
        let record = NegotiationRecord::new(CodecType::JSON);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"MagicNumber":3927901,"CodecType":"application/json"}"#);
    }

    #[tokio::test]
    async fn test_accept_keeps_pipelined_frame_bytes() {
        let (mut client, server) = duplex(64 * 1024);
        let format = SerializationFormat::Json;

        // Record and the first frame arrive in a single write.
        let mut wire = serde_json::to_vec(&NegotiationRecord::new(CodecType::JSON)).unwrap();
        wire.push(b'\n');
        let mut segments = BytesMut::new();
        let mut segment_codec = SegmentCodec::default();
        let header = Header::new("Foo.Sum", 0);
        segment_codec
            .encode(Bytes::from(format.to_bytes(&header).unwrap()), &mut segments)
            .unwrap();
        segment_codec
            .encode(Bytes::from(format.to_bytes("wire-rpc req 0").unwrap()), &mut segments)
            .unwrap();
        wire.extend_from_slice(&segments);
        client.write_all(&wire).await.unwrap();

        let mut codec = accept(server, &CodecRegistry::default(), TIMEOUT).await.unwrap();
        assert_eq!(codec.format(), format);
        assert_eq!(codec.read_header().await.unwrap(), header);
        let body = codec.read_body().await.unwrap();
        let arg: String = format.decode_body(&body).unwrap();
        assert_eq!(arg, "wire-rpc req 0");
    }

    #[tokio::test]
    async fn test_wrong_magic_number_rejected() {
        let (mut client, server) = duplex(1024);
        let record = NegotiationRecord {
            magic_number: 0xdead,
            codec_type: CodecType::JSON,
        };
        write_record(&mut client, &record).await.unwrap();

        let err = accept(server, &CodecRegistry::default(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidMagicNumber(0xdead)));
    }

    #[tokio::test]
    async fn test_unknown_codec_rejected() {
        let (mut client, server) = duplex(1024);
        write_record(&mut client, &NegotiationRecord::new("application/xml"))
            .await
            .unwrap();

        let err = accept(server, &CodecRegistry::default(), TIMEOUT).await.unwrap_err();
        match err {
            RpcError::UnsupportedCodec(name) => assert_eq!(name, "application/xml"),
            other => unreachable!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_record_rejected() {
        let (mut client, server) = duplex(1024);
        client.write_all(b"MagicNumber=3927901\n").await.unwrap();

        let err = accept(server, &CodecRegistry::default(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, RpcError::HandshakeError(_)));
    }

    #[tokio::test]
    async fn test_record_without_newline_at_eof_is_accepted() {
        let (mut client, server) = duplex(1024);
        client
            .write_all(br#"{"MagicNumber":3927901,"CodecType":"application/bincode"}"#)
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let codec = accept(server, &CodecRegistry::default(), TIMEOUT).await.unwrap();
        assert_eq!(codec.format(), SerializationFormat::Bincode);
    }

    #[tokio::test]
    async fn test_oversized_record_rejected() {
        let (mut client, server) = duplex(2 * MAX_HANDSHAKE_SIZE);
        client.write_all(&vec![b' '; MAX_HANDSHAKE_SIZE + 10]).await.unwrap();

        let err = accept(server, &CodecRegistry::default(), TIMEOUT).await.unwrap_err();
        match err {
            RpcError::HandshakeError(msg) => assert_eq!(msg, constants::ERR_HANDSHAKE_TOO_LONG),
            other => unreachable!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_rejected() {
        let (client, server) = duplex(1024);
        drop(client);

        let err = accept(server, &CodecRegistry::default(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, RpcError::HandshakeError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_times_out() {
        let (_client, server) = duplex(1024);
        let err = accept(server, &CodecRegistry::default(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout));
    }

    #[tokio::test]
    async fn test_connect_refuses_unregistered_codec_locally() {
        let (client, _server) = duplex(1024);
        let err = connect(client, &NegotiationRecord::new("application/xml"), &CodecRegistry::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::UnsupportedCodec(_)));
    }
}
