//! Length-prefixed segment framing.
//!
//! ```text
//! [Length(4, big-endian)] [Payload(N)]
//! ```
//!
//! A frame on the wire is two segments: the encoded header, then the encoded
//! body. The length is validated against the configured maximum before any
//! payload is buffered.

use crate::config::MAX_FRAME_SIZE;
use crate::error::{constants, RpcError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Tokio codec for one length-prefixed segment
#[derive(Debug, Clone, Copy)]
pub struct SegmentCodec {
    max_segment_size: usize,
}

impl SegmentCodec {
    pub fn new(max_segment_size: usize) -> Self {
        Self { max_segment_size }
    }

    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }
}

impl Default for SegmentCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for SegmentCodec {
    type Item = Bytes;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, RpcError> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_segment_size {
            return Err(RpcError::OversizedFrame(len));
        }

        let total = LENGTH_PREFIX_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, RpcError> {
        match self.decode(src)? {
            Some(segment) => Ok(Some(segment)),
            None if src.is_empty() => Ok(None),
            None => Err(RpcError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                constants::ERR_TRAILING_BYTES,
            ))),
        }
    }
}

impl Encoder<Bytes> for SegmentCodec {
    type Error = RpcError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), RpcError> {
        if item.len() > self.max_segment_size {
            return Err(RpcError::OversizedFrame(item.len()));
        }

        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_writes_big_endian_prefix() {
        let mut codec = SegmentCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"abc"), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_partial_segment_waits_for_more_bytes() {
        let mut codec = SegmentCodec::default();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 5, 1, 2][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[3, 4, 5]);
        let segment = codec.decode(&mut buf).unwrap().expect("complete segment");
        assert_eq!(&segment[..], &[1, 2, 3, 4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_two_segments_in_one_buffer() {
        let mut codec = SegmentCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"header"), &mut buf).unwrap();
        codec.encode(Bytes::new(), &mut buf).unwrap();

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"header");
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_length_rejected_before_buffering() {
        let mut codec = SegmentCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.put_u32(20_000_000);
        buf.extend_from_slice(&[0xFF; 10]);

        match codec.decode(&mut buf) {
            Err(RpcError::OversizedFrame(20_000_000)) => {}
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_oversized_item_rejected_on_encode() {
        let mut codec = SegmentCodec::new(4);
        let mut buf = BytesMut::new();
        let result = codec.encode(Bytes::from_static(b"too long"), &mut buf);
        assert!(matches!(result, Err(RpcError::OversizedFrame(8))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_segment_at_eof_is_unexpected_eof() {
        let mut codec = SegmentCodec::default();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 9, 1][..]);
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_clean_eof_yields_none() {
        let mut codec = SegmentCodec::default();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
