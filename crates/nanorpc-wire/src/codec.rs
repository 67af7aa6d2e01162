use std::marker::PhantomData;

use bytes::{Buf, Bytes, BytesMut};
use prost::Message;
use tokio_util::codec::Decoder;

use crate::error::WireError;
use crate::varint::{decode_varint, encode_varint};

/// Largest payload length the wire format can carry (`i32::MAX`), per the
/// "messages larger than 2^31-1 bytes" non-goal.
pub const MAX_FRAME_LEN: u64 = i32::MAX as u64;

/// Encodes `msg` as a length-delimited frame: `varint(len) || payload`.
pub fn encode_frame<M: Message>(msg: &M) -> Result<Bytes, WireError> {
    let payload_len = msg.encoded_len();
    if payload_len as u64 > MAX_FRAME_LEN {
        return Err(WireError::LengthOverflow {
            declared: payload_len as u64,
        });
    }
    let mut out = Vec::with_capacity(payload_len + 5);
    encode_varint(payload_len as u64, &mut out);
    msg.encode(&mut out)?;
    Ok(Bytes::from(out))
}

/// The `bufio.Scanner`-style split function used by buffered readers.
///
/// Returns the *entire* frame — varint length prefix and payload together —
/// so callers can hand it straight to [`decode_message`]:
/// - `(0, None)` if the varint is incomplete and `at_eof` is `false`
///   (request more data).
/// - `(total_len, Some(buf[0..total_len]))` once a full frame is buffered.
/// - `Err(WireError::LengthOverflow)` if the declared size exceeds
///   `i32::MAX`.
/// - `Err(WireError::UnexpectedEof)` if `at_eof` is `true` and the buffer
///   holds a partial varint or a partial payload.
pub fn split_frame(buf: &[u8], at_eof: bool) -> Result<(usize, Option<Bytes>), WireError> {
    let Some((len, varint_len)) = decode_varint(buf) else {
        return if at_eof {
            if buf.is_empty() {
                Ok((0, None))
            } else {
                Err(WireError::UnexpectedEof)
            }
        } else {
            Ok((0, None))
        };
    };

    if len > MAX_FRAME_LEN {
        return Err(WireError::LengthOverflow { declared: len });
    }

    let total_len = varint_len + len as usize;
    if buf.len() < total_len {
        return if at_eof {
            Err(WireError::UnexpectedEof)
        } else {
            Ok((0, None))
        };
    }

    let frame = Bytes::copy_from_slice(&buf[..total_len]);
    Ok((total_len, Some(frame)))
}

/// Decodes a message out of a full frame returned by [`split_frame`]
/// (varint length prefix followed by payload).
///
/// Returns the decoded message and the number of bytes consumed, which
/// always equals `frame.len()` — exposed separately so callers streaming
/// multiple frames out of one buffer don't have to recompute it.
pub fn decode_message<M: Message + Default>(frame: Bytes) -> Result<(M, usize), WireError> {
    let consumed = frame.len();
    let (_len, varint_len) = decode_varint(&frame).expect("split_frame already validated this");
    let payload = frame.slice(varint_len..);
    Ok((M::decode(payload)?, consumed))
}

/// A [`Decoder`] that splits length-delimited frames and decodes each one
/// into `M`. Generic over the message type so the same codec drives both
/// the server's `Request` stream and the client's `Response` stream.
pub struct FrameCodec<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> FrameCodec<M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for FrameCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Decoder for FrameCodec<M>
where
    M: Message + Default,
{
    type Item = M;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<M>, WireError> {
        let (advance, frame) = split_frame(src, false)?;
        let Some(frame) = frame else {
            return Ok(None);
        };
        src.advance(advance);
        let (msg, _consumed) = decode_message(frame)?;
        Ok(Some(msg))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<M>, WireError> {
        let (advance, frame) = split_frame(src, true)?;
        let Some(frame) = frame else {
            return Ok(None);
        };
        src.advance(advance);
        let (msg, _consumed) = decode_message(frame)?;
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{Request, Response, ResponseStatus};

    #[test]
    fn split_requests_more_data_on_incomplete_varint() {
        // A continuation byte with nothing after it: incomplete.
        let buf = [0x80];
        let (advance, frame) = split_frame(&buf, false).unwrap();
        assert_eq!(advance, 0);
        assert!(frame.is_none());
    }

    #[test]
    fn split_requests_more_data_on_incomplete_payload() {
        // Declares a 4-byte payload but only 2 bytes follow.
        let buf = [0x04, 0x08, 0x2a];
        let (advance, frame) = split_frame(&buf, false).unwrap();
        assert_eq!(advance, 0);
        assert!(frame.is_none());
    }

    #[test]
    fn ping_wire_bytes_match_spec_s1() {
        // S1: PING{request_id=42} -> 0x04 0x08 0x2A 0x10 0x01
        let req = Request::ping(42);
        let encoded = encode_frame(&req).unwrap();
        assert_eq!(encoded.as_ref(), &[0x04, 0x08, 0x2A, 0x10, 0x01]);
    }

    #[test]
    fn pong_wire_bytes_match_spec_s1() {
        // S1: PONG{request_id=42, status=OK} -> 0x06 0x08 0x2A 0x10 0x01 0x18 0x01
        let resp = Response::pong(42);
        let encoded = encode_frame(&resp).unwrap();
        assert_eq!(
            encoded.as_ref(),
            &[0x06, 0x08, 0x2A, 0x10, 0x01, 0x18, 0x01]
        );
    }

    #[test]
    fn split_returns_full_frame_at_boundary() {
        let req = Request::ping(42);
        let encoded = encode_frame(&req).unwrap();
        let (advance, frame) = split_frame(&encoded, false).unwrap();
        assert_eq!(advance, encoded.len());
        assert_eq!(frame.unwrap(), encoded);
    }

    #[test]
    fn split_never_reads_past_frame_boundary() {
        let req = Request::ping(42);
        let encoded = encode_frame(&req).unwrap();
        let mut buf = encoded.to_vec();
        buf.extend_from_slice(b"next frame garbage");
        let (advance, frame) = split_frame(&buf, false).unwrap();
        assert_eq!(advance, encoded.len());
        assert_eq!(frame.unwrap(), encoded);
    }

    #[test]
    fn decode_message_consumes_whole_frame() {
        let req = Request::ping(42);
        let encoded = encode_frame(&req).unwrap();
        let (advance, frame) = split_frame(&encoded, false).unwrap();
        let (decoded, consumed): (Request, usize) = decode_message(frame.unwrap()).unwrap();
        assert_eq!(decoded, req);
        assert_eq!(consumed, advance);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn split_rejects_oversized_length() {
        let mut buf = Vec::new();
        encode_varint(MAX_FRAME_LEN + 1, &mut buf);
        let err = split_frame(&buf, false).unwrap_err();
        assert!(matches!(err, WireError::LengthOverflow { .. }));
    }

    #[test]
    fn split_errors_on_partial_frame_at_eof() {
        let buf = [0x04, 0x08, 0x2a];
        let err = split_frame(&buf, true).unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEof));
    }

    #[test]
    fn split_empty_at_eof_is_clean_end() {
        let (advance, frame) = split_frame(&[], true).unwrap();
        assert_eq!(advance, 0);
        assert!(frame.is_none());
    }

    #[test]
    fn codec_round_trip_request() {
        let req = Request::ping(42);
        let encoded = encode_frame(&req).unwrap();

        let mut codec = FrameCodec::<Request>::new();
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, req);
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_streams_multiple_frames_from_one_buffer() {
        let a = Response::pong(1);
        let b = Response::error(2, ResponseStatus::NotFound, "nope");

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(&a).unwrap());
        buf.extend_from_slice(&encode_frame(&b).unwrap());

        let mut codec = FrameCodec::<Response>::new();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, a);
        assert_eq!(second, b);
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_decode_round_trip_preserves_bytes_consumed() {
        let req = Request {
            request_id: 7,
            request_type: crate::proto::RequestType::Request as i32,
            path_oneof: Some(crate::proto::request::PathOneof::Path("/a/b".into())),
            data: vec![1, 2, 3],
        };
        let encoded = encode_frame(&req).unwrap();
        let mut buf = BytesMut::from(&encoded[..]);
        let mut codec = FrameCodec::<Request>::new();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, req);
    }
}
