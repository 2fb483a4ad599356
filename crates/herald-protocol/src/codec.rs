//! Codec for encoding and decoding Herald frames.
//!
//! Each frame on the stream is a 4-byte big-endian length prefix followed by
//! a MessagePack body with named fields. The prefix makes the encoding
//! self-framing, so a reader can split a byte stream into frames without
//! understanding their contents.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::{Frame, Payload};

/// Maximum frame body size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Upper bound for the bytes a message frame spends on everything but the
/// payload contents: the `type`, `sequence` and `payload` keys, the sequence
/// value, and the payload's variant key and length header.
const MESSAGE_FRAME_OVERHEAD: usize = 64;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Read the body length announced by a prefix, if enough bytes are present.
fn announced_len(data: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let Some(prefix) = data.get(..LENGTH_PREFIX_SIZE) else {
        return Ok(None);
    };
    let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }
    Ok(Some(length))
}

/// Check that `payload` fits in a message frame.
///
/// Returns the upper bound used for the frame body size. Text and binary
/// payloads are sized from their length; JSON payloads are encoded once.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if a message frame carrying the
/// payload could exceed [`MAX_FRAME_SIZE`], or an encoding error.
pub fn check_payload(payload: &Payload) -> Result<usize, ProtocolError> {
    let contents = match payload {
        Payload::Text(s) => s.len(),
        Payload::Binary(b) => b.len(),
        Payload::Json(_) => rmp_serde::to_vec_named(payload)?.len(),
    };

    let bound = contents.saturating_add(MESSAGE_FRAME_OVERHEAD);
    if bound > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(bound));
    }
    Ok(bound)
}

/// Encode a frame to bytes.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Append an encoded frame to an existing buffer.
///
/// On error the buffer is left untouched.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let body = rmp_serde::to_vec_named(frame)?;

    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);
    Ok(())
}

/// Decode exactly one frame from the start of `data`.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    let Some(length) = announced_len(data)? else {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    };

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    Ok(rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?)
}

/// Try to decode a frame from a read buffer, consuming it if complete.
///
/// Returns `Ok(None)` and leaves the buffer untouched when more bytes are
/// needed, which lets a reader accumulate partial frames across reads.
///
/// # Errors
///
/// Returns an error if the announced frame is too large or its body is invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let Some(length) = announced_len(buf)? else {
        return Ok(None);
    };

    if buf.len() < LENGTH_PREFIX_SIZE + length {
        buf.reserve(LENGTH_PREFIX_SIZE + length - buf.len());
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let body = buf.split_to(length);
    Ok(Some(rmp_serde::from_slice(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Message;
    use std::sync::Arc;

    #[test]
    fn test_encode_decode_frames() {
        let frames = vec![
            Frame::subscribe(),
            Frame::subscribe_from(12),
            Frame::message(Arc::new(Message::new(1, "HELLO # 1"))),
            Frame::message(Arc::new(Message::new(2, vec![0u8, 1, 2, 255]))),
            Frame::message(Arc::new(Message::new(
                3,
                serde_json::json!({"user": "ada", "tags": ["a", "b"]}),
            ))),
        ];

        for frame in frames {
            let encoded = encode(&frame).unwrap();
            assert_eq!(decode(&encoded).unwrap(), frame);
        }
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&Frame::subscribe()).unwrap();

        match decode(&encoded[..2]) {
            Err(ProtocolError::Incomplete(2)) => {}
            other => panic!("Expected Incomplete(2), got {:?}", other),
        }

        match decode(&encoded[..encoded.len() - 1]) {
            Err(ProtocolError::Incomplete(1)) => {}
            other => panic!("Expected Incomplete(1), got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let frame = Frame::message(Arc::new(Message::new(
            1,
            Payload::Binary(vec![0u8; MAX_FRAME_SIZE + 1]),
        )));

        match encode(&frame) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_prefix_rejected_before_body_arrives() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);

        assert!(matches!(
            decode_from(&mut buf),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_streaming_decode_across_partial_reads() {
        let first = Frame::message(Arc::new(Message::new(1, "one")));
        let second = Frame::message(Arc::new(Message::new(2, "two")));

        let mut wire = BytesMut::new();
        encode_into(&first, &mut wire).unwrap();
        encode_into(&second, &mut wire).unwrap();
        let wire = wire.freeze();

        // Feed the stream three bytes at a time.
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for chunk in wire.chunks(3) {
            buf.extend_from_slice(chunk);
            while let Some(frame) = decode_from(&mut buf).unwrap() {
                decoded.push(frame);
            }
        }

        assert_eq!(decoded, vec![first, second]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_garbage_body_is_a_decode_error() {
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.extend_from_slice(&[0xc1, 0xc1, 0xc1]);

        assert!(matches!(decode_from(&mut buf), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_checked_payload_always_encodes() {
        let largest = MAX_FRAME_SIZE - MESSAGE_FRAME_OVERHEAD;
        let payload = Payload::binary(vec![0u8; largest]);
        assert_eq!(check_payload(&payload).unwrap(), MAX_FRAME_SIZE);

        let frame = Frame::message(Arc::new(Message::new(u64::MAX, payload)));
        assert!(encode(&frame).is_ok());

        let text = Payload::text("x".repeat(largest));
        let frame = Frame::message(Arc::new(Message::new(u64::MAX, text)));
        assert!(encode(&frame).is_ok());
    }

    #[test]
    fn test_check_payload_rejects_oversized() {
        let payload = Payload::binary(vec![0u8; MAX_FRAME_SIZE]);
        assert!(matches!(
            check_payload(&payload),
            Err(ProtocolError::FrameTooLarge(_))
        ));

        let json = Payload::Json(serde_json::json!({"k": "v"}));
        assert!(check_payload(&json).unwrap() < 128);
    }
}
