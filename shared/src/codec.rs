//! Length-prefixed codec for TCP framing
//!
//! All messages are framed as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: JSON WireMessage ]
//! ```
//!
//! Framing and JSON decoding are separate steps: a frame with a malformed
//! body is a protocol error for that one message, while a bad length
//! prefix leaves the stream unrecoverable.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::WireMessage;

/// Maximum frame body size (1 MB)
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Invalid message length prefix: {0}")]
    InvalidLength(u32),

    #[error("JSON encode error: {0}")]
    EncodeError(#[source] serde_json::Error),

    #[error("JSON decode error: {0}")]
    DecodeError(#[source] serde_json::Error),
}

/// Encode a message into a length-prefixed byte buffer
pub fn encode(message: &WireMessage) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a message directly into a provided buffer
pub fn encode_into(message: &WireMessage, buf: &mut BytesMut) -> Result<(), CodecError> {
    let body = serde_json::to_vec(message).map_err(CodecError::EncodeError)?;

    if body.len() > MAX_MESSAGE_SIZE as usize {
        return Err(CodecError::MessageTooLarge(body.len()));
    }

    buf.reserve(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);

    Ok(())
}

/// Try to split one complete frame body off the front of a buffer
///
/// Returns:
/// - `Ok(Some(body))` if a complete frame was available
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the length prefix is invalid
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
    // Need at least 4 bytes for the length prefix
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let msg_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if msg_len > MAX_MESSAGE_SIZE {
        return Err(CodecError::InvalidLength(msg_len));
    }

    let total_len = 4 + msg_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    Ok(Some(buf.split_to(msg_len as usize).freeze()))
}

/// Parse a frame body into a message
pub fn decode_message(body: &[u8]) -> Result<WireMessage, CodecError> {
    serde_json::from_slice(body).map_err(CodecError::DecodeError)
}

/// Decoder state machine for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame body from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next(&mut self) -> Result<Option<Bytes>, CodecError> {
        decode_frame(&mut self.buffer)
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandType, RequestId};
    use serde_json::json;

    fn create_test_message() -> WireMessage {
        WireMessage::request(
            CommandType::ExecuteMeasurement,
            RequestId::from("20240425123045123"),
            Some(json!({"mode": "standard", "precision": "high"})),
        )
    }

    #[test]
    fn test_length_prefix_matches_body() {
        let encoded = encode(&create_test_message()).expect("encode failed");

        let len_prefix = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len_prefix as usize, encoded.len() - 4);

        let mut buf = BytesMut::from(&encoded[..]);
        let body = decode_frame(&mut buf).expect("decode failed").expect("no frame");
        let decoded = decode_message(&body).expect("bad json");
        assert_eq!(decoded, create_test_message());
        assert!(buf.is_empty(), "buffer should be empty after decode");
    }

    #[test]
    fn test_partial_decode() {
        let encoded = encode(&create_test_message()).expect("encode failed");

        let mut buf = BytesMut::from(&encoded[..5]);
        let result = decode_frame(&mut buf).expect("decode should not fail on partial data");
        assert!(result.is_none(), "should return None for partial data");

        // Buffer should be unchanged (data not consumed)
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_frame_decoder_chunks_and_multiple_frames() {
        let encoded = encode(&create_test_message()).expect("encode failed");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded[..3]);
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(&encoded[3..]);
        decoder.extend(&encoded);

        assert!(decoder.decode_next().expect("decode error").is_some());
        assert!(decoder.decode_next().expect("decode error").is_some());
        assert!(decoder.decode_next().expect("decode error").is_none());
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_message_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_MESSAGE_SIZE + 1);
        buf.put_bytes(0, 100);

        let result = decode_frame(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidLength(_))));
    }

    #[test]
    fn test_malformed_body_is_isolated() {
        let mut buf = BytesMut::new();
        buf.put_u32(8);
        buf.put_slice(b"not json");
        buf.extend_from_slice(&encode(&create_test_message()).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf);

        let first = decoder.decode_next().unwrap().unwrap();
        assert!(matches!(decode_message(&first), Err(CodecError::DecodeError(_))));

        let second = decoder.decode_next().unwrap().unwrap();
        assert!(decode_message(&second).is_ok());
    }
}
