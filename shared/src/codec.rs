//! Newline-delimited JSON framing
//!
//! All messages are framed as:
//! ```text
//! [ N bytes: transport payload (no raw b'\n') ][ 1 byte: b'\n' ]
//! ```
//!
//! This ensures message boundaries are preserved over TCP streams.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use thiserror::Error;

/// Maximum frame size (1 MB) to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur while encoding or framing
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("JSON encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serialize a message into its logical payload bytes
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes, CodecError> {
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(payload.len()));
    }
    Ok(Bytes::from(payload))
}

/// Wrap transport bytes into a single delimited wire frame
pub fn frame(transport_bytes: &[u8]) -> Result<Bytes, CodecError> {
    if transport_bytes.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(transport_bytes.len()));
    }
    let mut buf = BytesMut::with_capacity(transport_bytes.len() + 1);
    buf.extend_from_slice(transport_bytes);
    buf.put_u8(b'\n');
    Ok(buf.freeze())
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

    /// Pop the next complete frame, without its delimiter.
    ///
    /// Returns `Ok(None)` when more data is needed. Empty lines are
    /// skipped; CRLF peers are tolerated.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, CodecError> {
        loop {
            match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let mut line = self.buffer.split_to(pos + 1);
                    line.truncate(pos);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(line.freeze()));
                }
                None => {
                    if self.buffer.len() > MAX_FRAME_SIZE {
                        return Err(CodecError::FrameTooLarge(self.buffer.len()));
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandState, CommandUpdate, OutboundMessage};

    fn create_test_message() -> OutboundMessage {
        OutboundMessage::update(
            CommandUpdate::new(1, CommandState::Preparing).with("status", "Pointing Antennas"),
        )
    }

    #[test]
    fn encode_frame_decode_roundtrip() {
        let original = create_test_message();

        let payload = encode(&original).expect("encode failed");
        let framed = frame(&payload).expect("frame failed");
        assert_eq!(framed.last(), Some(&b'\n'));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&framed);
        let decoded_bytes = decoder
            .next_frame()
            .expect("decode failed")
            .expect("no frame");
        let decoded: OutboundMessage = serde_json::from_slice(&decoded_bytes).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn partial_frame_needs_more_data() {
        let payload = encode(&create_test_message()).unwrap();
        let framed = frame(&payload).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&framed[..5]);
        assert!(decoder.next_frame().expect("decode error").is_none());

        decoder.extend(&framed[5..]);
        assert!(decoder.next_frame().expect("decode error").is_some());
    }

    #[test]
    fn multiple_frames_decode_in_order() {
        let first = frame(&encode(&OutboundMessage::completed(1, "a")).unwrap()).unwrap();
        let second = frame(&encode(&OutboundMessage::completed(2, "b")).unwrap()).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&first);
        decoder.extend(&second);

        let one: OutboundMessage =
            serde_json::from_slice(&decoder.next_frame().unwrap().unwrap()).unwrap();
        let two: OutboundMessage =
            serde_json::from_slice(&decoder.next_frame().unwrap().unwrap()).unwrap();
        assert_eq!(one, OutboundMessage::completed(1, "a"));
        assert_eq!(two, OutboundMessage::completed(2, "b"));
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_and_crlf_lines_are_tolerated() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"\n\r\n{\"x\":1}\r\n");
        let frame_bytes = decoder.next_frame().unwrap().unwrap();
        assert_eq!(&frame_bytes[..], b"{\"x\":1}");
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let big = vec![b'a'; MAX_FRAME_SIZE + 1];
        assert!(matches!(frame(&big), Err(CodecError::FrameTooLarge(_))));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&big);
        assert!(matches!(
            decoder.next_frame(),
            Err(CodecError::FrameTooLarge(_))
        ));
    }
}
