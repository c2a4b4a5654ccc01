//! Incremental JSON Codec
//!
//! The stream carries JSON objects back to back with no length prefix, so
//! the decoder has to find where one command ends by parsing it. Like any
//! stream parser it reports one of three outcomes:
//!
//! - `Ok(Some((command, consumed)))` - a full command, `consumed` bytes used
//! - `Ok(None)` - the buffer holds only part of a command (or only whitespace)
//! - `Err(DecodeError)` - the bytes can never become a valid command
//!
//! The caller appends socket data to a buffer, calls [`CommandDecoder::decode`],
//! and advances the buffer by `consumed` on success.

use crate::protocol::types::{Command, Response};
use thiserror::Error;

/// Errors that can occur while decoding a command.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a JSON command object
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Decoder for the back-to-back JSON command stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandDecoder;

impl CommandDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to decode one command from the front of `buf`.
    pub fn decode(&self, buf: &[u8]) -> DecodeResult<Option<(Command, usize)>> {
        let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Command>();

        match stream.next() {
            None => Ok(None),
            Some(Ok(command)) => Ok(Some((command, stream.byte_offset()))),
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(DecodeError::Malformed(e)),
        }
    }
}

/// Serializes a response, terminated by a newline.
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + response.value.len());
    encode_response_into(response, &mut buf);
    buf
}

/// Appends a serialized response to `buf`.
pub fn encode_response_into(response: &Response, buf: &mut Vec<u8>) {
    // Serializing a struct of strings and integers into a Vec cannot fail.
    if serde_json::to_writer(&mut *buf, response).is_ok() {
        buf.push(b'\n');
    }
}

/// Serializes a command the way a client would send it.
pub fn encode_command(command: &Command) -> Vec<u8> {
    let mut buf = serde_json::to_vec(command).unwrap_or_default();
    buf.push(b'\n');
    buf
}
