//! Line-based IRC codec for tokio.
//!
//! Reads newline-terminated lines into [`Message`]s and writes messages
//! CRLF-terminated. Lines are limited to 512 bytes per the IRC standard;
//! unparseable lines are skipped rather than killing the connection, since
//! announce channels carry plenty of chatter.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use super::transport::TransportError;
use super::wire::Message;

/// Maximum IRC line length including CRLF.
pub const MAX_LINE_LEN: usize = 512;

/// Newline-delimited [`Message`] codec.
pub struct IrcCodec {
    /// Index of next byte to check for newline.
    next_index: usize,
    max_len: usize,
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl IrcCodec {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: MAX_LINE_LEN,
        }
    }

    #[cfg(test)]
    fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, TransportError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                // No complete line yet; remember where we stopped.
                self.next_index = src.len();
                if src.len() > self.max_len {
                    return Err(TransportError::MessageTooLong {
                        limit: self.max_len,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(TransportError::MessageTooLong {
                    limit: self.max_len,
                });
            }

            let text = String::from_utf8_lossy(&line);
            match text.parse::<Message>() {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    // Skip and keep reading.
                    trace!(line = %text.trim_end(), error = %e, "skipping unparseable line");
                }
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = TransportError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), TransportError> {
        let line = message.to_string();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
