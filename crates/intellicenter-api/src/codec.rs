//! Line framing for the IntelliCenter wire protocol.
//!
//! Every message on the socket is a JSON object followed by `\r\n`. The
//! codec accumulates partial reads and yields one complete, non-empty line
//! at a time, in arrival order. A partial line is never yielded, not even
//! at end of stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// Two-byte message terminator.
pub const TERMINATOR: &[u8; 2] = b"\r\n";

/// Default cap on a single unterminated line (1 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// `\r\n`-delimited line codec with a maximum line length.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_length: usize,
    /// Offset already scanned for a terminator in the current buffer.
    next_index: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let found = src[self.next_index..]
                .windows(TERMINATOR.len())
                .position(|w| w == TERMINATOR);

            let Some(offset) = found else {
                // A '\r' at the very end may pair with a '\n' in the next read,
                // so it does not count toward the line yet.
                let pending_cr = usize::from(src.last() == Some(&TERMINATOR[0]));
                if src.len() - pending_cr > self.max_length {
                    return Err(Error::FrameTooLong {
                        len: src.len(),
                        max: self.max_length,
                    });
                }
                self.next_index = src.len().saturating_sub(1);
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;

            if end > self.max_length {
                return Err(Error::FrameTooLong {
                    len: end,
                    max: self.max_length,
                });
            }

            let line = src.split_to(end);
            src.advance(TERMINATOR.len());

            if line.is_empty() {
                continue;
            }

            return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            tracing::debug!(bytes = src.len(), "discarding unterminated data at end of stream");
            src.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<String> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + TERMINATOR.len());
        dst.put_slice(item.as_bytes());
        dst.put_slice(TERMINATOR);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
