//! Newline framing for the server's stdio streams.
//!
//! [`LineCodec`] is used for all three pipes: [`tokio_util::codec::FramedWrite`]
//! over stdin, [`tokio_util::codec::FramedRead`] over stdout and stderr.
//!
//! Decoding is lossy: bytes that are not valid UTF-8 are replaced with
//! `U+FFFD` instead of failing the stream, because servers routinely print
//! arbitrary bytes on stderr. A trailing `\r` is stripped so servers that
//! write CRLF line endings frame the same way as LF ones.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{AppError, Result};

/// Default line limit: 64 MiB.
///
/// Large enough for base64 resource blobs. A longer line is reported as
/// [`Line::Truncated`] and the remainder up to the terminating newline is
/// dropped. The decoder never fails on content, since
/// [`tokio_util::codec::FramedRead`] ends the stream after the first decoder
/// error.
pub const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A whole line, without its terminator.
    Complete(String),
    /// The first `limit` bytes of a line that exceeded the limit.
    Truncated {
        /// Decoded prefix of the line.
        head: String,
        /// Limit in force when the line was cut.
        limit: usize,
    },
}

/// Line codec for JSON-RPC over stdio.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes already scanned for a newline in the current buffer.
    next_index: usize,
    /// Inside an over-long line; drop bytes until the next newline.
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    /// Configured line limit in bytes.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let read_to = src.len().min(self.max_length.saturating_add(1));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(idx)) => {
                    src.advance(idx + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(idx)) => {
                    self.next_index = 0;
                    let line = src.split_to(idx + 1);
                    return Ok(Some(Line::Complete(decode_line(&line[..idx]))));
                }
                (false, None) if src.len() > self.max_length => {
                    self.discarding = true;
                    self.next_index = 0;
                    let head = src.split_to(self.max_length);
                    return Ok(Some(Line::Truncated {
                        head: decode_line(&head),
                        limit: self.max_length,
                    }));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if self.discarding || src.is_empty() {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }
        // Final line without a trailing newline.
        let rest = src.split_to(src.len());
        Ok(Some(Line::Complete(decode_line(&rest))))
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
