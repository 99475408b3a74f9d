//! Incremental detection of the HTTP/1.1 header block terminator.
//!
//! [`HeaderParser`] accumulates socket reads until `\r\n\r\n` shows up, then
//! splits the buffered bytes into the header block (terminator included) and
//! whatever followed it. Each `append` only scans the newly arrived bytes plus
//! the three bytes before them, so feeding a header one byte at a time stays
//! linear in its size.
//!
//! If the configured maximum is exceeded before a terminator is found the
//! parser reports [`HeaderChunk::Overflow`]; the connection is expected to
//! answer `431` and close.

use bytes::{Bytes, BytesMut};

const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Default upper bound for a request header block.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderChunk {
    /// No terminator yet, more bytes are needed.
    Partial,
    /// A full header block. `remaining` holds bytes that followed it in the
    /// same read and belong to the body or the next pipelined request.
    Complete { header: Bytes, remaining: Bytes },
    /// The buffered header grew past the limit without a terminator.
    Overflow { size: usize },
}

impl HeaderChunk {
    pub fn is_overflow(&self) -> bool {
        matches!(self, HeaderChunk::Overflow { .. })
    }
}

#[derive(Debug)]
pub struct HeaderParser {
    buffer: BytesMut,
    scanned: usize,
    max_size: usize,
}

impl HeaderParser {
    pub fn new(max_size: usize) -> Self {
        Self { buffer: BytesMut::new(), scanned: 0, max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of bytes held while waiting for the terminator.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn append(&mut self, chunk: &[u8]) -> HeaderChunk {
        self.buffer.extend_from_slice(chunk);

        let start = self.scanned.saturating_sub(TERMINATOR.len() - 1);
        match find_terminator(&self.buffer[start..]) {
            Some(offset) => {
                let end = start + offset + TERMINATOR.len();
                if end > self.max_size {
                    self.reset();
                    return HeaderChunk::Overflow { size: end };
                }

                let header = self.buffer.split_to(end).freeze();
                let remaining = self.buffer.split().freeze();
                self.scanned = 0;
                HeaderChunk::Complete { header, remaining }
            }
            None if self.buffer.len() > self.max_size => {
                let size = self.buffer.len();
                self.reset();
                HeaderChunk::Overflow { size }
            }
            None => {
                self.scanned = self.buffer.len();
                HeaderChunk::Partial
            }
        }
    }

    /// Drops any partially buffered header.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADER_SIZE)
    }
}

fn find_terminator(bytes: &[u8]) -> Option<usize> {
    bytes.windows(TERMINATOR.len()).position(|window| window == TERMINATOR)
}
