//! Byte-level HTTP/1.1 framing.
//!
//! - [`HeaderParser`]: finds the end of a request header block across
//!   arbitrary read boundaries and enforces the header size limit
//! - [`parse_request_head`]: request line and header fields via `httparse`
//! - [`HeadEncoder`]: response status line and header block
//! - [`ChunkedEncoder`]: `Transfer-Encoding: chunked` body framing
//!
//! HTTP/2 framing is left to the `h2` crate.

mod chunked_encoder;
mod head_encoder;
mod header_parser;
mod request_head;

pub use chunked_encoder::ChunkedEncoder;
pub use head_encoder::{Framing, HeadEncoder, Http1Head, is_valid_reason};
pub use header_parser::{DEFAULT_MAX_HEADER_SIZE, HeaderChunk, HeaderParser};
pub use request_head::{MAX_HEADER_NUM, ParsedHead, parse_request_head};
