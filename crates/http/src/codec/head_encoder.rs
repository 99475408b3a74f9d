//! HTTP/1.1 response head serialization.
//!
//! Status lines and `content-length` lines are formatted once per distinct
//! value and cached, the rest of the head is copied straight from the
//! response's [`HeaderCollection`]. Framing headers (`content-length`,
//! `transfer-encoding`, `connection`) are always written by the encoder, so
//! user supplied values for them are skipped.

use std::collections::HashMap;
use std::io;
use std::io::Write;
use std::sync::{PoisonError, RwLock};

use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderValue, StatusCode, header};
use once_cell::sync::Lazy;
use tokio_util::codec::Encoder;

use crate::protocol::HeaderCollection;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Cached `content-length` lines are kept for bodies up to this size.
const CONTENT_LENGTH_CACHE_LIMIT: u64 = 4096;

static STATUS_LINES: Lazy<RwLock<HashMap<u16, Bytes>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static CONTENT_LENGTH_LINES: Lazy<RwLock<HashMap<u64, Bytes>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// How the body following the head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Length(u64),
    Chunked,
}

/// Everything needed to write one response head.
#[derive(Debug)]
pub struct Http1Head<'a> {
    pub status: StatusCode,
    /// Custom reason phrase; the canonical one is used when absent.
    pub reason: Option<&'a str>,
    pub headers: &'a HeaderCollection,
    pub connection_close: bool,
    pub framing: Framing,
    /// `Date` value added when the headers carry none.
    pub date: Option<HeaderValue>,
}

#[derive(Debug, Default)]
pub struct HeadEncoder;

impl Encoder<Http1Head<'_>> for HeadEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: Http1Head<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);

        match item.reason.filter(|reason| is_valid_reason(reason)) {
            Some(reason) => write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", item.status.as_str(), reason)?,
            None => dst.put_slice(&status_line(item.status)),
        }

        for (name, value) in item.headers.iter() {
            if *name == header::CONTENT_LENGTH || *name == header::TRANSFER_ENCODING || *name == header::CONNECTION {
                continue;
            }
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }

        if let Some(date) = item.date {
            if !item.headers.contains(header::DATE.as_str()) {
                dst.put_slice(b"date: ");
                dst.put_slice(date.as_bytes());
                dst.put_slice(b"\r\n");
            }
        }

        match item.framing {
            Framing::Length(length) => dst.put_slice(&content_length_line(length)),
            Framing::Chunked => dst.put_slice(b"transfer-encoding: chunked\r\n"),
        }

        if item.connection_close {
            dst.put_slice(b"connection: close\r\n\r\n");
        } else {
            dst.put_slice(b"connection: keep-alive\r\n\r\n");
        }
        Ok(())
    }
}

fn status_line(status: StatusCode) -> Bytes {
    if let Some(line) = STATUS_LINES.read().unwrap_or_else(PoisonError::into_inner).get(&status.as_u16()) {
        return line.clone();
    }

    let reason = status.canonical_reason().unwrap_or("Unknown");
    let line = Bytes::from(format!("HTTP/1.1 {} {}\r\n", status.as_str(), reason));
    STATUS_LINES.write().unwrap_or_else(PoisonError::into_inner).insert(status.as_u16(), line.clone());
    line
}

fn content_length_line(length: u64) -> Bytes {
    if length > CONTENT_LENGTH_CACHE_LIMIT {
        return Bytes::from(format!("content-length: {length}\r\n"));
    }

    if let Some(line) = CONTENT_LENGTH_LINES.read().unwrap_or_else(PoisonError::into_inner).get(&length) {
        return line.clone();
    }

    let line = Bytes::from(format!("content-length: {length}\r\n"));
    CONTENT_LENGTH_LINES.write().unwrap_or_else(PoisonError::into_inner).insert(length, line.clone());
    line
}

/// Fast writer implementation for writing to BytesMut.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Whether `reason` may appear in a status line: HTAB, SP, visible ASCII and obs-text.
pub fn is_valid_reason(reason: &str) -> bool {
    reason.bytes().all(|b| b == b'\t' || b == b' ' || (0x21..=0x7e).contains(&b) || b >= 0x80)
}
