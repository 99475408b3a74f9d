//! Turns a complete header block into a [`RequestHead`].
//!
//! The block handed in is exactly what [`HeaderParser`](super::HeaderParser)
//! produced, terminator included, so `httparse` is expected to return
//! `Complete`; anything else is a malformed request.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Version, header};
use httparse::{EMPTY_HEADER, Error, Status};
use tracing::trace;

use crate::ensure;
use crate::protocol::{HeaderCollection, ParseError, RequestHead};

/// Maximum number of headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Request head plus the framing facts the connection needs.
#[derive(Debug)]
pub struct ParsedHead {
    pub head: RequestHead,
    /// Declared `Content-Length`; missing or unparsable values count as zero.
    pub content_length: u64,
    pub keep_alive: bool,
    pub expect_continue: bool,
    pub chunked: bool,
}

pub fn parse_request_head(block: &Bytes) -> Result<ParsedHead, ParseError> {
    let mut headers = [EMPTY_HEADER; MAX_HEADER_NUM];
    let mut req = httparse::Request::new(&mut headers);

    let status = req.parse(block).map_err(|e| match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        Error::Version => ParseError::InvalidVersion(None),
        e => ParseError::invalid_header(e.to_string()),
    })?;
    let Status::Complete(body_offset) = status else {
        return Err(ParseError::invalid_header("incomplete header block"));
    };
    trace!(header_size = body_offset, "parsed request head");

    let version = match req.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        v => return Err(ParseError::InvalidVersion(v)),
    };

    let method = req.method.ok_or(ParseError::InvalidMethod)?;
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;

    let path = req.path.ok_or(ParseError::InvalidUri)?;
    ensure!(!path.is_empty(), ParseError::InvalidUri);

    let mut collection = HeaderCollection::with_capacity(req.headers.len());
    for h in req.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(h.value).map_err(ParseError::invalid_header)?;
        collection.push(name, value);
    }

    let content_length = collection
        .get_str(header::CONTENT_LENGTH.as_str())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let keep_alive = is_keep_alive(version, &collection);
    let expect_continue = collection
        .get(header::EXPECT.as_str())
        .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"));
    let chunked = is_chunked(collection.get(header::TRANSFER_ENCODING.as_str()));

    Ok(ParsedHead {
        head: RequestHead { method, path: path.to_owned(), version, headers: collection },
        content_length,
        keep_alive,
        expect_continue,
        chunked,
    })
}

/// HTTP/1.1 defaults to keep-alive, HTTP/1.0 to close; an explicit
/// `Connection` token overrides the default.
fn is_keep_alive(version: Version, headers: &HeaderCollection) -> bool {
    let mut keep_alive = version == Version::HTTP_11;
    for value in headers.get_all(header::CONNECTION.as_str()) {
        for token in value.as_bytes().split(|b| *b == b',').map(<[u8]>::trim_ascii) {
            if token.eq_ignore_ascii_case(b"close") {
                return false;
            }
            if token.eq_ignore_ascii_case(b"keep-alive") {
                keep_alive = true;
            }
        }
    }
    keep_alive
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// According to RFC 7230, chunked must be the last encoding if present.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next() {
            return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn block(text: &str) -> Bytes {
        Bytes::from(text.replace('\n', "\r\n"))
    }

    #[test]
    fn check_is_chunked() {
        assert!(!is_chunked(None));
        assert!(is_chunked(Some(&HeaderValue::from_static("gzip, chunked"))));
        assert!(!is_chunked(Some(&HeaderValue::from_static("chunked, gzip"))));
        assert!(!is_chunked(Some(&HeaderValue::from_static("gzip"))));
    }

    #[test]
    fn from_curl() {
        let parsed = parse_request_head(&block(indoc! {"
            GET /index.html?a=1 HTTP/1.1
            Host: 127.0.0.1:8080
            User-Agent: curl/7.79.1
            Accept: */*

            "}))
        .unwrap();

        assert_eq!(parsed.head.method, Method::GET);
        assert_eq!(parsed.head.path, "/index.html?a=1");
        assert_eq!(parsed.head.version, Version::HTTP_11);
        assert_eq!(parsed.head.headers.len(), 3);
        assert_eq!(parsed.head.headers.get_str("host"), Some("127.0.0.1:8080"));
        assert_eq!(parsed.content_length, 0);
        assert!(parsed.keep_alive);
        assert!(!parsed.expect_continue);
        assert!(!parsed.chunked);
    }

    #[test]
    fn post_with_body_and_expect() {
        let parsed = parse_request_head(&block(indoc! {"
            POST /upload HTTP/1.1
            Host: example.com
            Content-Length: 42
            Expect: 100-Continue
            Connection: keep-alive, Upgrade

            "}))
        .unwrap();

        assert_eq!(parsed.head.method, Method::POST);
        assert_eq!(parsed.content_length, 42);
        assert!(parsed.expect_continue);
        assert!(parsed.keep_alive);
    }

    #[test]
    fn invalid_content_length_counts_as_zero() {
        let parsed = parse_request_head(&block("POST / HTTP/1.1\nContent-Length: lots\n\n")).unwrap();
        assert_eq!(parsed.content_length, 0);
    }

    #[test]
    fn connection_close_and_http10_defaults() {
        let close = parse_request_head(&block("GET / HTTP/1.1\nConnection: close\n\n")).unwrap();
        assert!(!close.keep_alive);

        let http10 = parse_request_head(&block("GET / HTTP/1.0\n\n")).unwrap();
        assert_eq!(http10.head.version, Version::HTTP_10);
        assert!(!http10.keep_alive);

        let http10_keep = parse_request_head(&block("GET / HTTP/1.0\nConnection: Keep-Alive\n\n")).unwrap();
        assert!(http10_keep.keep_alive);
    }

    #[test]
    fn chunked_request_is_flagged() {
        let parsed = parse_request_head(&block("POST / HTTP/1.1\nTransfer-Encoding: chunked\n\n")).unwrap();
        assert!(parsed.chunked);
    }

    #[test]
    fn malformed_request_line_is_rejected() {
        assert!(parse_request_head(&block("GET\n\n")).is_err());
        assert!(parse_request_head(&block("GET / HTTP/2.0\n\n")).is_err());
        assert!(parse_request_head(&block("GET / HTTP/1.1\nbad header\n\n")).is_err());
    }

    #[test]
    fn too_many_headers() {
        let mut text = String::from("GET / HTTP/1.1\n");
        for i in 0..=MAX_HEADER_NUM {
            text.push_str(&format!("X-Header-{i}: {i}\n"));
        }
        text.push('\n');

        let error = parse_request_head(&block(&text)).unwrap_err();
        assert!(matches!(error, ParseError::TooManyHeaders { .. }));
    }
}
