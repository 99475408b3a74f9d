//! Request side of an [`HttpContext`](crate::protocol::HttpContext).
//!
//! [`RequestHead`] is what the protocol layers produce (parsed HTTP/1.1 head
//! or translated HTTP/2 pseudo-headers), [`Request`] is the pooled view that
//! middleware reads.

use http::request::Parts;
use http::{HeaderValue, Method, Version, header};

use crate::protocol::{HeaderCollection, RequestBody};

/// Protocol independent request line plus headers.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Raw request target, query string included.
    pub path: String,
    pub version: Version,
    pub headers: HeaderCollection,
}

impl Default for RequestHead {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: String::from("/"),
            version: Version::HTTP_11,
            headers: HeaderCollection::new(),
        }
    }
}

/// Translates an HTTP/2 request: `:method` and `:path` become the request
/// line, `:authority` becomes `host` when no such header was sent.
impl From<Parts> for RequestHead {
    fn from(parts: Parts) -> Self {
        let path = parts.uri.path_and_query().map_or_else(|| String::from("/"), |pq| pq.as_str().to_owned());
        let mut headers = HeaderCollection::from(&parts.headers);

        if !headers.contains(header::HOST.as_str()) {
            if let Some(authority) = parts.uri.authority() {
                if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
                    headers.insert(header::HOST, value);
                }
            }
        }

        Self { method: parts.method, path, version: parts.version, headers }
    }
}

#[derive(Debug, Default)]
pub struct Request {
    head: RequestHead,
    body: RequestBody,
}

impl Request {
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Full request target as sent by the client, e.g. `/search?q=1`.
    pub fn path(&self) -> &str {
        &self.head.path
    }

    /// Request target without the query string.
    pub fn path_only(&self) -> &str {
        self.head.path.split_once('?').map_or(self.head.path.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> Option<&str> {
        self.head.path.split_once('?').map(|(_, query)| query)
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &HeaderCollection {
        &self.head.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderCollection {
        &mut self.head.headers
    }

    pub fn body_mut(&mut self) -> &mut RequestBody {
        &mut self.body
    }

    /// Moves the body out, leaving an empty one behind.
    pub fn take_body(&mut self) -> RequestBody {
        std::mem::take(&mut self.body)
    }

    pub(crate) fn initialize(&mut self, head: RequestHead, body: RequestBody) {
        self.head = head;
        self.body = body;
    }

    pub(crate) fn reset(&mut self) {
        self.head.method = Method::GET;
        self.head.path.clear();
        self.head.version = Version::HTTP_11;
        self.head.headers.clear();
        self.body = RequestBody::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http2_parts_become_request_head() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("https://example.com/x?y=1")
            .version(Version::HTTP_2)
            .header("content-type", "application/json")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();

        let head = RequestHead::from(parts);
        assert_eq!(head.method, Method::POST);
        assert_eq!(head.path, "/x?y=1");
        assert_eq!(head.version, Version::HTTP_2);
        assert_eq!(head.headers.get_str("host"), Some("example.com"));
        assert_eq!(head.headers.get_str("content-type"), Some("application/json"));
    }

    #[test]
    fn path_and_query_split() {
        let mut request = Request::default();
        request.initialize(
            RequestHead { path: String::from("/search?q=rust&page=2"), ..RequestHead::default() },
            RequestBody::empty(),
        );

        assert_eq!(request.path(), "/search?q=rust&page=2");
        assert_eq!(request.path_only(), "/search");
        assert_eq!(request.query(), Some("q=rust&page=2"));

        request.reset();
        assert_eq!(request.path(), "");
        assert_eq!(request.query(), None);
        assert!(request.headers().is_empty());
    }
}
