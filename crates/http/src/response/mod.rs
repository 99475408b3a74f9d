//! Response writers.
//!
//! [`ResponseWriter`] is the contract middleware writes through. It has two
//! implementations, [`Http1Response`] for HTTP/1.1 sockets and
//! [`Http2Response`] for HTTP/2 streams, and the [`Response`] facade picks one
//! based on the [`ResponseTarget`] it is initialized with.
//!
//! Every writer is one-shot: the first `send`, `stream` or `end` after
//! construction or [`reset`](ResponseWriter::reset) goes out, later calls fail
//! with [`ResponseError::AlreadySent`].

use std::fmt;

use bytes::Bytes;
use futures::Stream;
use h2::server::SendResponse;
use http::StatusCode;

use crate::connection::SocketHandle;
use crate::protocol::{BoxError, HeaderCollection, ResponseError};

mod date;
mod http1;
mod http2;
mod writer;

pub use date::http_date;
pub use http1::Http1Response;
pub use http2::{Http2Response, StreamFault};
pub use writer::ResponseWriter;

/// Where a response is written to.
#[derive(Debug)]
pub enum ResponseTarget {
    Socket(SocketHandle),
    Stream(SendResponse<Bytes>),
}

enum Backend {
    Http1(Http1Response),
    Http2(Http2Response),
}

type EndHook = Box<dyn FnOnce(StatusCode) + Send>;

/// Protocol agnostic response handed to middleware.
#[derive(Default)]
pub struct Response {
    backend: Backend,
    on_end: Option<EndHook>,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Http1(Http1Response::default())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Response");
        match &self.backend {
            Backend::Http1(response) => debug.field("http1", response),
            Backend::Http2(response) => debug.field("http2", response),
        };
        debug.field("on_end", &self.on_end.is_some()).finish()
    }
}

impl Response {
    /// Binds the response to `target`, reusing the writer when the protocol matches.
    pub fn initialize(&mut self, target: ResponseTarget, head_only: bool) {
        self.on_end = None;
        match (target, &mut self.backend) {
            (ResponseTarget::Socket(socket), Backend::Http1(response)) => response.initialize(socket, head_only),
            (ResponseTarget::Socket(socket), backend) => {
                let mut response = Http1Response::default();
                response.initialize(socket, head_only);
                *backend = Backend::Http1(response);
            }
            (ResponseTarget::Stream(stream), Backend::Http2(response)) => response.initialize(stream, head_only),
            (ResponseTarget::Stream(stream), backend) => {
                let mut response = Http2Response::default();
                response.initialize(stream, head_only);
                *backend = Backend::Http2(response);
            }
        }
    }

    /// Registers `hook` to run right before the response goes out.
    pub fn on_end<F>(&mut self, hook: F)
    where
        F: FnOnce(StatusCode) + Send + 'static,
    {
        self.on_end = Some(Box::new(hook));
    }

    pub fn is_http2(&self) -> bool {
        matches!(self.backend, Backend::Http2(_))
    }

    pub fn status(&self) -> StatusCode {
        match &self.backend {
            Backend::Http1(response) => response.status(),
            Backend::Http2(response) => response.status(),
        }
    }

    pub fn headers(&self) -> &HeaderCollection {
        match &self.backend {
            Backend::Http1(response) => response.headers(),
            Backend::Http2(response) => response.headers(),
        }
    }

    /// Shorthand for `headers_mut().set(..)`.
    pub fn set_header<N, V>(&mut self, name: N, value: V) -> Result<(), ResponseError>
    where
        http::HeaderName: TryFrom<N>,
        <http::HeaderName as TryFrom<N>>::Error: Into<http::Error>,
        http::HeaderValue: TryFrom<V>,
        <http::HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        Ok(self.writer_headers().set(name, value)?)
    }

    pub fn connection_close(&self) -> bool {
        match &self.backend {
            Backend::Http1(response) => response.connection_close(),
            Backend::Http2(response) => response.connection_close(),
        }
    }

    /// Abnormal end of the HTTP/2 stream during the last send, if any.
    pub fn take_stream_fault(&mut self) -> Option<StreamFault> {
        match &mut self.backend {
            Backend::Http1(_) => None,
            Backend::Http2(response) => response.take_fault(),
        }
    }

    /// Reset plus dropping the socket or stream binding, used by the pool.
    pub(crate) fn recycle(&mut self) {
        self.on_end = None;
        match &mut self.backend {
            Backend::Http1(response) => response.unbind(),
            Backend::Http2(response) => response.unbind(),
        }
    }

    fn writer_headers(&mut self) -> &mut HeaderCollection {
        match &mut self.backend {
            Backend::Http1(response) => response.headers_mut(),
            Backend::Http2(response) => response.headers_mut(),
        }
    }

    fn fire_on_end(&mut self) {
        if self.is_sent() {
            return;
        }
        if let Some(hook) = self.on_end.take() {
            hook(self.status());
        }
    }
}

impl ResponseWriter for Response {
    fn set_status(&mut self, status: StatusCode, reason: Option<&str>) {
        match &mut self.backend {
            Backend::Http1(response) => response.set_status(status, reason),
            Backend::Http2(response) => response.set_status(status, reason),
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderCollection {
        self.writer_headers()
    }

    fn set_connection_close(&mut self, close: bool) {
        match &mut self.backend {
            Backend::Http1(response) => response.set_connection_close(close),
            Backend::Http2(response) => response.set_connection_close(close),
        }
    }

    fn is_sent(&self) -> bool {
        match &self.backend {
            Backend::Http1(response) => response.is_sent(),
            Backend::Http2(response) => response.is_sent(),
        }
    }

    async fn send<B>(&mut self, body: B) -> Result<(), ResponseError>
    where
        B: Into<Bytes> + Send,
    {
        self.fire_on_end();
        match &mut self.backend {
            Backend::Http1(response) => response.send(body).await,
            Backend::Http2(response) => response.send(body).await,
        }
    }

    async fn stream<S, E>(&mut self, body: S) -> Result<(), ResponseError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: Into<BoxError> + Send,
    {
        self.fire_on_end();
        match &mut self.backend {
            Backend::Http1(response) => response.stream(body).await,
            Backend::Http2(response) => response.stream(body).await,
        }
    }

    async fn end(&mut self) -> Result<(), ResponseError> {
        self.send(Bytes::new()).await
    }

    fn reset(&mut self) {
        match &mut self.backend {
            Backend::Http1(response) => response.reset(),
            Backend::Http2(response) => response.reset(),
        }
    }
}
