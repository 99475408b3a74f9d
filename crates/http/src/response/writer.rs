use bytes::Bytes;
use futures::Stream;
use http::StatusCode;

use crate::protocol::{BoxError, HeaderCollection, ResponseError};

#[trait_variant::make(ResponseWriter: Send)]
#[allow(dead_code, reason = "only the Send variant is exported")]
pub trait LocalResponseWriter {
    /// Sets the status code; `reason` overrides the canonical phrase on HTTP/1.1.
    fn set_status(&mut self, status: StatusCode, reason: Option<&str>);

    fn headers_mut(&mut self) -> &mut HeaderCollection;

    /// HTTP/1.1 only: answer with `Connection: close` and end the socket afterwards.
    fn set_connection_close(&mut self, close: bool);

    fn is_sent(&self) -> bool;

    /// Sends the whole body with a `Content-Length`.
    async fn send<B>(&mut self, body: B) -> Result<(), ResponseError>
    where
        B: Into<Bytes> + Send;

    /// Sends the body as it is produced.
    async fn stream<S, E>(&mut self, body: S) -> Result<(), ResponseError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: Into<BoxError> + Send;

    /// Sends the head with an empty body.
    async fn end(&mut self) -> Result<(), ResponseError>;

    /// Clears status, headers and the sent flag.
    fn reset(&mut self);
}
