use std::future::poll_fn;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use h2::server::SendResponse;
use h2::{Reason, SendStream};
use http::{HeaderName, StatusCode, header};
use tracing::debug;

use crate::protocol::{BoxError, HeaderCollection, ResponseError};
use crate::response::{ResponseWriter, date};

/// Headers that are meaningful only for a single HTTP/1.1 hop and must not
/// appear in an HTTP/2 response.
const CONNECTION_SPECIFIC: [HeaderName; 5] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Why a stream ended abnormally while its response was being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    /// The peer reset or went away.
    Aborted(String),
    /// Anything else; the stream was reset with `INTERNAL_ERROR`.
    Failed(String),
}

/// Response writer for one HTTP/2 stream.
#[derive(Debug)]
pub struct Http2Response {
    stream: Option<SendResponse<Bytes>>,
    status: StatusCode,
    headers: HeaderCollection,
    connection_close: bool,
    head_only: bool,
    sent: bool,
    fault: Option<StreamFault>,
}

impl Default for Http2Response {
    fn default() -> Self {
        Self {
            stream: None,
            status: StatusCode::OK,
            headers: HeaderCollection::new(),
            connection_close: false,
            head_only: false,
            sent: false,
            fault: None,
        }
    }
}

impl Http2Response {
    pub fn new(stream: SendResponse<Bytes>) -> Self {
        Self { stream: Some(stream), ..Self::default() }
    }

    pub fn initialize(&mut self, stream: SendResponse<Bytes>, head_only: bool) {
        self.reset();
        self.fault = None;
        self.stream = Some(stream);
        self.head_only = head_only;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    /// Kept for symmetry with HTTP/1.1, the session decides about the connection.
    pub fn connection_close(&self) -> bool {
        self.connection_close
    }

    /// Takes the abnormal termination recorded by the last send, if any.
    pub fn take_fault(&mut self) -> Option<StreamFault> {
        self.fault.take()
    }

    pub(crate) fn unbind(&mut self) {
        self.reset();
        self.fault = None;
        self.stream = None;
        self.head_only = false;
    }

    /// Sends `:status` plus the regular headers and returns the body stream,
    /// or `None` when the response carries no body.
    fn respond(&mut self, content_length: Option<usize>) -> Result<Option<SendStream<Bytes>>, ResponseError> {
        if self.sent {
            return Err(ResponseError::AlreadySent);
        }
        let mut stream = self.stream.take().ok_or(ResponseError::Unbound)?;
        self.sent = true;

        let mut builder = http::Response::builder().status(self.status).version(http::Version::HTTP_2);
        for (name, value) in self.headers.iter() {
            if CONNECTION_SPECIFIC.contains(name) || *name == header::CONTENT_LENGTH {
                continue;
            }
            builder = builder.header(name, value);
        }
        if let Some(length) = content_length {
            builder = builder.header(header::CONTENT_LENGTH, length);
        }
        if !self.headers.contains(header::DATE.as_str()) {
            if let Some(date) = date::http_date() {
                builder = builder.header(header::DATE, date);
            }
        }
        let response = builder.body(())?;

        let end_of_stream = self.head_only || content_length == Some(0);
        let send_stream = stream.send_response(response, end_of_stream).map_err(|e| self.record(e.into(), None))?;
        Ok(if end_of_stream { None } else { Some(send_stream) })
    }

    /// Remembers why the stream failed and resets it unless the peer already did.
    fn record(&mut self, error: ResponseError, stream: Option<&mut SendStream<Bytes>>) -> ResponseError {
        let detail = error.to_string();
        if error.is_benign() {
            debug!(cause = %error, "http2 stream aborted by peer");
            self.fault = Some(StreamFault::Aborted(detail));
        } else {
            if let Some(stream) = stream {
                stream.send_reset(Reason::INTERNAL_ERROR);
            }
            self.fault = Some(StreamFault::Failed(detail));
        }
        error
    }
}

/// Writes `data` honoring the stream's flow-control window.
async fn write_data(stream: &mut SendStream<Bytes>, mut data: Bytes, end_of_stream: bool) -> Result<(), h2::Error> {
    if data.is_empty() {
        if end_of_stream {
            stream.send_data(data, true)?;
        }
        return Ok(());
    }

    while !data.is_empty() {
        stream.reserve_capacity(data.len());
        let granted = match poll_fn(|cx| stream.poll_capacity(cx)).await {
            Some(granted) => granted?,
            None => return Err(h2::Error::from(Reason::CANCEL)),
        };
        if granted == 0 {
            continue;
        }

        let chunk = data.split_to(granted.min(data.len()));
        stream.send_data(chunk, end_of_stream && data.is_empty())?;
    }
    Ok(())
}

impl ResponseWriter for Http2Response {
    fn set_status(&mut self, status: StatusCode, _reason: Option<&str>) {
        // HTTP/2 has no reason phrase
        self.status = status;
    }

    fn headers_mut(&mut self) -> &mut HeaderCollection {
        &mut self.headers
    }

    fn set_connection_close(&mut self, close: bool) {
        self.connection_close = close;
    }

    fn is_sent(&self) -> bool {
        self.sent
    }

    async fn send<B>(&mut self, body: B) -> Result<(), ResponseError>
    where
        B: Into<Bytes> + Send,
    {
        let body = body.into();
        let Some(mut stream) = self.respond(Some(body.len()))? else {
            return Ok(());
        };

        match write_data(&mut stream, body, true).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.record(e.into(), Some(&mut stream))),
        }
    }

    async fn stream<S, E>(&mut self, mut body: S) -> Result<(), ResponseError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: Into<BoxError> + Send,
    {
        let Some(mut stream) = self.respond(None)? else {
            return Ok(());
        };

        while let Some(item) = body.next().await {
            let result = match item {
                Ok(bytes) => write_data(&mut stream, bytes, false).await.map_err(ResponseError::from),
                Err(e) => Err(ResponseError::body(e)),
            };
            if let Err(e) = result {
                return Err(self.record(e, Some(&mut stream)));
            }
        }

        write_data(&mut stream, Bytes::new(), true).await.map_err(|e| self.record(e.into(), Some(&mut stream)))
    }

    async fn end(&mut self) -> Result<(), ResponseError> {
        self.send(Bytes::new()).await
    }

    fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.connection_close = false;
        self.sent = false;
    }
}
