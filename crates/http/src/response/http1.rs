use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::StatusCode;
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use crate::codec::{ChunkedEncoder, Framing, HeadEncoder, Http1Head, is_valid_reason};
use crate::connection::SocketHandle;
use crate::protocol::{BoxError, HeaderCollection, PayloadItem, ResponseError};
use crate::response::{ResponseWriter, date};

/// Response writer for an HTTP/1.1 socket.
///
/// The head is encoded into one buffer and queued together with the body, so
/// the socket writer flushes both in a single write. Bodies of unknown length
/// go out with `Transfer-Encoding: chunked`.
#[derive(Debug)]
pub struct Http1Response {
    socket: Option<SocketHandle>,
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderCollection,
    connection_close: bool,
    head_only: bool,
    sent: bool,
}

impl Default for Http1Response {
    fn default() -> Self {
        Self {
            socket: None,
            status: StatusCode::OK,
            reason: None,
            headers: HeaderCollection::new(),
            connection_close: false,
            head_only: false,
            sent: false,
        }
    }
}

impl Http1Response {
    pub fn new(socket: SocketHandle) -> Self {
        Self { socket: Some(socket), ..Self::default() }
    }

    /// Binds the writer to `socket`; `head_only` suppresses body bytes for `HEAD`.
    pub fn initialize(&mut self, socket: SocketHandle, head_only: bool) {
        self.reset();
        self.socket = Some(socket);
        self.head_only = head_only;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    pub fn connection_close(&self) -> bool {
        self.connection_close
    }

    pub(crate) fn unbind(&mut self) {
        self.reset();
        self.socket = None;
        self.head_only = false;
    }

    fn claim(&mut self) -> Result<SocketHandle, ResponseError> {
        if self.sent {
            return Err(ResponseError::AlreadySent);
        }
        let socket = self.socket.clone().ok_or(ResponseError::Unbound)?;
        self.sent = true;
        Ok(socket)
    }

    fn encode_head(&self, framing: Framing, dst: &mut BytesMut) {
        let head = Http1Head {
            status: self.status,
            reason: self.reason.as_deref(),
            headers: &self.headers,
            connection_close: self.connection_close,
            framing,
            date: date::http_date(),
        };
        // encoding into memory cannot fail
        let _ = HeadEncoder.encode(head, dst);
    }
}

impl ResponseWriter for Http1Response {
    /// A reason phrase with control characters is dropped in favour of the canonical one.
    fn set_status(&mut self, status: StatusCode, reason: Option<&str>) {
        self.status = status;
        self.reason = match reason {
            Some(reason) if !is_valid_reason(reason) => {
                debug!(status = status.as_u16(), "dropping invalid reason phrase");
                None
            }
            reason => reason.map(str::to_owned),
        };
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
        let socket = self.claim()?;
        let body = body.into();

        let mut head = BytesMut::new();
        self.encode_head(Framing::Length(body.len() as u64), &mut head);
        socket.write(head.freeze()).await?;
        if !self.head_only && !body.is_empty() {
            socket.write(body).await?;
        }
        Ok(())
    }

    async fn stream<S, E>(&mut self, mut body: S) -> Result<(), ResponseError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: Into<BoxError> + Send,
    {
        let socket = self.claim()?;

        let mut head = BytesMut::new();
        self.encode_head(Framing::Chunked, &mut head);
        socket.write(head.freeze()).await?;
        if self.head_only {
            return Ok(());
        }

        let mut encoder = ChunkedEncoder::new();
        while let Some(item) = body.next().await {
            match item {
                Ok(bytes) => {
                    let mut frame = BytesMut::new();
                    encoder.encode(PayloadItem::Chunk(bytes), &mut frame)?;
                    if !frame.is_empty() {
                        socket.write(frame.freeze()).await?;
                    }
                }
                Err(e) => {
                    // the chunked body is cut short, the peer can only notice by the close
                    self.connection_close = true;
                    let error = ResponseError::body(e);
                    warn!(cause = %error, "response body stream failed");
                    return Err(error);
                }
            }
        }

        let mut frame = BytesMut::new();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut frame)?;
        socket.write(frame.freeze()).await
    }

    async fn end(&mut self) -> Result<(), ResponseError> {
        self.send(Bytes::new()).await
    }

    fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.reason = None;
        self.headers.clear();
        self.connection_close = false;
        self.sent = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SocketWriter;
    use futures::stream;
    use std::io;
    use tokio::io::AsyncReadExt;

    async fn written_by<F>(f: F) -> String
    where
        F: AsyncFnOnce(&mut Http1Response),
    {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (handle, writer) = SocketWriter::new(server);
        let task = tokio::spawn(writer.run());

        let mut response = Http1Response::new(handle.clone());
        f(&mut response).await;
        drop(response);
        handle.close().await;
        task.await.unwrap().unwrap();

        let mut received = String::new();
        client.read_to_string(&mut received).await.unwrap();
        received
    }

    #[tokio::test]
    async fn send_writes_head_and_body() {
        let text = written_by(async |response: &mut Http1Response| {
            response.headers_mut().set("Content-Type", "text/plain").unwrap();
            response.send("OK").await.unwrap();
        })
        .await;

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-type: text/plain\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert!(text.contains("date: "));
        assert!(text.contains("connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\nOK"));
    }

    #[tokio::test]
    async fn second_send_fails_until_reset() {
        let text = written_by(async |response: &mut Http1Response| {
            response.send("first").await.unwrap();
            assert!(matches!(response.send("second").await, Err(ResponseError::AlreadySent)));
            assert!(matches!(response.end().await, Err(ResponseError::AlreadySent)));

            response.reset();
            response.set_status(StatusCode::CREATED, None);
            response.send("third").await.unwrap();
            assert!(matches!(response.end().await, Err(ResponseError::AlreadySent)));
        })
        .await;

        assert!(text.contains("first"));
        assert!(!text.contains("second"));
        assert!(text.contains("HTTP/1.1 201 Created\r\n"));
        assert!(text.ends_with("third"));
    }

    #[tokio::test]
    async fn reason_with_line_break_is_dropped() {
        let text = written_by(async |response: &mut Http1Response| {
            response.set_status(StatusCode::OK, Some("OK\r\nSet-Cookie: injected=1"));
            response.send("x").await.unwrap();
        })
        .await;

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(!text.contains("Set-Cookie"));
        assert!(!text.contains("injected"));
    }

    #[tokio::test]
    async fn custom_reason_is_kept() {
        let text = written_by(async |response: &mut Http1Response| {
            response.set_status(StatusCode::OK, Some("All Good\tHere"));
            response.end().await.unwrap();
        })
        .await;

        assert!(text.starts_with("HTTP/1.1 200 All Good\tHere\r\n"));
    }

    #[tokio::test]
    async fn stream_uses_chunked_framing() {
        let text = written_by(async |response: &mut Http1Response| {
            response.set_connection_close(true);
            let body = stream::iter([
                Ok::<_, io::Error>(Bytes::from_static(b"hello")),
                Ok(Bytes::from_static(b" world")),
            ]);
            response.stream(body).await.unwrap();
        })
        .await;

        assert!(text.contains("transfer-encoding: chunked\r\n"));
        assert!(text.contains("connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn failed_stream_forces_close() {
        written_by(async |response: &mut Http1Response| {
            let body = stream::iter([Ok(Bytes::from_static(b"part")), Err(io::Error::other("boom"))]);
            assert!(matches!(response.stream(body).await, Err(ResponseError::Body { .. })));
            assert!(response.connection_close());
        })
        .await;
    }

    #[tokio::test]
    async fn head_only_skips_body() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (handle, writer) = SocketWriter::new(server);
        let task = tokio::spawn(writer.run());

        let mut response = Http1Response::default();
        response.initialize(handle.clone(), true);
        response.send("invisible").await.unwrap();
        handle.close().await;
        task.await.unwrap().unwrap();

        let mut text = String::new();
        client.read_to_string(&mut text).await.unwrap();
        assert!(text.contains("content-length: 9\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn unbound_response_cannot_send() {
        let mut response = Http1Response::default();
        assert!(matches!(response.send("x").await, Err(ResponseError::Unbound)));
    }
}
