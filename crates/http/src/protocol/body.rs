//! Request body handed to middleware.
//!
//! The HTTP/1.1 engine pushes body bytes through a bounded channel while the
//! middleware chain runs, HTTP/2 bodies come straight from the `h2` receive
//! stream. Both are consumed the same way: as a `futures::Stream` of `Bytes`
//! or as an `http_body::Body`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use tokio::sync::mpsc;

use crate::protocol::BodyError;

/// Number of in-flight chunks between the socket reader and the body consumer.
const BODY_CHANNEL_SIZE: usize = 8;

#[derive(Debug, Default)]
pub struct RequestBody {
    kind: Kind,
    content_length: Option<u64>,
}

#[derive(Debug, Default)]
enum Kind {
    #[default]
    Empty,
    Channel(mpsc::Receiver<io::Result<Bytes>>),
    Http2(h2::RecvStream),
}

impl RequestBody {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a body fed by the HTTP/1.1 connection, `content_length` bytes long.
    ///
    /// A zero length body needs no sender, so none is returned.
    pub fn channel(content_length: u64) -> (Option<BodySender>, Self) {
        if content_length == 0 {
            return (None, Self { kind: Kind::Empty, content_length: Some(0) });
        }

        let (sender, receiver) = mpsc::channel(BODY_CHANNEL_SIZE);
        (Some(BodySender { sender }), Self { kind: Kind::Channel(receiver), content_length: Some(content_length) })
    }

    /// Wraps an HTTP/2 receive stream.
    pub fn http2(stream: h2::RecvStream, content_length: Option<u64>) -> Self {
        if stream.is_end_stream() {
            return Self { kind: Kind::Empty, content_length: Some(0) };
        }
        Self { kind: Kind::Http2(stream), content_length }
    }

    /// Declared length of the body, if the peer announced one.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Reads the whole body into memory.
    pub async fn collect_bytes(&mut self) -> Result<Bytes, BodyError> {
        let capacity = self.content_length.and_then(|len| usize::try_from(len).ok()).unwrap_or_default();
        let mut buf = BytesMut::with_capacity(capacity);
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for RequestBody {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match &mut this.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Channel(receiver) => match ready!(receiver.poll_recv(cx)) {
                Some(Ok(bytes)) => Poll::Ready(Some(Ok(bytes))),
                Some(Err(e)) => Poll::Ready(Some(Err(e.into()))),
                None => {
                    this.kind = Kind::Empty;
                    Poll::Ready(None)
                }
            },
            Kind::Http2(stream) => match ready!(stream.poll_data(cx)) {
                Some(Ok(bytes)) => {
                    // hand the window back so the peer can keep sending
                    if let Err(e) = stream.flow_control().release_capacity(bytes.len()) {
                        return Poll::Ready(Some(Err(e.into())));
                    }
                    Poll::Ready(Some(Ok(bytes)))
                }
                Some(Err(e)) => Poll::Ready(Some(Err(e.into()))),
                None => {
                    this.kind = Kind::Empty;
                    Poll::Ready(None)
                }
            },
        }
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    fn size_hint(&self) -> SizeHint {
        match (&self.kind, self.content_length) {
            (Kind::Empty, _) => SizeHint::with_exact(0),
            (_, Some(length)) => SizeHint::with_exact(length),
            (_, None) => SizeHint::new(),
        }
    }
}

/// Producer half of an HTTP/1.1 request body.
#[derive(Debug)]
pub struct BodySender {
    sender: mpsc::Sender<io::Result<Bytes>>,
}

impl BodySender {
    /// Sends a chunk, returns false once the body consumer is gone.
    pub async fn send(&self, bytes: Bytes) -> bool {
        self.sender.send(Ok(bytes)).await.is_ok()
    }

    /// Tells the consumer the body ended abnormally.
    pub async fn abort(&self, error: io::Error) {
        // consumer may already be gone, nothing else to notify then
        let _ = self.sender.send(Err(error)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn channel_body_yields_chunks_then_ends() {
        let (sender, mut body) = RequestBody::channel(10);
        let sender = sender.unwrap();

        assert_eq!(Body::size_hint(&body).exact(), Some(10));

        tokio::spawn(async move {
            assert!(sender.send(Bytes::from_static(b"hello")).await);
            assert!(sender.send(Bytes::from_static(b"world")).await);
        });

        let collected = body.collect_bytes().await.unwrap();
        assert_eq!(&collected[..], b"helloworld");
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn zero_length_body_has_no_sender() {
        let (sender, body) = RequestBody::channel(0);
        assert!(sender.is_none());
        assert!(body.is_end_stream());

        let collected = BodyExt::collect(body).await.unwrap().to_bytes();
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn aborted_body_reports_error() {
        let (sender, mut body) = RequestBody::channel(4);
        let sender = sender.unwrap();

        tokio::spawn(async move {
            sender.send(Bytes::from_static(b"ab")).await;
            sender.abort(io::Error::from(io::ErrorKind::UnexpectedEof)).await;
        });

        assert_eq!(&body.next().await.unwrap().unwrap()[..], b"ab");
        assert!(matches!(body.next().await, Some(Err(BodyError::Io { .. }))));
    }

    #[tokio::test]
    async fn sender_notices_dropped_consumer() {
        let (sender, body) = RequestBody::channel(4);
        drop(body);
        assert!(!sender.unwrap().send(Bytes::from_static(b"ab")).await);
    }
}
