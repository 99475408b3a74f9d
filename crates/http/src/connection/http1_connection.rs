//! HTTP/1.1 byte-stream state machine.
//!
//! A connection alternates between two states. In [`ParseState::Header`]
//! incoming bytes feed the [`HeaderParser`] until a full header block is
//! found; the request is then dispatched while its body is forwarded to the
//! middleware through a bounded channel. Whatever part of the declared
//! `Content-Length` the middleware did not consume is left for
//! [`ParseState::Body`], which skips it so the next pipelined request starts
//! at the right byte.
//!
//! Requests on one socket are handled strictly one after another, so
//! responses leave in request order.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::select;
use tracing::{debug, info, warn};

use crate::codec::{HeaderChunk, HeaderParser, ParsedHead, parse_request_head};
use crate::connection::{ActivityTracker, ConnectionShared, SocketHandle, SocketWriter};
use crate::handler::Dispatcher;
use crate::protocol::{BodySender, HttpError, RequestBody};
use crate::response::{Http1Response, ResponseTarget, ResponseWriter};

const READ_BUFFER_SIZE: usize = 8 * 1024;
const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for the next request header block.
    Header,
    /// Body bytes of the last request still to be skipped.
    Body { remaining: u64 },
}

enum HeadRead {
    Complete(Bytes),
    Overflow(usize),
    Eof,
}

/// Read side of the socket plus bytes received but not consumed yet.
#[derive(Debug)]
struct Inbound<R> {
    reader: R,
    pending: BytesMut,
    activity: ActivityTracker,
}

impl<R> Inbound<R>
where
    R: AsyncRead + Unpin,
{
    /// Reads more bytes into `pending`, returns false on end of stream.
    async fn fill(&mut self) -> io::Result<bool> {
        self.pending.reserve(READ_BUFFER_SIZE);
        if self.reader.read_buf(&mut self.pending).await? == 0 {
            return Ok(false);
        }
        self.activity.touch();
        Ok(true)
    }

    /// Next piece of body, at most `limit` bytes; `None` on end of stream.
    async fn next_body_chunk(&mut self, limit: u64) -> io::Result<Option<Bytes>> {
        if self.pending.is_empty() && !self.fill().await? {
            return Ok(None);
        }
        let take = usize::try_from(limit).map_or(self.pending.len(), |limit| limit.min(self.pending.len()));
        Ok(Some(self.pending.split_to(take).freeze()))
    }

    /// Pushes body bytes to the middleware until the declared length is read.
    ///
    /// Keeps reading even if the consumer went away, so the byte stream stays
    /// aligned with request boundaries.
    async fn forward_body(&mut self, remaining: &mut u64, sender: Option<BodySender>) -> io::Result<()> {
        let Some(sender) = sender else {
            return Ok(());
        };

        let mut consumer_gone = false;
        while *remaining > 0 {
            let chunk = match self.next_body_chunk(*remaining).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    sender.abort(io::Error::from(io::ErrorKind::UnexpectedEof)).await;
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
                }
                Err(e) => {
                    sender.abort(io::Error::new(e.kind(), e.to_string())).await;
                    return Err(e);
                }
            };

            *remaining -= chunk.len() as u64;
            if !consumer_gone && !sender.send(chunk).await {
                consumer_gone = true;
            }
        }
        Ok(())
    }

    /// Discards body bytes nobody read, returns false if the peer hung up first.
    async fn skip_body(&mut self, remaining: &mut u64) -> io::Result<bool> {
        while *remaining > 0 {
            let Some(chunk) = self.next_body_chunk(*remaining).await? else {
                return Ok(false);
            };
            *remaining -= chunk.len() as u64;
        }
        Ok(true)
    }
}

#[derive(Debug)]
pub struct Http1Connection<R, D> {
    inbound: Inbound<R>,
    parser: HeaderParser,
    state: ParseState,
    socket: SocketHandle,
    shared: Arc<ConnectionShared<D>>,
    /// Requests dispatched and not yet released, 0 or 1 while dispatch is sequential.
    active_requests: usize,
}

impl<R, D> Http1Connection<R, D>
where
    R: AsyncRead + Unpin + Send,
    D: Dispatcher + Sync,
{
    pub fn new(reader: R, socket: SocketHandle, shared: Arc<ConnectionShared<D>>, activity: ActivityTracker) -> Self {
        let parser = HeaderParser::new(shared.config.max_header_size);
        Self {
            inbound: Inbound { reader, pending: BytesMut::with_capacity(READ_BUFFER_SIZE), activity },
            parser,
            state: ParseState::Header,
            socket,
            shared,
            active_requests: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Serves requests until the peer closes, a request asks for close, or a
    /// protocol violation ends the connection.
    pub async fn process(mut self) -> Result<(), HttpError> {
        loop {
            match self.state {
                ParseState::Body { mut remaining } => {
                    let open = self.inbound.skip_body(&mut remaining).await?;
                    if !open {
                        debug!("peer closed while skipping request body");
                        return Ok(());
                    }
                    self.state = ParseState::Header;
                }

                ParseState::Header => {
                    let header = match self.read_header().await? {
                        HeadRead::Complete(header) => header,
                        HeadRead::Overflow(size) => {
                            self.shared.events.warning(format!(
                                "request header of {size} bytes exceeds the {} byte limit, closing connection",
                                self.parser.max_size()
                            ));
                            return self.reject(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE).await;
                        }
                        HeadRead::Eof => {
                            debug!("cant read more request, break this connection down");
                            return Ok(());
                        }
                    };

                    let parsed = match parse_request_head(&header) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            self.shared.events.warning(format!("malformed request head: {e}"));
                            return self.reject(StatusCode::BAD_REQUEST).await;
                        }
                    };

                    if parsed.chunked {
                        self.shared.events.warning("chunked request bodies are not supported, closing connection");
                        return self.reject(StatusCode::NOT_IMPLEMENTED).await;
                    }

                    if parsed.expect_continue {
                        self.socket.write(Bytes::from_static(CONTINUE)).await?;
                        info!("receive expect request header, sent continue response");
                    }

                    if !self.dispatch(parsed).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn read_header(&mut self) -> Result<HeadRead, HttpError> {
        loop {
            if self.inbound.pending.is_empty() && !self.inbound.fill().await? {
                return Ok(HeadRead::Eof);
            }

            let chunk = self.inbound.pending.split();
            match self.parser.append(&chunk) {
                HeaderChunk::Partial => {}
                HeaderChunk::Complete { header, remaining } => {
                    self.inbound.pending.extend_from_slice(&remaining);
                    return Ok(HeadRead::Complete(header));
                }
                HeaderChunk::Overflow { size } => return Ok(HeadRead::Overflow(size)),
            }
        }
    }

    /// Answers with an empty `status` response and `Connection: close`.
    async fn reject(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let mut response = Http1Response::new(self.socket.clone());
        response.set_status(status, None);
        response.set_connection_close(true);
        response.end().await?;
        Ok(())
    }

    /// Runs one request through the dispatcher; returns whether the socket stays open.
    async fn dispatch(&mut self, parsed: ParsedHead) -> Result<bool, HttpError> {
        let ParsedHead { head, content_length, keep_alive, .. } = parsed;
        let shared = Arc::clone(&self.shared);

        let (sender, body) = RequestBody::channel(content_length);
        let mut context = shared.pool.lease();
        context.initialize(head, body, ResponseTarget::Socket(self.socket.clone()));
        context.response.set_connection_close(!keep_alive || shared.is_shutting_down());

        self.active_requests += 1;
        self.inbound.activity.touch();

        // The dispatcher may wait for body bytes while the body channel waits
        // for the dispatcher to read, so both are polled together. Whatever the
        // dispatcher left unread is skipped in the Body state.
        let mut remaining = content_length;
        let forwarded = {
            let dispatch = shared.dispatcher.dispatch(&mut context);
            let forward = self.inbound.forward_body(&mut remaining, sender);
            tokio::pin!(dispatch, forward);

            let mut forwarded = None;
            loop {
                select! {
                    biased;
                    () = &mut dispatch => break,
                    result = &mut forward, if forwarded.is_none() => forwarded = Some(result),
                }
            }
            forwarded
        };

        if !context.response.is_sent() {
            warn!(path = context.request.path(), "dispatcher left the response unsent");
            context.response.set_status(StatusCode::INTERNAL_SERVER_ERROR, None);
            context.response.set_connection_close(true);
            // a failure here means the socket is gone, checked below
            let _ = context.response.end().await;
        }

        let close = context.response.connection_close();
        drop(context);
        self.active_requests -= 1;

        if let Some(Err(e)) = forwarded {
            return Err(e.into());
        }
        if self.socket.is_closed() {
            return Ok(false);
        }

        self.state = ParseState::Body { remaining };
        Ok(!(close && self.active_requests == 0))
    }
}

/// Serves one HTTP/1.1 connection until it closes or is destroyed.
pub async fn serve_http1<IO, D>(shared: Arc<ConnectionShared<D>>, io: IO)
where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    D: Dispatcher + Send + Sync + 'static,
{
    let lease = shared.sockets.register(shared.config.http1_keep_alive_timeout);
    let destroyed = lease.destroyed();
    tokio::pin!(destroyed);

    let (reader, writer) = tokio::io::split(io);
    let (socket, socket_writer) = SocketWriter::new(writer);
    let writer_task = tokio::spawn(socket_writer.run());
    let writer_abort = writer_task.abort_handle();
    let connection = Http1Connection::new(reader, socket.clone(), Arc::clone(&shared), lease.tracker());

    let result = select! {
        result = connection.process() => result,
        () = &mut destroyed => {
            writer_abort.abort();
            debug!(socket_id = lease.id(), "socket destroyed");
            return;
        }
    };
    if let Err(e) = result {
        shared.report_error("http1 connection failed", &e);
    }

    // a peer that stops reading keeps the flush pending until the socket is destroyed
    let flushed = async move {
        socket.close().await;
        drop(socket);
        writer_task.await
    };
    select! {
        joined = flushed => match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => shared.report_error("http1 socket write failed", &HttpError::from(e)),
            Err(e) => debug!(cause = %e, "socket writer task ended abnormally"),
        },
        () = &mut destroyed => {
            writer_abort.abort();
            debug!(socket_id = lease.id(), "socket destroyed while flushing");
        }
    }
}
