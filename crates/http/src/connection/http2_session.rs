//! HTTP/2 session driver.
//!
//! Framing, HPACK and flow control are handled by `h2`; this module applies
//! the server's session settings, accepts streams and runs each one through
//! the dispatcher on its own task, with a pooled context shaped exactly like
//! an HTTP/1.1 one.

use std::sync::Arc;

use bytes::Bytes;
use h2::RecvStream;
use h2::server::{Builder, SendResponse};
use http::header;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tracing::{debug, trace};

use crate::connection::ConnectionShared;
use crate::handler::Dispatcher;
use crate::protocol::{HttpError, RequestBody, RequestHead};
use crate::response::{ResponseTarget, ResponseWriter, StreamFault};

/// Serves one HTTP/2 connection until the peer leaves, the session is shut
/// down or the socket is destroyed.
pub async fn serve_http2<IO, D>(shared: Arc<ConnectionShared<D>>, io: IO)
where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    D: Dispatcher + Send + Sync + 'static,
{
    let lease = shared.sockets.register(shared.config.http2_keep_alive_timeout);
    let session = shared.sessions.register();
    let destroyed = lease.destroyed();
    let shutdown = session.shutdown_requested();
    tokio::pin!(destroyed, shutdown);

    let settings = shared.config.http2;
    let mut builder = Builder::new();
    builder
        .max_concurrent_streams(settings.max_concurrent_streams)
        .max_header_list_size(settings.max_header_list_size)
        .initial_window_size(settings.initial_window_size)
        .initial_connection_window_size(settings.initial_window_size);

    let handshake = select! {
        handshake = builder.handshake::<_, Bytes>(io) => handshake,
        () = &mut destroyed => {
            debug!(socket_id = lease.id(), "http2 socket destroyed during handshake");
            return;
        }
        () = &mut shutdown => {
            debug!(socket_id = lease.id(), "http2 session shut down during handshake");
            return;
        }
    };
    let mut connection = match handshake {
        Ok(connection) => connection,
        Err(e) => {
            shared.report_error("http2 handshake failed", &HttpError::from(e));
            return;
        }
    };
    debug!(socket_id = lease.id(), "http2 session established");

    let mut going_away = shared.is_shutting_down();
    if going_away {
        connection.graceful_shutdown();
    }

    loop {
        select! {
            accepted = connection.accept() => match accepted {
                Some(Ok((request, respond))) => {
                    lease.touch();
                    tokio::spawn(handle_stream(Arc::clone(&shared), request, respond));
                }
                Some(Err(e)) => {
                    shared.report_error("http2 session failed", &HttpError::from(e));
                    break;
                }
                None => break,
            },
            () = &mut shutdown, if !going_away => {
                going_away = true;
                connection.graceful_shutdown();
            }
            () = &mut destroyed => {
                connection.abrupt_shutdown(h2::Reason::NO_ERROR);
                debug!(socket_id = lease.id(), "http2 socket destroyed");
                break;
            }
        }
    }
    trace!(socket_id = lease.id(), "http2 session closed");
}

async fn handle_stream<D>(
    shared: Arc<ConnectionShared<D>>,
    request: http::Request<RecvStream>,
    respond: SendResponse<Bytes>,
)
where
    D: Dispatcher + Sync,
{
    let (parts, body) = request.into_parts();
    let content_length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let head = RequestHead::from(parts);
    let method = head.method.clone();
    let path = head.path.clone();

    let mut context = shared.pool.lease();
    context.initialize(head, RequestBody::http2(body, content_length), ResponseTarget::Stream(respond));
    context.response.set_connection_close(shared.is_shutting_down());

    shared.dispatcher.dispatch(&mut context).await;

    match context.response.take_stream_fault() {
        Some(StreamFault::Aborted(detail)) => {
            shared.events.warning(format!("http2 stream {method} {path} aborted: {detail}"));
        }
        Some(StreamFault::Failed(detail)) => {
            shared.events.error(format!("http2 stream {method} {path} failed: {detail}"));
        }
        None => {}
    }
}
