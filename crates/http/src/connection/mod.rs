//! Per-connection protocol engines.
//!
//! - [`serve_http1`]: HTTP/1.1 byte-stream state machine over any
//!   `AsyncRead + AsyncWrite`, one request at a time, keep-alive and pipelining
//! - [`serve_http2`]: HTTP/2 session driver on top of `h2`, one task per stream
//!
//! Both share a [`ConnectionShared`]: the dispatcher, the context pool, the
//! socket and session registries, the event sink and the connection settings.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::codec::DEFAULT_MAX_HEADER_SIZE;
use crate::event::EventSink;
use crate::protocol::{HttpContextPool, HttpError};

mod http1_connection;
mod http2_session;
mod registry;
mod socket;

pub use http1_connection::{Http1Connection, ParseState, serve_http1};
pub use http2_session::serve_http2;
pub use registry::{ActivityTracker, Eviction, SessionLease, SessionRegistry, SocketLease, SocketRegistry};
pub use socket::{SocketCommand, SocketHandle, SocketWriter};

/// Settings applied to every HTTP/2 session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Http2Settings {
    pub max_concurrent_streams: u32,
    pub max_header_list_size: u32,
    pub initial_window_size: u32,
}

impl Default for Http2Settings {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 100,
            max_header_list_size: 2 * DEFAULT_MAX_HEADER_SIZE as u32,
            initial_window_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub max_header_size: usize,
    pub context_pool_size: usize,
    pub http1_keep_alive_timeout: Duration,
    pub http2_keep_alive_timeout: Duration,
    pub http2: Http2Settings,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            context_pool_size: 128,
            http1_keep_alive_timeout: Duration::from_secs(5),
            http2_keep_alive_timeout: Duration::from_secs(30),
            http2: Http2Settings::default(),
        }
    }
}

/// State shared by every connection of one server.
#[derive(Debug)]
pub struct ConnectionShared<D> {
    pub dispatcher: D,
    pub pool: Arc<HttpContextPool>,
    pub sockets: Arc<SocketRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub events: Arc<EventSink>,
    pub config: ConnectionConfig,
    shutting_down: AtomicBool,
}

impl<D> ConnectionShared<D> {
    pub fn new(dispatcher: D, config: ConnectionConfig) -> Self {
        Self::with_events(dispatcher, config, Arc::new(EventSink::new()))
    }

    /// Like [`new`](Self::new) but reports through an existing sink, so the
    /// dispatcher can share it.
    pub fn with_events(dispatcher: D, config: ConnectionConfig, events: Arc<EventSink>) -> Self {
        Self {
            dispatcher,
            pool: Arc::new(HttpContextPool::new(config.context_pool_size)),
            sockets: Arc::new(SocketRegistry::new()),
            sessions: Arc::new(SessionRegistry::new()),
            events,
            config,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Once set, HTTP/1.1 responses carry `Connection: close`.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    /// Clears a previous shutdown so a restarted listener keeps connections alive again.
    pub fn resume(&self) {
        self.shutting_down.store(false, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Peer disconnects are logged quietly, anything else becomes an error event.
    pub fn report_error(&self, context: &str, error: &HttpError) {
        if error.is_benign() {
            debug!(cause = %error, "{context}");
        } else {
            self.events.error(format!("{context}: {error}"));
        }
    }
}
