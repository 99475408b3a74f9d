//! Server engines.
//!
//! [`ServerBase`] owns everything both protocols share: the middleware
//! pipeline, the context pool, the socket and session registries with the
//! idle reaper, the event hook and the listener lifecycle. [`HttpServer`]
//! serves plain TCP with HTTP/1.1, [`HttpsServer`] terminates TLS and picks
//! HTTP/2 or HTTP/1.1 through ALPN.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use duo_http::connection::{ConnectionShared, SessionRegistry, SocketRegistry, serve_http1, serve_http2};
use duo_http::event::{EventSink, ServerEvent};
use duo_http::protocol::{HttpContext, HttpContextPool};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::middleware::{Middleware, MiddlewarePipeline, SimpleMiddleware};
use crate::{ServerError, WebServerOptions};

mod http_server;
mod https_server;
mod tls;

pub use http_server::HttpServer;
pub use https_server::HttpsServer;
pub use tls::{ALPN_PROTOCOLS, server_config};

struct Running {
    stop: CancellationToken,
    accept: JoinHandle<()>,
}

/// Protocol independent half of a server.
pub struct ServerBase {
    options: WebServerOptions,
    shared: Arc<ConnectionShared<MiddlewarePipeline>>,
    reaper: Mutex<Option<CancellationToken>>,
    running: tokio::sync::Mutex<Option<Running>>,
    listening: watch::Sender<Option<SocketAddr>>,
}

impl std::fmt::Debug for ServerBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBase")
            .field("options", &self.options)
            .field("middleware", &self.shared.dispatcher)
            .field("listening", &*self.listening.borrow())
            .finish_non_exhaustive()
    }
}

impl ServerBase {
    pub fn new(options: WebServerOptions) -> Result<Self, ServerError> {
        options.validate()?;
        let events = Arc::new(EventSink::new());
        let pipeline = MiddlewarePipeline::new(Arc::clone(&events));
        let shared = Arc::new(ConnectionShared::with_events(pipeline, options.connection_config(), events));
        Ok(Self {
            options,
            shared,
            reaper: Mutex::new(None),
            running: tokio::sync::Mutex::new(None),
            listening: watch::Sender::new(None),
        })
    }

    pub fn options(&self) -> &WebServerOptions {
        &self.options
    }

    /// Appends `middleware` to the chain; names must be unique.
    pub fn use_middleware<M: Middleware + 'static>(&self, middleware: M) -> Result<&Self, ServerError> {
        self.shared.dispatcher.push(middleware)?;
        Ok(self)
    }

    pub fn use_simple_middleware<M: SimpleMiddleware + 'static>(&self, middleware: M) -> Result<&Self, ServerError> {
        self.shared.dispatcher.push_simple(middleware)?;
        Ok(self)
    }

    pub fn middleware(&self) -> &MiddlewarePipeline {
        &self.shared.dispatcher
    }

    /// Installs the observability hook; events are logged through `tracing` either way.
    pub fn on_event<F>(&self, hook: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.shared.events.set_hook(Arc::new(hook));
    }

    pub fn events(&self) -> &EventSink {
        &self.shared.events
    }

    pub fn pool(&self) -> &HttpContextPool {
        &self.shared.pool
    }

    pub fn sockets(&self) -> &SocketRegistry {
        &self.shared.sockets
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.shared.sessions
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Runs the compiled chain for one context, recovering application failures.
    pub async fn dispatch_request(&self, context: &mut HttpContext) {
        self.shared.dispatcher.run(context).await;
    }

    /// HTTP/1.1 state machine for one accepted connection.
    pub fn handle_socket<IO>(&self, io: IO) -> impl Future<Output = ()> + Send + 'static
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        serve_http1(Arc::clone(&self.shared), io)
    }

    /// HTTP/2 session for one connection that negotiated `h2`.
    pub fn handle_http2_session<IO>(&self, io: IO) -> impl Future<Output = ()> + Send + 'static
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        serve_http2(Arc::clone(&self.shared), io)
    }

    /// Starts the periodic idle socket eviction; a second call is a no-op.
    pub fn start_idle_reaper(&self) {
        let mut reaper = self.reaper.lock().unwrap_or_else(PoisonError::into_inner);
        if reaper.is_some() {
            return;
        }
        let stop = CancellationToken::new();
        *reaper = Some(stop.clone());

        let shared = Arc::clone(&self.shared);
        let period = self.options.idle_check_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                select! {
                    biased;
                    () = stop.cancelled() => break,
                    _ = interval.tick() => {
                        for eviction in shared.sockets.evict_idle() {
                            let idle = eviction.idle.as_millis();
                            shared.events.info(format!("socket {} evicted after {idle}ms idle", eviction.id));
                        }
                    }
                }
            }
            trace!("idle reaper stopped");
        });
    }

    pub fn stop_idle_reaper(&self) {
        if let Some(stop) = self.reaper.lock().unwrap_or_else(PoisonError::into_inner).take() {
            stop.cancel();
        }
    }

    /// New HTTP/1.1 responses close their connection, HTTP/2 sessions get a
    /// GOAWAY and every registered socket is destroyed.
    pub fn shutdown(&self) {
        self.shared.begin_shutdown();
        self.stop_idle_reaper();
        let sessions = self.shared.sessions.shutdown_all();
        let sockets = self.shared.sockets.destroy_all();
        debug!(sessions, sockets, "connections shut down");
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.listening.borrow()
    }

    /// Resolves with the bound address as soon as the listener is up,
    /// immediately when it already is.
    pub async fn wait_until_listening(&self) -> Result<SocketAddr, ServerError> {
        let mut receiver = self.listening.subscribe();
        match receiver.wait_for(Option::is_some).await {
            Ok(address) => (*address).ok_or(ServerError::NotStarted),
            Err(_) => Err(ServerError::NotStarted),
        }
    }

    pub(crate) fn shared(&self) -> Arc<ConnectionShared<MiddlewarePipeline>> {
        Arc::clone(&self.shared)
    }

    /// Binds the configured address and hands every accepted stream to `serve`
    /// on its own task.
    pub(crate) async fn listen<F, Fut>(&self, protocol: &str, serve: F) -> Result<SocketAddr, ServerError>
    where
        F: Fn(TcpStream, SocketAddr) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let address = self.options.address();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(source) => return Err(ServerError::Bind { address, source }),
        };
        let local_addr = listener.local_addr()?;

        let stop = CancellationToken::new();
        let accept = tokio::spawn(accept_loop(listener, stop.clone(), serve));
        *running = Some(Running { stop, accept });

        self.shared.resume();
        self.start_idle_reaper();
        self.listening.send_replace(Some(local_addr));
        self.shared.events.info(format!("{protocol} server listening on {local_addr}"));
        Ok(local_addr)
    }

    /// Stops accepting, then shuts down live connections.
    pub(crate) async fn stop_listening(&self, protocol: &str) -> Result<(), ServerError> {
        let Some(Running { stop, accept }) = self.running.lock().await.take() else {
            return Err(ServerError::NotStarted);
        };
        stop.cancel();
        if let Err(e) = accept.await {
            debug!(cause = %e, "accept loop ended abnormally");
        }

        self.shutdown();
        let address = self.listening.send_replace(None);
        if let Some(address) = address {
            self.shared.events.info(format!("{protocol} server on {address} stopped"));
        }
        Ok(())
    }
}

async fn accept_loop<F, Fut>(listener: TcpListener, stop: CancellationToken, serve: F)
where
    F: Fn(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let (stream, peer) = select! {
            biased;
            () = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(cause = %e, peer = %peer, "failed to disable nagle");
        }
        trace!(peer = %peer, "connection accepted");
        tokio::spawn(serve(stream, peer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Next;
    use async_trait::async_trait;
    use duo_http::protocol::BoxError;

    struct Named(&'static str);

    #[async_trait]
    impl Middleware for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn on_request(&self, context: &mut HttpContext, next: Next<'_>) -> Result<(), BoxError> {
            next.run(context).await
        }
    }

    #[test]
    fn invalid_options_are_rejected() {
        let error = ServerBase::new(WebServerOptions::new().context_pool_size(0)).unwrap_err();
        assert!(matches!(error, ServerError::Options { .. }));
    }

    #[test]
    fn middleware_names_are_unique_across_kinds() {
        let base = ServerBase::new(WebServerOptions::default()).unwrap();
        base.use_middleware(Named("auth")).unwrap().use_middleware(Named("log")).unwrap();

        let error = base.use_middleware(Named("auth")).unwrap_err();

        assert!(matches!(error, ServerError::MiddlewareExists { ref name } if name == "auth"));
        assert_eq!(base.middleware().names(), ["auth", "log"]);
    }

    #[tokio::test]
    async fn stop_before_start_fails() {
        let base = ServerBase::new(WebServerOptions::default()).unwrap();
        assert!(matches!(base.stop_listening("http").await, Err(ServerError::NotStarted)));
        assert_eq!(base.local_addr(), None);
    }
}
