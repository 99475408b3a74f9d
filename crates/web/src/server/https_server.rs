use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;

use duo_http::connection::{serve_http1, serve_http2};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::trace;

use crate::server::{ServerBase, tls};
use crate::{ServerError, WebServerOptions};

/// HTTP/2 and HTTP/1.1 over TLS, chosen per connection through ALPN.
///
/// Connections that negotiate `h2` run as multiplexed HTTP/2 sessions, every
/// other connection falls back to the HTTP/1.1 state machine.
pub struct HttpsServer {
    base: ServerBase,
    acceptor: TlsAcceptor,
}

impl std::fmt::Debug for HttpsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpsServer").field("base", &self.base).finish_non_exhaustive()
    }
}

impl HttpsServer {
    /// Loads the certificate and key named by `options.tls`.
    pub fn new(options: WebServerOptions) -> Result<Self, ServerError> {
        let tls = options.tls.as_ref().ok_or_else(|| ServerError::tls("tls options are required"))?;
        let acceptor = tls::acceptor(tls)?;
        Ok(Self { base: ServerBase::new(options)?, acceptor })
    }

    /// Uses an already built rustls config; its ALPN list is replaced with `h2, http/1.1`.
    pub fn with_tls_config(
        options: WebServerOptions,
        mut config: tokio_rustls::rustls::ServerConfig,
    ) -> Result<Self, ServerError> {
        config.alpn_protocols = tls::ALPN_PROTOCOLS.iter().map(|protocol| protocol.to_vec()).collect();
        Ok(Self { base: ServerBase::new(options)?, acceptor: TlsAcceptor::from(Arc::new(config)) })
    }

    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let shared = self.base.shared();
        let acceptor = self.acceptor.clone();
        self.base
            .listen("https", move |stream, peer| {
                let shared = Arc::clone(&shared);
                let acceptor = acceptor.clone();
                async move {
                    let handshake = timeout(shared.config.http1_keep_alive_timeout, acceptor.accept(stream));
                    let stream = match handshake.await {
                        Ok(Ok(stream)) => stream,
                        Ok(Err(e)) => {
                            shared.events.warning(format!("tls handshake with {peer} failed: {e}"));
                            return;
                        }
                        Err(_) => {
                            shared.events.warning(format!("tls handshake with {peer} timed out"));
                            return;
                        }
                    };

                    let h2 = stream.get_ref().1.alpn_protocol() == Some(b"h2".as_slice());
                    trace!(peer = %peer, h2, "tls connection established");
                    if h2 {
                        serve_http2(shared, stream).await;
                    } else {
                        serve_http1(shared, stream).await;
                    }
                }
            })
            .await
    }

    pub async fn stop(&self) -> Result<(), ServerError> {
        self.base.stop_listening("https").await
    }
}

impl Deref for HttpsServer {
    type Target = ServerBase;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
