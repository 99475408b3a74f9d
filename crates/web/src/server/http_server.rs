use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;

use duo_http::connection::serve_http1;

use crate::server::ServerBase;
use crate::{ServerError, WebServerOptions};

/// HTTP/1.1 over plain TCP.
///
/// Derefs to [`ServerBase`] for middleware registration, the event hook and
/// the registries.
#[derive(Debug)]
pub struct HttpServer {
    base: ServerBase,
}

impl HttpServer {
    pub fn new(options: WebServerOptions) -> Result<Self, ServerError> {
        Ok(Self { base: ServerBase::new(options)? })
    }

    /// Binds the listener and starts the idle reaper; returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let shared = self.base.shared();
        self.base.listen("http", move |stream, _peer| serve_http1(Arc::clone(&shared), stream)).await
    }

    pub async fn stop(&self) -> Result<(), ServerError> {
        self.base.stop_listening("http").await
    }
}

impl Deref for HttpServer {
    type Target = ServerBase;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
