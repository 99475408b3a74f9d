//! Dual protocol web server built on `duo-http`.
//!
//! Application code plugs in through middleware and never touches sockets:
//!
//! - [`HttpServer`]: HTTP/1.1 over plain TCP
//! - [`HttpsServer`]: TLS with ALPN, HTTP/2 for `h2` peers and HTTP/1.1 for the rest
//! - [`Middleware`] / [`SimpleMiddleware`]: onion model chain shared by both protocols
//! - [`WebServerOptions`]: validated configuration
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use duo_http::protocol::{BoxError, HttpContext};
//! use duo_http::response::ResponseWriter;
//! use duo_web::{HttpServer, SimpleMiddleware, WebServerOptions};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl SimpleMiddleware for Hello {
//!     fn name(&self) -> &str {
//!         "hello"
//!     }
//!
//!     async fn on_request(&self, context: &mut HttpContext) -> Result<(), BoxError> {
//!         context.response.send("Hello World!").await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = HttpServer::new(WebServerOptions::new().port(8080))?;
//!     server.use_simple_middleware(Hello)?;
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

mod error;
pub mod middleware;
pub mod options;
pub mod server;

pub use error::ServerError;
pub use middleware::{Middleware, MiddlewarePipeline, Next, SimpleMiddleware};
pub use options::{Http2Options, OptionsError, TlsOptions, WebServerOptions};
pub use server::{HttpServer, HttpsServer, ServerBase};
