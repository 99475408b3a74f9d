//! Socket level HTTP/1.1 and HTTP/2 engine.
//!
//! This crate does the byte-level protocol work of a web server: it finds
//! request headers across arbitrary TCP read boundaries, keeps per-connection
//! HTTP/1.1 state (keep-alive, pipelining, request bodies), drives HTTP/2
//! sessions through `h2`, and writes protocol correct responses. What happens
//! with a request is left to a [`handler::Dispatcher`].
//!
//! # Architecture
//!
//! - [`codec`]: [`codec::HeaderParser`], request head parsing, response head
//!   and chunked body encoding
//! - [`protocol`]: [`protocol::HeaderCollection`], request types, the pooled
//!   [`protocol::HttpContext`] and the error types
//! - [`response`]: the one-shot [`response::ResponseWriter`] contract with its
//!   HTTP/1.1 and HTTP/2 implementations behind the [`response::Response`] facade
//! - [`connection`]: [`connection::serve_http1`] and [`connection::serve_http2`],
//!   plus the socket and session registries used for idle eviction and shutdown
//! - [`event`]: the observability hook
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use duo_http::connection::{ConnectionConfig, ConnectionShared, serve_http1};
//! use duo_http::handler::Dispatcher;
//! use duo_http::protocol::HttpContext;
//! use duo_http::response::ResponseWriter;
//! use tokio::net::TcpListener;
//!
//! struct HelloWorld;
//!
//! impl Dispatcher for HelloWorld {
//!     async fn dispatch(&self, context: &mut HttpContext) {
//!         let _ = context.response.send("Hello World!\r\n").await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let shared = Arc::new(ConnectionShared::new(HelloWorld, ConnectionConfig::default()));
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         tokio::spawn(serve_http1(Arc::clone(&shared), stream));
//!     }
//! }
//! ```
//!
//! # Limits
//!
//! - Maximum header block size: configurable, 8KB by default
//! - Maximum number of headers: 64
//! - Request bodies must be framed by `Content-Length`

pub mod codec;
pub mod connection;
pub mod event;
pub mod handler;
pub mod protocol;
pub mod response;

mod utils;
pub(crate) use utils::ensure;
