//! Onion model middleware chain.
//!
//! A [`Middleware`] receives the context together with a [`Next`]
//! continuation and decides whether (and when) to call it; code after
//! `next.run(..).await` runs on the way back out, in reverse registration
//! order. A [`SimpleMiddleware`] has no continuation: it runs, and the chain
//! moves on unless it already sent the response.
//!
//! The [`MiddlewarePipeline`] keeps the ordered registry and recompiles the
//! executable chain on every registration, so dispatch only loads a snapshot.
//! It is also the single place where application failures are recovered:
//! an error or panic from the chain becomes a `500` response.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use duo_http::event::EventSink;
use duo_http::handler::Dispatcher;
use duo_http::protocol::{BoxError, HttpContext};
use duo_http::response::ResponseWriter;
use futures::FutureExt;
use http::{HeaderValue, StatusCode, header};
use tracing::debug;

use crate::ServerError;

const INTERNAL_ERROR_BODY: &str = "Internal Server Error";
const NOT_FOUND_BODY: &str = "Not Found";

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Unique name inside one server.
    fn name(&self) -> &str;

    async fn on_request(&self, context: &mut HttpContext, next: Next<'_>) -> Result<(), BoxError>;
}

/// Middleware that never calls the rest of the chain itself.
#[async_trait]
pub trait SimpleMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn on_request(&self, context: &mut HttpContext) -> Result<(), BoxError>;
}

#[derive(Clone)]
enum Layer {
    Chained(Arc<dyn Middleware>),
    Simple(Arc<dyn SimpleMiddleware>),
}

impl Layer {
    fn name(&self) -> &str {
        match self {
            Layer::Chained(middleware) => middleware.name(),
            Layer::Simple(middleware) => middleware.name(),
        }
    }
}

/// The part of the chain after the current middleware.
pub struct Next<'a> {
    layers: &'a [Layer],
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.layers.iter().map(Layer::name)).finish()
    }
}

impl<'a> Next<'a> {
    /// Runs the remaining middleware; resolves once the innermost one returns.
    pub async fn run(mut self, context: &mut HttpContext) -> Result<(), BoxError> {
        while let Some((layer, rest)) = self.layers.split_first() {
            self.layers = rest;
            match layer {
                Layer::Chained(middleware) => return middleware.on_request(context, self).await,
                Layer::Simple(middleware) => {
                    middleware.on_request(context).await?;
                    if context.response.is_sent() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Ordered middleware registry plus its compiled chain.
pub struct MiddlewarePipeline {
    registry: Mutex<Vec<Layer>>,
    chain: ArcSwap<Vec<Layer>>,
    events: Arc<EventSink>,
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewarePipeline").field("middleware", &self.names()).finish_non_exhaustive()
    }
}

impl MiddlewarePipeline {
    pub fn new(events: Arc<EventSink>) -> Self {
        Self { registry: Mutex::new(Vec::new()), chain: ArcSwap::from_pointee(Vec::new()), events }
    }

    pub fn push<M: Middleware + 'static>(&self, middleware: M) -> Result<(), ServerError> {
        self.register(Layer::Chained(Arc::new(middleware)))
    }

    pub fn push_simple<M: SimpleMiddleware + 'static>(&self, middleware: M) -> Result<(), ServerError> {
        self.register(Layer::Simple(Arc::new(middleware)))
    }

    /// Registered names in execution order.
    pub fn names(&self) -> Vec<String> {
        self.chain.load().iter().map(|layer| layer.name().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.chain.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, layer: Layer) -> Result<(), ServerError> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.iter().any(|registered| registered.name() == layer.name()) {
            return Err(ServerError::middleware_exists(layer.name()));
        }
        debug!(name = layer.name(), position = registry.len(), "middleware registered");
        registry.push(layer);
        self.chain.store(Arc::new(registry.clone()));
        Ok(())
    }

    /// Runs the chain; failures are reported and answered with a `500`.
    pub async fn run(&self, context: &mut HttpContext) {
        let chain = self.chain.load_full();
        let outcome = AssertUnwindSafe(Next { layers: &chain }.run(context)).catch_unwind().await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };

        if let Some(cause) = failure {
            let request = &context.request;
            self.events.error(format!("middleware failed on {} {}: {cause}", request.method(), request.path()));
            write_fallback(context, StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).await;
        } else {
            write_fallback(context, StatusCode::NOT_FOUND, NOT_FOUND_BODY).await;
        }
    }
}

impl Dispatcher for MiddlewarePipeline {
    async fn dispatch(&self, context: &mut HttpContext) {
        self.run(context).await;
    }
}

/// Replaces whatever the chain left behind with a plain text answer, unless
/// the response already went out.
async fn write_fallback(context: &mut HttpContext, status: StatusCode, body: &'static str) {
    let response = &mut context.response;
    if response.is_sent() {
        return;
    }
    response.headers_mut().clear();
    response.set_status(status, None);
    if let Ok(content_type) = HeaderValue::from_str(mime::TEXT_PLAIN_UTF_8.as_ref()) {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    if let Err(e) = response.send(body).await {
        debug!(cause = %e, status = status.as_u16(), "failed to write fallback response");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duo_http::connection::SocketWriter;
    use duo_http::event::ServerEvent;
    use duo_http::protocol::{RequestBody, RequestHead};
    use duo_http::response::ResponseTarget;
    use tokio::io::AsyncReadExt;

    struct Recorder {
        name: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_request(&self, context: &mut HttpContext, next: Next<'_>) -> Result<(), BoxError> {
            self.trace.lock().unwrap().push(format!("{} in", self.name));
            next.run(context).await?;
            self.trace.lock().unwrap().push(format!("{} out", self.name));
            Ok(())
        }
    }

    struct Reply(&'static str);

    #[async_trait]
    impl SimpleMiddleware for Reply {
        fn name(&self) -> &str {
            "reply"
        }

        async fn on_request(&self, context: &mut HttpContext) -> Result<(), BoxError> {
            context.response.send(self.0).await?;
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl SimpleMiddleware for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        async fn on_request(&self, _context: &mut HttpContext) -> Result<(), BoxError> {
            Err("boom".into())
        }
    }

    struct Panic;

    #[async_trait]
    impl SimpleMiddleware for Panic {
        fn name(&self) -> &str {
            "panic"
        }

        async fn on_request(&self, _context: &mut HttpContext) -> Result<(), BoxError> {
            panic!("middleware exploded")
        }
    }

    async fn dispatch(pipeline: &MiddlewarePipeline) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let (handle, writer) = SocketWriter::new(server);
        let writer = tokio::spawn(writer.run());

        let mut context = HttpContext::new();
        context.initialize(RequestHead::default(), RequestBody::empty(), ResponseTarget::Socket(handle.clone()));
        pipeline.run(&mut context).await;
        context.reset();
        handle.close().await;
        writer.await.unwrap().unwrap();

        let mut output = String::new();
        let mut client = client;
        client.read_to_string(&mut output).await.unwrap();
        output
    }

    #[tokio::test]
    async fn onion_ordering() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = MiddlewarePipeline::new(Arc::new(EventSink::new()));
        for name in ["first", "second", "third"] {
            pipeline.push(Recorder { name, trace: Arc::clone(&trace) }).unwrap();
        }
        pipeline.push_simple(Reply("OK")).unwrap();

        let output = dispatch(&pipeline).await;

        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.ends_with("\r\n\r\nOK"));
        assert_eq!(
            *trace.lock().unwrap(),
            ["first in", "second in", "third in", "third out", "second out", "first out"]
        );
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let pipeline = MiddlewarePipeline::new(Arc::new(EventSink::new()));
        pipeline.push_simple(Reply("a")).unwrap();

        let error = pipeline.push_simple(Reply("b")).unwrap_err();

        assert!(matches!(error, ServerError::MiddlewareExists { ref name } if name == "reply"));
        assert_eq!(pipeline.names(), ["reply"]);
    }

    #[tokio::test]
    async fn simple_middleware_stops_the_chain_once_sent() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = MiddlewarePipeline::new(Arc::new(EventSink::new()));
        pipeline.push_simple(Reply("early")).unwrap();
        pipeline.push(Recorder { name: "late", trace: Arc::clone(&trace) }).unwrap();

        let output = dispatch(&pipeline).await;

        assert!(output.ends_with("\r\n\r\nearly"));
        assert!(trace.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_chain_answers_not_found() {
        let pipeline = MiddlewarePipeline::new(Arc::new(EventSink::new()));

        let output = dispatch(&pipeline).await;

        assert!(output.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(output.contains("content-type: text/plain; charset=utf-8\r\n"));
        assert!(output.ends_with("\r\n\r\nNot Found"));
    }

    #[tokio::test]
    async fn errors_and_panics_become_internal_server_error() {
        for failing in [true, false] {
            let events = Arc::new(EventSink::new());
            let seen = Arc::new(Mutex::new(Vec::new()));
            let recorder = Arc::clone(&seen);
            events.set_hook(Arc::new(move |event: &ServerEvent| recorder.lock().unwrap().push(event.clone())));

            let pipeline = MiddlewarePipeline::new(events);
            if failing {
                pipeline.push_simple(Fail).unwrap();
            } else {
                pipeline.push_simple(Panic).unwrap();
            }

            let output = dispatch(&pipeline).await;

            assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
            assert!(output.ends_with("\r\n\r\nInternal Server Error"));
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert!(seen[0].detail.starts_with("middleware failed on GET /"));
        }
    }
}
