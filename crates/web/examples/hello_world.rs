use std::time::Instant;

use async_trait::async_trait;
use duo_http::protocol::{BoxError, HttpContext};
use duo_http::response::ResponseWriter;
use duo_web::{HttpServer, Middleware, Next, SimpleMiddleware, WebServerOptions};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

struct AccessLog;

#[async_trait]
impl Middleware for AccessLog {
    fn name(&self) -> &str {
        "access-log"
    }

    async fn on_request(&self, context: &mut HttpContext, next: Next<'_>) -> Result<(), BoxError> {
        let started = Instant::now();
        let method = context.request.method().clone();
        let path = context.request.path().to_owned();
        context.response.on_end(move |status| {
            info!(%method, %path, status = status.as_u16(), elapsed = ?started.elapsed(), "request served");
        });
        next.run(context).await
    }
}

struct HelloWorld;

#[async_trait]
impl SimpleMiddleware for HelloWorld {
    fn name(&self) -> &str {
        "hello-world"
    }

    async fn on_request(&self, context: &mut HttpContext) -> Result<(), BoxError> {
        if context.request.path_only() == "/" {
            context.response.set_header(http::header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref())?;
            context.response.send("hello world").await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server = HttpServer::new(WebServerOptions::new().port(3000))?;
    server.use_middleware(AccessLog)?.use_simple_middleware(HelloWorld)?;

    server.start().await?;
    tokio::signal::ctrl_c().await?;
    server.stop().await?;
    Ok(())
}
