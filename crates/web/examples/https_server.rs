//! Serves HTTP/2 and HTTP/1.1 over TLS.
//!
//! ```bash
//! openssl req -x509 -newkey rsa:2048 -nodes -subj /CN=localhost -keyout key.pem -out cert.pem
//! cargo run --example https_server -- cert.pem key.pem
//! curl -k --http2 https://localhost:8443/
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use duo_http::protocol::{BoxError, HttpContext};
use duo_http::response::ResponseWriter;
use duo_web::{HttpsServer, SimpleMiddleware, TlsOptions, WebServerOptions};
use futures::stream;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

struct Protocol;

#[async_trait]
impl SimpleMiddleware for Protocol {
    fn name(&self) -> &str {
        "protocol"
    }

    async fn on_request(&self, context: &mut HttpContext) -> Result<(), BoxError> {
        let protocol = if context.response.is_http2() { "h2" } else { "http/1.1" };
        let chunks = [Bytes::from("served over "), Bytes::from(protocol), Bytes::from("\n")];
        context.response.stream(stream::iter(chunks.map(Ok::<_, std::io::Error>))).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = std::env::args().skip(1);
    let (Some(cert), Some(key)) = (args.next(), args.next()) else {
        return Err("usage: https_server <cert.pem> <key.pem>".into());
    };

    let server = HttpsServer::new(WebServerOptions::new().port(8443).tls(TlsOptions::new(cert, key)))?;
    server.use_simple_middleware(Protocol)?;
    server.on_event(|event| println!("{event}"));

    server.start().await?;
    tokio::signal::ctrl_c().await?;
    server.stop().await?;
    Ok(())
}
