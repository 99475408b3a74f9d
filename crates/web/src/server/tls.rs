//! TLS listener configuration.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::ServerError;
use crate::options::TlsOptions;

/// Protocols offered during ALPN, most preferred first.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

pub(crate) fn acceptor(options: &TlsOptions) -> Result<TlsAcceptor, ServerError> {
    let cert = read(&options.cert_path)?;
    let key = read(&options.key_path)?;
    Ok(TlsAcceptor::from(Arc::new(server_config(&cert, &key)?)))
}

/// Builds a rustls config from PEM encoded certificate chain and private key,
/// offering `h2` and `http/1.1` through ALPN.
pub fn server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig, ServerError> {
    let certs = rustls_pemfile::certs(&mut Cursor::new(cert_pem))
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .map_err(|e| ServerError::tls(format!("bad certificate: {e}")))?;
    if certs.is_empty() {
        return Err(ServerError::tls("no certificate found"));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut Cursor::new(key_pem))
        .map_err(|e| ServerError::tls(format!("bad private key: {e}")))?
        .ok_or_else(|| ServerError::tls("no private key found"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::tls(format!("could not load cert/key: {e}")))?;
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|protocol| protocol.to_vec()).collect();
    Ok(config)
}

fn read(path: &Path) -> Result<Vec<u8>, ServerError> {
    fs::read(path).map_err(|e| ServerError::tls(format!("cannot read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_reported() {
        let options = TlsOptions::new("/nonexistent/server.crt", "/nonexistent/server.key");
        let Err(error) = acceptor(&options) else {
            panic!("acceptor built from missing files");
        };
        assert!(matches!(
            error,
            ServerError::Tls { ref reason } if reason.starts_with("cannot read /nonexistent/server.crt")
        ));
    }

    #[test]
    fn empty_pem_is_rejected() {
        let error = server_config(b"", b"").unwrap_err();
        assert!(matches!(error, ServerError::Tls { ref reason } if reason == "no certificate found"));
    }
}
