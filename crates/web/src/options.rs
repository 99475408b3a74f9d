//! Server configuration.
//!
//! [`WebServerOptions`] can be built in code with the fluent setters or loaded
//! from JSON, where every duration is given in milliseconds:
//!
//! ```
//! use duo_web::WebServerOptions;
//!
//! let options = WebServerOptions::from_json_str(r#"{ "port": 8443, "http1_keep_alive_timeout": 2000 }"#).unwrap();
//! assert_eq!(options.port, 8443);
//! assert_eq!(options.http1_keep_alive_timeout.as_millis(), 2000);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use duo_http::codec::DEFAULT_MAX_HEADER_SIZE;
use duo_http::connection::{ConnectionConfig, Http2Settings};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIN_HEADER_SIZE: usize = 256;
const MAX_HEADER_SIZE: usize = 1024 * 1024;
const MAX_WINDOW_SIZE: u32 = (1 << 31) - 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionsError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("max_header_size must be between {MIN_HEADER_SIZE} and {MAX_HEADER_SIZE}, got {0}")]
    HeaderSize(usize),

    #[error("context_pool_size must be greater than zero")]
    EmptyPool,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("http2.max_concurrent_streams must be greater than zero")]
    NoStreams,

    #[error("http2.initial_window_size must be at most {MAX_WINDOW_SIZE}, got {0}")]
    WindowSize(u32),

    #[error("tls.{0} must not be empty")]
    EmptyTlsPath(&'static str),

    #[error("malformed options: {0}")]
    Malformed(String),
}

/// Certificate chain and private key, both PEM encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsOptions {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self { cert_path: cert_path.into(), key_path: key_path.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Http2Options {
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
}

impl Default for Http2Options {
    fn default() -> Self {
        let settings = Http2Settings::default();
        Self {
            max_concurrent_streams: settings.max_concurrent_streams,
            initial_window_size: settings.initial_window_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebServerOptions {
    pub host: String,
    pub port: u16,
    pub max_header_size: usize,
    pub context_pool_size: usize,
    #[serde(with = "millis")]
    pub idle_check_interval: Duration,
    #[serde(with = "millis")]
    pub http1_keep_alive_timeout: Duration,
    #[serde(with = "millis")]
    pub http2_keep_alive_timeout: Duration,
    pub tls: Option<TlsOptions>,
    pub http2: Http2Options,
}

impl Default for WebServerOptions {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            context_pool_size: connection.context_pool_size,
            idle_check_interval: Duration::from_secs(1),
            http1_keep_alive_timeout: connection.http1_keep_alive_timeout,
            http2_keep_alive_timeout: connection.http2_keep_alive_timeout,
            tls: None,
            http2: Http2Options::default(),
        }
    }
}

impl WebServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates options from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json).map_err(|e| OptionsError::Malformed(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    pub fn context_pool_size(mut self, size: usize) -> Self {
        self.context_pool_size = size;
        self
    }

    pub fn idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    pub fn http1_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.http1_keep_alive_timeout = timeout;
        self
    }

    pub fn http2_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.http2_keep_alive_timeout = timeout;
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn http2(mut self, http2: Http2Options) -> Self {
        self.http2 = http2;
        self
    }

    /// `host:port`, as handed to the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.host.trim().is_empty() {
            return Err(OptionsError::EmptyHost);
        }
        if !(MIN_HEADER_SIZE..=MAX_HEADER_SIZE).contains(&self.max_header_size) {
            return Err(OptionsError::HeaderSize(self.max_header_size));
        }
        if self.context_pool_size == 0 {
            return Err(OptionsError::EmptyPool);
        }
        for (name, value) in [
            ("idle_check_interval", self.idle_check_interval),
            ("http1_keep_alive_timeout", self.http1_keep_alive_timeout),
            ("http2_keep_alive_timeout", self.http2_keep_alive_timeout),
        ] {
            if value.is_zero() {
                return Err(OptionsError::ZeroDuration(name));
            }
        }
        if self.http2.max_concurrent_streams == 0 {
            return Err(OptionsError::NoStreams);
        }
        if self.http2.initial_window_size > MAX_WINDOW_SIZE {
            return Err(OptionsError::WindowSize(self.http2.initial_window_size));
        }
        if let Some(tls) = &self.tls {
            if tls.cert_path.as_os_str().is_empty() {
                return Err(OptionsError::EmptyTlsPath("cert_path"));
            }
            if tls.key_path.as_os_str().is_empty() {
                return Err(OptionsError::EmptyTlsPath("key_path"));
            }
        }
        Ok(())
    }

    /// Settings handed to every connection; the HTTP/2 header list limit is
    /// twice the HTTP/1.1 header block limit.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_header_size: self.max_header_size,
            context_pool_size: self.context_pool_size,
            http1_keep_alive_timeout: self.http1_keep_alive_timeout,
            http2_keep_alive_timeout: self.http2_keep_alive_timeout,
            http2: Http2Settings {
                max_concurrent_streams: self.http2.max_concurrent_streams,
                max_header_list_size: u32::try_from(self.max_header_size.saturating_mul(2)).unwrap_or(u32::MAX),
                initial_window_size: self.http2.initial_window_size,
            },
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn defaults_are_valid() {
        let options = WebServerOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.max_header_size, 8 * 1024);
        assert_eq!(options.context_pool_size, 128);
        assert_eq!(options.http1_keep_alive_timeout, Duration::from_secs(5));
        assert_eq!(options.http2_keep_alive_timeout, Duration::from_secs(30));
        assert_eq!(options.address(), "127.0.0.1:8080");
    }

    #[test]
    fn connection_config_derives_header_list_size() {
        let config = WebServerOptions::new().max_header_size(4096).connection_config();
        assert_eq!(config.max_header_size, 4096);
        assert_eq!(config.http2.max_header_list_size, 8192);
        assert_eq!(config.http2.max_concurrent_streams, 100);
        assert_eq!(config.http2.initial_window_size, 1024 * 1024);
    }

    #[test]
    fn loads_json_with_millisecond_durations() {
        let json = indoc! {r#"
            {
                "host": "0.0.0.0",
                "port": 8443,
                "idle_check_interval": 250,
                "http2_keep_alive_timeout": 60000,
                "tls": { "cert_path": "certs/server.crt", "key_path": "certs/server.key" },
                "http2": { "max_concurrent_streams": 16 }
            }
        "#};

        let options = WebServerOptions::from_json_str(json).unwrap();
        assert_eq!(options.host, "0.0.0.0");
        assert_eq!(options.port, 8443);
        assert_eq!(options.idle_check_interval, Duration::from_millis(250));
        assert_eq!(options.http2_keep_alive_timeout, Duration::from_secs(60));
        assert_eq!(options.http1_keep_alive_timeout, Duration::from_secs(5));
        assert_eq!(options.tls, Some(TlsOptions::new("certs/server.crt", "certs/server.key")));
        assert_eq!(options.http2.max_concurrent_streams, 16);
        assert_eq!(options.http2.initial_window_size, 1024 * 1024);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(WebServerOptions::new().host(" ").validate(), Err(OptionsError::EmptyHost));
        assert_eq!(WebServerOptions::new().max_header_size(16).validate(), Err(OptionsError::HeaderSize(16)));
        assert_eq!(WebServerOptions::new().context_pool_size(0).validate(), Err(OptionsError::EmptyPool));
        assert_eq!(
            WebServerOptions::new().idle_check_interval(Duration::ZERO).validate(),
            Err(OptionsError::ZeroDuration("idle_check_interval"))
        );
        assert_eq!(
            WebServerOptions::new()
                .http2(Http2Options { max_concurrent_streams: 0, ..Http2Options::default() })
                .validate(),
            Err(OptionsError::NoStreams)
        );
        assert_eq!(
            WebServerOptions::new().tls(TlsOptions::new("", "key.pem")).validate(),
            Err(OptionsError::EmptyTlsPath("cert_path"))
        );
    }

    #[test]
    fn malformed_json_is_reported() {
        let error = WebServerOptions::from_json_str(r#"{ "port": "eighty" }"#).unwrap_err();
        assert!(matches!(error, OptionsError::Malformed(_)));
    }
}
