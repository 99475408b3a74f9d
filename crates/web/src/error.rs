use std::io;

use thiserror::Error;

use crate::options::OptionsError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("middleware `{name}` is already registered")]
    MiddlewareExists { name: String },

    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("tls configuration error: {reason}")]
    Tls { reason: String },

    #[error("invalid options: {source}")]
    Options {
        #[from]
        source: OptionsError,
    },

    #[error("server is already started")]
    AlreadyStarted,

    #[error("server is not started")]
    NotStarted,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ServerError {
    pub fn middleware_exists<S: Into<String>>(name: S) -> Self {
        Self::MiddlewareExists { name: name.into() }
    }

    pub fn tls<S: ToString>(reason: S) -> Self {
        Self::Tls { reason: reason.to_string() }
    }
}
