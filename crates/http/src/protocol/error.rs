use std::error::Error;
use std::io;
use std::io::ErrorKind;
use thiserror::Error;

/// Boxed error produced by application code (middleware, body streams).
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: ResponseError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("http2 error: {source}")]
    H2 {
        #[from]
        source: h2::Error,
    },
}

impl HttpError {
    /// Whether this error is an expected client disconnect that should not be reported.
    pub fn is_benign(&self) -> bool {
        match self {
            HttpError::Io { source } => is_benign_io(source),
            HttpError::RequestError { source: ParseError::Io { source } } => is_benign_io(source),
            HttpError::ResponseError { source } => source.is_benign(),
            HttpError::H2 { source } => is_benign_h2(source),
            HttpError::RequestError { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("chunked request body is not supported")]
    ChunkedBodyUnsupported,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("response already sent")]
    AlreadySent,

    #[error("response is not bound to a socket or stream")]
    Unbound,

    #[error("connection closed before the response was written")]
    Closed,

    #[error("invalid response header: {source}")]
    InvalidHeader {
        #[from]
        source: http::Error,
    },

    #[error("response body failed: {source}")]
    Body { source: BoxError },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("http2 stream error: {source}")]
    H2 {
        #[from]
        source: h2::Error,
    },
}

impl ResponseError {
    pub fn body<E: Into<BoxError>>(e: E) -> Self {
        Self::Body { source: e.into() }
    }

    /// Whether the failure comes from the peer going away rather than a bug.
    pub fn is_benign(&self) -> bool {
        match self {
            ResponseError::Closed => true,
            ResponseError::Io { source } => is_benign_io(source),
            ResponseError::H2 { source } => is_benign_h2(source),
            _ => false,
        }
    }
}

/// Error surfaced while reading a request body.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("http2 stream error: {source}")]
    H2 {
        #[from]
        source: h2::Error,
    },
}

/// Reset, broken pipe and aborted connections are normal client behaviour.
pub fn is_benign_io(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted)
}

fn is_benign_h2(e: &h2::Error) -> bool {
    if let Some(io) = e.get_io() {
        return is_benign_io(io);
    }
    e.reason() == Some(h2::Reason::CANCEL) || e.reason() == Some(h2::Reason::NO_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_and_pipe_errors_are_benign() {
        for kind in [ErrorKind::ConnectionReset, ErrorKind::BrokenPipe, ErrorKind::ConnectionAborted] {
            let error = HttpError::from(io::Error::from(kind));
            assert!(error.is_benign(), "{kind:?} should be benign");
        }

        let error = HttpError::from(io::Error::from(ErrorKind::PermissionDenied));
        assert!(!error.is_benign());
    }

    #[test]
    fn programmer_errors_are_not_benign() {
        assert!(!ResponseError::AlreadySent.is_benign());
        assert!(ResponseError::Closed.is_benign());
        assert!(!HttpError::from(ParseError::too_large_header(10, 5)).is_benign());
    }
}
