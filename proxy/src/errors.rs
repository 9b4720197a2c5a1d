use crate::config::ValidationError;
use hyper::StatusCode;
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),
    #[error("upstream configuration error: {0}")]
    InvalidUpstream(String),
    #[error("invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
    #[error("failed to build request: {0}")]
    Http(#[from] http::Error),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("upstream request failed for {0}: {1}")]
    UpstreamUnreachable(String, String),
    #[error("upstream timeout for {0}")]
    UpstreamTimeout(String),
    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),
}

impl ProxyError {
    /// Status returned to the caller when this error ends a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnreachable(..) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
