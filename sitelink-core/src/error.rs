//! Error types for sitelink-core

use thiserror::Error;

/// Main error type for the sitelink-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential or transient store failure
    #[error("store error: {0}")]
    Store(String),

    /// No credential is available, so no request was attempted
    #[error("this site is not connected to the collector")]
    NotConnected,

    /// The request never produced an HTTP response (DNS, connect, timeout)
    #[error("transport error ({code}): {message}")]
    Transport { code: &'static str, message: String },

    /// The collector answered with a status outside the accepted set
    #[error("collector rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl Error {
    /// Build a transport error from a failed HTTP request.
    pub(crate) fn transport(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connect"
        } else if err.is_body() {
            "body"
        } else if err.is_decode() {
            "decode"
        } else if err.is_request() {
            "request"
        } else {
            "http_request_failed"
        };

        Error::Transport {
            code,
            message: err.to_string(),
        }
    }
}

/// Result type alias for sitelink-core
pub type Result<T> = std::result::Result<T, Error>;
