//! Error types shared by the remote-service capabilities.

use thiserror::Error;

/// A call to the remote assistant service failed.
///
/// Covers network failures, non-success responses and bodies that do not
/// have the expected shape. The poller and the classifier never retry on
/// this error; retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the service.
        message: String,
    },

    /// The response body was missing an expected field or could not be parsed.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The client could not be configured (bad header value, TLS setup).
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// HTTP status code reported by the service, if the request got that far.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
