//! Client error types

use thiserror::Error;

use crate::poller::OperationStatus;

/// Errors raised by the transport layer itself (before any status code is
/// interpreted)
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection-level failure (DNS, refused, reset)
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request did not complete within the transport timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The server answered with a retryable status (429 or 5xx) too many
    /// times in a row
    #[error("server returned status {0}")]
    ServerStatus(u16),

    /// The request could not be constructed
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors surfaced by the client layer
#[derive(Debug, Error)]
pub enum ClientError {
    /// The initiating response carries no pollable signal and does not
    /// indicate synchronous completion
    #[error("response (status {status}) carries no recognized operation tracking signal")]
    UnrecognizedOperation { status: u16 },

    /// Transport failures exhausted the retry budget
    #[error("transport failure polling {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// The operation reached a terminal failure state; `payload` is the
    /// server-reported error, verbatim
    #[error("operation {status}: {payload}")]
    OperationFailed {
        status: OperationStatus,
        payload: serde_json::Value,
    },

    /// The caller's cancellation signal fired
    #[error("operation canceled by caller")]
    Canceled,

    /// The operation did not complete within the configured timeout
    #[error("operation did not complete within the configured timeout")]
    DeadlineExceeded,

    /// A status response could not be interpreted
    #[error("invalid status response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

pub type ClientResult<T> = Result<T, ClientError>;
