//! Administrative API error types.

use std::time::Duration;

use thiserror::Error;

pub type AdminResult<T> = Result<T, AdminError>;

/// Errors from a single administrative API call.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("failed to sign request: {0}")]
    Auth(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}
