//! Error types for session and auth endpoint operations

use std::time::Duration;

/// Errors from auth endpoint calls and credential storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request timed out after {0:?}, check your connection")]
    Timeout(Duration),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("auth endpoint rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn from_transport(context: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Error::Timeout(timeout)
        } else {
            Error::Http(format!("{context}: {err}"))
        }
    }
}
