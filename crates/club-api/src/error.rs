//! Error types for the authenticated request pipeline

use std::time::Duration;

/// Why a token refresh failed.
///
/// `Clone` because a single failure is delivered to every caller that was
/// waiting on the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh request timed out")]
    Timeout,

    #[error("refresh request failed: {0}")]
    Network(String),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("refresh task ended without a result")]
    Abandoned,
}

impl From<club_auth::Error> for RefreshError {
    fn from(err: club_auth::Error) -> Self {
        match err {
            club_auth::Error::Rejected { status, message } => {
                RefreshError::Rejected { status, message }
            }
            club_auth::Error::InvalidCredentials(message) => RefreshError::Rejected {
                status: 401,
                message,
            },
            club_auth::Error::Timeout(_) => RefreshError::Timeout,
            club_auth::Error::Http(msg) => RefreshError::Network(msg),
            club_auth::Error::TokenExchange(msg) | club_auth::Error::CredentialParse(msg) => {
                RefreshError::InvalidResponse(msg)
            }
            club_auth::Error::Io(msg) => RefreshError::Network(msg),
        }
    }
}

/// Errors surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}, check your connection")]
    Timeout(Duration),

    #[error("session expired: {0}")]
    AuthExpired(#[source] RefreshError),

    #[error("credentials rejected: {0}")]
    AuthInvalid(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Error::Timeout(timeout)
        } else {
            Error::Network(err.to_string())
        }
    }

    /// Transient failures worth offering a "try again" for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }

    /// The session is gone and the user has to sign in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, Error::AuthExpired(_))
    }
}

impl From<club_auth::Error> for Error {
    fn from(err: club_auth::Error) -> Self {
        match err {
            club_auth::Error::InvalidCredentials(msg) => Error::AuthInvalid(msg),
            club_auth::Error::Rejected { status, message } => Error::Api { status, message },
            club_auth::Error::Timeout(timeout) => Error::Timeout(timeout),
            club_auth::Error::Http(msg) | club_auth::Error::Io(msg) => Error::Network(msg),
            club_auth::Error::TokenExchange(msg) | club_auth::Error::CredentialParse(msg) => {
                Error::Decode(msg)
            }
        }
    }
}
