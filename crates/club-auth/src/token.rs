//! Auth endpoint calls
//!
//! Handles the three session interactions with the backend:
//! 1. Login (email/password → token pair + profile)
//! 2. Token refresh (refresh token → new access token)
//! 3. Logout (server-side revocation of the refresh token)
//!
//! Refresh and logout are the only requests that ever carry the refresh token.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};
use crate::credentials::UserSnapshot;
use crate::error::{Error, Result};

/// Success body of the login and refresh endpoints.
///
/// `refresh_token` is optional on refresh: when absent the previous refresh
/// token stays valid. `user` is present when the backend sends an updated
/// profile.
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSnapshot>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

/// Failure body: `{ "error": "..." }`, sometimes `{ "message": "..." }`.
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Pull a human-readable message out of an error response body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ if body.is_empty() => String::from("<no body>"),
        _ => body.to_string(),
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

async fn read_token_response(response: reqwest::Response, context: &str) -> Result<TokenResponse> {
    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid {context} response: {e}")))
}

/// Exchange email and password for a token pair.
///
/// A 401 means the credentials were wrong; it never indicates expiry here.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &str,
    timeout: Duration,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint(base_url, LOGIN_PATH))
        .timeout(timeout)
        .json(&LoginRequest { email, password })
        .send()
        .await
        .map_err(|e| Error::from_transport("login request failed", e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        if status.as_u16() == 401 {
            return Err(Error::InvalidCredentials(message));
        }
        return Err(Error::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    debug!("login accepted");
    read_token_response(response, "login").await
}

/// Trade a refresh token for a new access token.
///
/// Any non-2xx status is a rejection; the caller decides whether that ends
/// the session.
pub async fn refresh_token(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
    timeout: Duration,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoint(base_url, REFRESH_PATH))
        .timeout(timeout)
        .json(&RefreshTokenRequest {
            refresh_token: refresh,
        })
        .send()
        .await
        .map_err(|e| Error::from_transport("token refresh request failed", e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    read_token_response(response, "refresh").await
}

/// Ask the backend to revoke the refresh token.
pub async fn logout(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
    timeout: Duration,
) -> Result<()> {
    let response = client
        .post(endpoint(base_url, LOGOUT_PATH))
        .timeout(timeout)
        .json(&RefreshTokenRequest {
            refresh_token: refresh,
        })
        .send()
        .await
        .map_err(|e| Error::from_transport("logout request failed", e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    Ok(())
}
