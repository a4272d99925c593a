//! Expiry signal detection
//!
//! The backend reports an expired access token as a 401 whose JSON body has
//! `code: "TOKEN_EXPIRED"`. That exact pairing is the only thing that
//! triggers a refresh. A bare 401 (wrong password, revoked account, malformed
//! token) is passed through to the caller untouched.

use club_auth::TOKEN_EXPIRED_CODE;
use serde::Deserialize;

/// What a response says about the caller's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSignal {
    /// Not an auth failure.
    None,
    /// Access token expired; refresh and retry.
    Expired,
    /// Credentials rejected for some other reason; never refreshed.
    Rejected,
}

#[derive(Deserialize)]
struct CodeBody {
    code: Option<String>,
}

/// Classify a response by status and body.
pub fn classify_response(status: u16, body: &[u8]) -> AuthSignal {
    if status != 401 {
        return AuthSignal::None;
    }
    match serde_json::from_slice::<CodeBody>(body) {
        Ok(CodeBody { code: Some(code) }) if code == TOKEN_EXPIRED_CODE => AuthSignal::Expired,
        _ => AuthSignal::Rejected,
    }
}

/// Whether a response is the expiry signal.
pub fn is_expiry_signal(status: u16, body: &[u8]) -> bool {
    classify_response(status, body) == AuthSignal::Expired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_code_on_401_is_expiry() {
        let body = br#"{"error":"Token expired","code":"TOKEN_EXPIRED"}"#;
        assert_eq!(classify_response(401, body), AuthSignal::Expired);
        assert!(is_expiry_signal(401, body));
    }

    #[test]
    fn plain_401_is_rejection() {
        let body = br#"{"error":"Invalid credentials"}"#;
        assert_eq!(classify_response(401, body), AuthSignal::Rejected);
        assert!(!is_expiry_signal(401, body));
    }

    #[test]
    fn other_code_on_401_is_rejection() {
        let body = br#"{"code":"TOKEN_INVALID"}"#;
        assert_eq!(classify_response(401, body), AuthSignal::Rejected);
    }

    #[test]
    fn code_match_is_case_sensitive() {
        let body = br#"{"code":"token_expired"}"#;
        assert_eq!(classify_response(401, body), AuthSignal::Rejected);
    }

    #[test]
    fn non_json_401_is_rejection() {
        assert_eq!(classify_response(401, b"Unauthorized"), AuthSignal::Rejected);
        assert_eq!(classify_response(401, b""), AuthSignal::Rejected);
    }

    #[test]
    fn expired_code_on_other_status_is_ignored() {
        let body = br#"{"code":"TOKEN_EXPIRED"}"#;
        assert_eq!(classify_response(403, body), AuthSignal::None);
        assert_eq!(classify_response(200, body), AuthSignal::None);
    }

    #[test]
    fn non_string_code_is_rejection() {
        assert_eq!(classify_response(401, br#"{"code":401}"#), AuthSignal::Rejected);
    }
}
