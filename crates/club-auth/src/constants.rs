//! Backend contract constants
//!
//! Endpoint paths are relative to the configured base URL. Storage key names
//! are shared with the mobile app so a session file written by either side
//! reads the same.

use std::time::Duration;

/// Durable storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "authToken";

/// Durable storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Durable storage key for the serialized user profile
pub const USER_DATA_KEY: &str = "userData";

/// Durable storage key for the user's role
pub const USER_ROLE_KEY: &str = "userRole";

/// Every key that belongs to a session. Cleared together.
pub const SESSION_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_DATA_KEY,
    USER_ROLE_KEY,
];

/// Email/password login
pub const LOGIN_PATH: &str = "/api/auth/login";

/// Refresh token exchange
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Server-side refresh token revocation
pub const LOGOUT_PATH: &str = "/api/auth/logout";

/// `code` value the backend puts in a 401 body when the access token expired.
pub const TOKEN_EXPIRED_CODE: &str = "TOKEN_EXPIRED";

/// Deadline applied to every outbound request unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
