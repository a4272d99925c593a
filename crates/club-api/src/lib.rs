//! Authenticated HTTP client for the Clubhouse API
//!
//! Call sites hold an `ApiClient` and issue requests by path. The client
//! attaches the stored bearer token, and when the backend answers with the
//! expiry signal (401 + `TOKEN_EXPIRED`) it refreshes the token once and
//! replays the request once. Concurrent expiries share a single refresh.
//!
//! Request lifecycle:
//! 1. `ApiClient::request()` resolves the path; foreign URLs bypass auth entirely
//! 2. Bearer token from `TokenStore` is attached, request sent
//! 3. Expiry signal → `RefreshCoordinator::refresh()` (starts or joins the single in-flight refresh)
//! 4. Original request replayed with the new token; that response is final
//! 5. Refresh failure → session cleared, `AuthEvent::SessionExpired` published, `Error::AuthExpired` returned

pub mod client;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod expiry;
pub mod metrics;
pub mod request;

#[cfg(test)]
mod test_support;

pub use client::{ApiClient, ClientOptions};
pub use coordinator::RefreshCoordinator;
pub use error::{Error, RefreshError, Result};
pub use events::{AuthEvent, AuthEvents, Subscription};
pub use expiry::{AuthSignal, classify_response, is_expiry_signal};
pub use request::{ApiResponse, RequestOptions};
