//! Session credentials for the Clubhouse API
//!
//! Owns everything the client needs to hold a login session: the durable
//! key-value storage seam, the token store layered on top of it, and typed
//! calls to the backend's auth endpoints. This crate has no knowledge of the
//! request pipeline; `club-api` composes it into the authenticated client.
//!
//! Session flow:
//! 1. `token::login()` exchanges email/password for a token pair
//! 2. `TokenStore::store_session()` persists tokens and the user snapshot
//! 3. On expiry, `token::refresh_token()` trades the refresh token for a new access token
//! 4. `TokenStore::clear_tokens()` wipes the session on logout or refresh failure

pub mod constants;
pub mod credentials;
pub mod error;
pub mod storage;
pub mod token;

pub use constants::*;
pub use credentials::{TokenPair, TokenStore, UserId, UserSnapshot};
pub use error::{Error, Result};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use token::{TokenResponse, login, logout, refresh_token};
