//! Token store for the signed-in session
//!
//! Wraps a `Storage` backend with the session's key layout: access token,
//! refresh token, serialized user profile and role. Credential reads and
//! writes must never abort the request that triggered them, so every storage
//! error is logged here and absorbed. Reads fall back to `None`, writes become
//! no-ops.

use std::fmt;
use std::sync::Arc;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{
    ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, USER_DATA_KEY, USER_ROLE_KEY,
};
use crate::storage::{MemoryStorage, Storage};

/// Tokens currently held for the session. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenPair {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
}

/// Backend user id. The API serializes integer primary keys, but older
/// responses carried string ids, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{n}"),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// Denormalized profile cached alongside the tokens.
///
/// Fields the client doesn't model are kept in `extra` so a round trip
/// through storage doesn't drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: UserId,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Session credential store.
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Read both tokens in one storage call.
    pub async fn get_tokens(&self) -> TokenPair {
        match self
            .storage
            .get_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
            .await
        {
            Ok(values) => {
                let mut values = values.into_iter();
                TokenPair {
                    access_token: values.next().flatten().map(Secret::new),
                    refresh_token: values.next().flatten().map(Secret::new),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read tokens, treating session as empty");
                TokenPair::default()
            }
        }
    }

    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.get_tokens().await.access_token
    }

    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.get_tokens().await.refresh_token
    }

    pub async fn is_authenticated(&self) -> bool {
        self.access_token().await.is_some()
    }

    /// Write the access token, and the refresh token only when one is given.
    ///
    /// Passing `None` for `refresh` leaves any stored refresh token in place.
    pub async fn set_tokens(&self, access: &str, refresh: Option<&str>) {
        self.store_session(access, refresh, None).await;
    }

    /// Persist the outcome of a login or refresh in a single write.
    ///
    /// Same partial-update rule as `set_tokens`; the user snapshot (and its
    /// role) is written only when present.
    pub async fn store_session(
        &self,
        access: &str,
        refresh: Option<&str>,
        user: Option<&UserSnapshot>,
    ) {
        let mut entries: Vec<(&str, String)> = vec![(ACCESS_TOKEN_KEY, access.to_string())];
        if let Some(refresh) = refresh {
            entries.push((REFRESH_TOKEN_KEY, refresh.to_string()));
        }
        if let Some(user) = user {
            match serde_json::to_string(user) {
                Ok(json) => {
                    entries.push((USER_DATA_KEY, json));
                    entries.push((USER_ROLE_KEY, user.role.clone()));
                }
                Err(e) => warn!(error = %e, "failed to serialize user snapshot, skipping"),
            }
        }

        match self.storage.set_many(&entries).await {
            Ok(()) => debug!(
                refresh_updated = refresh.is_some(),
                user_updated = user.is_some(),
                "stored session tokens"
            ),
            Err(e) => warn!(error = %e, "failed to store session tokens"),
        }
    }

    /// Remove tokens, profile and role in one storage call.
    pub async fn clear_tokens(&self) {
        match self.storage.remove_many(&SESSION_KEYS).await {
            Ok(()) => debug!("cleared session"),
            Err(e) => warn!(error = %e, "failed to clear session"),
        }
    }

    pub async fn set_user(&self, user: &UserSnapshot) {
        let json = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize user snapshot");
                return;
            }
        };
        if let Err(e) = self
            .storage
            .set_many(&[(USER_DATA_KEY, json), (USER_ROLE_KEY, user.role.clone())])
            .await
        {
            warn!(error = %e, "failed to store user snapshot");
        }
    }

    /// Cached profile, or `None` if absent or unreadable.
    pub async fn get_user(&self) -> Option<UserSnapshot> {
        let raw = match self.storage.get_many(&[USER_DATA_KEY]).await {
            Ok(values) => values.into_iter().next().flatten()?,
            Err(e) => {
                warn!(error = %e, "failed to read user snapshot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "stored user snapshot is malformed, ignoring");
                None
            }
        }
    }

    /// Stored role, written alongside the snapshot.
    pub async fn user_role(&self) -> Option<String> {
        match self.storage.get_many(&[USER_ROLE_KEY]).await {
            Ok(values) => values.into_iter().next().flatten(),
            Err(e) => {
                warn!(error = %e, "failed to read user role");
                None
            }
        }
    }
}
