//! Single-flight token refresh
//!
//! At most one refresh request is outstanding at any time. Every caller that
//! asks for a refresh while one is running joins it instead of starting
//! another, and all of them receive the same outcome.
//!
//! State machine:
//! - Idle → (refresh requested) → Refreshing: flag set, refresh task spawned
//! - Refreshing → (refresh requested) → Refreshing: caller queued
//! - Refreshing → (success) → Idle: tokens stored, waiters resolved in queue order
//! - Refreshing → (failure) → Idle: session cleared, `SessionExpired` published
//!   once, waiters rejected in queue order
//!
//! The flag and the queue live under one `std::sync::Mutex` that is never held
//! across an `.await`, so "start a refresh or join one" is a single step. The
//! refresh runs in its own task: a caller that stops polling cannot strand the
//! flag or the other waiters.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use club_auth::TokenStore;
use common::Secret;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::events::{AuthEvent, AuthEvents};

type RefreshOutcome = Result<Secret<String>, RefreshError>;

/// A caller suspended until the in-flight refresh settles.
type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<Waiter>,
}

struct Shared {
    http: reqwest::Client,
    base_url: String,
    /// Deadline for the refresh call, the same one the client applies to requests.
    timeout: Duration,
    store: TokenStore,
    events: AuthEvents,
    state: Mutex<RefreshState>,
}

/// Refresh coordinator. Clones share the same flag and queue.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        timeout: Duration,
        store: TokenStore,
        events: AuthEvents,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                http,
                base_url: base_url.into(),
                timeout,
                store,
                events,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Obtain a fresh access token, starting a refresh or joining the one in
    /// flight.
    pub async fn refresh(&self) -> Result<Secret<String>, RefreshError> {
        let (tx, rx) = oneshot::channel();
        if self.enqueue(tx) {
            let shared = self.shared.clone();
            tokio::spawn(async move { shared.run().await });
        }
        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.state().refreshing
    }

    /// Queue a waiter. Returns true when this call moved Idle → Refreshing and
    /// therefore owns starting the refresh.
    fn enqueue(&self, waiter: Waiter) -> bool {
        let mut state = self.shared.state();
        state.waiters.push_back(waiter);
        if state.refreshing {
            debug!(waiters = state.waiters.len(), "joining in-flight token refresh");
            false
        } else {
            state.refreshing = true;
            debug!("starting token refresh");
            true
        }
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self) {
        let outcome = self.exchange().await;

        match &outcome {
            Ok(_) => {
                crate::metrics::record_refresh("success");
                info!("token refresh succeeded");
            }
            Err(e) => {
                crate::metrics::record_refresh("failure");
                warn!(error = %e, "token refresh failed, clearing session");
                self.store.clear_tokens().await;
            }
        }

        let waiters = {
            let mut state = self.state();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };

        // Subscribers hear about the dead session before any caller sees the
        // error, so a caller reacting to AuthExpired finds the teardown done.
        if outcome.is_err() {
            self.events.publish(AuthEvent::SessionExpired);
        }

        debug!(waiters = waiters.len(), "settling refresh waiters");
        for waiter in waiters {
            // A closed receiver just means that caller went away.
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn exchange(&self) -> Result<Secret<String>, RefreshError> {
        let refresh = self
            .store
            .refresh_token()
            .await
            .ok_or(RefreshError::MissingRefreshToken)?;

        let response = club_auth::refresh_token(
            &self.http,
            &self.base_url,
            refresh.expose_str(),
            self.timeout,
        )
        .await?;

        self.store
            .store_session(
                &response.access_token,
                response.refresh_token.as_deref(),
                response.user.as_ref(),
            )
            .await;

        Ok(Secret::new(response.access_token))
    }
}
