//! Authenticated request executor
//!
//! `ApiClient` is handed to every call site that talks to the backend. It
//! resolves the path, attaches the bearer token, and on the expiry signal
//! asks the `RefreshCoordinator` for a new token and replays the request
//! exactly once. The replayed response is returned whatever its status, so
//! a token that is rejected again can't cause a retry loop.
//!
//! URLs outside the API (third-party services, static assets) skip all of
//! this and go out untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use club_auth::{DEFAULT_TIMEOUT, TokenStore, UserSnapshot};
use common::Secret;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::events::{AuthEvent, AuthEvents};
use crate::expiry::{AuthSignal, classify_response};
use crate::request::{ApiResponse, RequestOptions, Target, resolve};

/// Header carrying a per-attempt id, for correlating client and server logs.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Where the API lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    /// Path prefix that marks an absolute URL as belonging to the API.
    pub api_prefix: String,
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: String::from("/api"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::InvalidRequest(format!(
                "base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(Error::InvalidRequest(format!(
                "api_prefix must start with '/', got: {}",
                self.api_prefix
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidRequest("timeout must be greater than 0".into()));
        }
        Ok(())
    }
}

/// HTTP client for the club API with transparent token refresh.
///
/// Cheap to clone; clones share the token store, refresh coordinator and
/// event registry.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    options: Arc<ClientOptions>,
    store: TokenStore,
    coordinator: RefreshCoordinator,
    events: AuthEvents,
}

impl ApiClient {
    pub fn new(options: ClientOptions, store: TokenStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::InvalidRequest(format!("building HTTP client: {e}")))?;
        Self::with_http_client(http, options, store)
    }

    /// Build on an existing reqwest client (shared connection pool, custom TLS).
    pub fn with_http_client(
        http: reqwest::Client,
        mut options: ClientOptions,
        store: TokenStore,
    ) -> Result<Self> {
        options.validate()?;
        options.base_url = options.base_url.trim_end_matches('/').to_string();

        let events = AuthEvents::new();
        let coordinator = RefreshCoordinator::new(
            http.clone(),
            options.base_url.clone(),
            options.timeout,
            store.clone(),
            events.clone(),
        );
        Ok(Self {
            http,
            options: Arc::new(options),
            store,
            coordinator,
            events,
        })
    }

    /// Subscribe here to learn when the session ends.
    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send a request.
    ///
    /// Non-2xx responses are returned as `Ok`; only transport failures,
    /// timeouts and a failed refresh are errors.
    #[instrument(skip_all, fields(method = %options.method, path = %path))]
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<ApiResponse> {
        match resolve(&self.options.base_url, &self.options.api_prefix, path) {
            Target::Api(url) => self.send_authenticated(&url, &options).await,
            Target::External(url) => {
                debug!("outside API prefix, sending without credentials");
                self.send_once("external", &url, &options, None).await
            }
        }
    }

    async fn send_authenticated(&self, url: &str, options: &RequestOptions) -> Result<ApiResponse> {
        let token = self.store.access_token().await;
        if token.is_none() {
            debug!("no access token stored, sending unauthenticated");
        }

        let response = self.send_once("api", url, options, token.as_ref()).await?;
        match classify_response(response.status().as_u16(), response.bytes()) {
            AuthSignal::Expired => {}
            AuthSignal::Rejected => {
                debug!("401 without expiry code, not refreshing");
                return Ok(response);
            }
            AuthSignal::None => return Ok(response),
        }

        // The expiry may be for a token another request already replaced.
        let fresh = match (self.store.access_token().await, token) {
            (Some(current), Some(sent)) if current != sent => {
                debug!("token already refreshed since this request was sent");
                current
            }
            _ => {
                debug!("access token expired, waiting for refresh");
                self.coordinator
                    .refresh()
                    .await
                    .map_err(Error::AuthExpired)?
            }
        };

        crate::metrics::record_retry();
        debug!("replaying request with refreshed token");
        self.send_once("api", url, options, Some(&fresh)).await
    }

    async fn send_once(
        &self,
        route: &'static str,
        url: &str,
        options: &RequestOptions,
        token: Option<&Secret<String>>,
    ) -> Result<ApiResponse> {
        let request_id = Uuid::new_v4().to_string();
        let timeout = options.timeout.unwrap_or(self.options.timeout);

        let mut headers = options.headers.clone();
        if route == "api" {
            // Only the stored session may authenticate API calls.
            headers.remove(AUTHORIZATION);
        }

        let mut builder = self
            .http
            .request(options.method.clone(), url)
            .headers(headers)
            .header(REQUEST_ID_HEADER, &request_id)
            .timeout(timeout);
        if let Some(token) = token {
            builder = builder.bearer_auth(token.expose_str());
        }
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let result = match builder.send().await {
            Ok(response) => ApiResponse::read(response, timeout).await,
            Err(e) => Err(Error::from_transport(e, timeout)),
        };

        match &result {
            Ok(response) => {
                let status = response.status().as_u16();
                crate::metrics::record_request(route, status, started.elapsed().as_secs_f64());
                debug!(%request_id, status, "response received");
            }
            Err(e) => {
                let error_type = if matches!(e, Error::Timeout(_)) {
                    "timeout"
                } else {
                    "connection"
                };
                crate::metrics::record_transport_error(route, error_type);
                warn!(%request_id, error = %e, "request failed");
            }
        }
        result
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request(path, RequestOptions::get()).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.request(path, RequestOptions::post().json(body)?).await
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.request(path, RequestOptions::put().json(body)?).await
    }

    pub async fn patch<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.request(path, RequestOptions::patch().json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(path, RequestOptions::delete()).await
    }

    /// Send a request and decode a 2xx JSON body.
    ///
    /// A 401 that survives the pipeline becomes `AuthInvalid`; any other
    /// non-2xx becomes `Api`.
    pub async fn json<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        let response = self.request(path, options).await?;
        let status = response.status();
        if status.as_u16() == 401 {
            return Err(Error::AuthInvalid(response.error_message()));
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: response.error_message(),
            });
        }
        response.json()
    }

    /// Sign in and store the session. Returns the profile when the backend
    /// sent one.
    pub async fn login(&self, email: &str, password: &Secret<String>) -> Result<Option<UserSnapshot>> {
        let response = club_auth::login(
            &self.http,
            &self.options.base_url,
            email,
            password.expose_str(),
            self.options.timeout,
        )
        .await?;

        self.store
            .store_session(
                &response.access_token,
                response.refresh_token.as_deref(),
                response.user.as_ref(),
            )
            .await;
        info!(
            user_id = ?response.user.as_ref().map(|u| u.id.to_string()),
            "logged in"
        );
        Ok(response.user)
    }

    /// End the session.
    ///
    /// The server-side revocation is best-effort: its failure is logged and
    /// the local session is cleared regardless.
    pub async fn logout(&self) {
        if let Some(refresh) = self.store.refresh_token().await {
            if let Err(e) = club_auth::logout(
                &self.http,
                &self.options.base_url,
                refresh.expose_str(),
                self.options.timeout,
            )
            .await
            {
                warn!(error = %e, "logout request failed, clearing local session anyway");
            }
        }
        self.store.clear_tokens().await;
        self.events.publish(AuthEvent::LoggedOut);
        info!("logged out");
    }

    pub async fn current_user(&self) -> Option<UserSnapshot> {
        self.store.get_user().await
    }
}
