//! In-process mock of the club backend for pipeline tests.
//!
//! Protected routes accept only the access token `A2`, which is what the
//! refresh endpoint hands out for refresh token `R1`. A client holding `A1`
//! therefore sees the expiry signal first and succeeds after one refresh.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use club_auth::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};
use tokio::net::TcpListener;

pub const FRESH_ACCESS: &str = "A2";

#[derive(Default)]
struct BackendState {
    refresh_calls: AtomicUsize,
    refresh_delay_ms: AtomicUsize,
    reject_refresh: AtomicBool,
    fail_logout: AtomicBool,
    rotated_refresh: Mutex<Option<String>>,
    logout_tokens: Mutex<Vec<String>>,
    hits: Mutex<HashMap<String, usize>>,
    seen_auth: Mutex<Vec<Option<String>>>,
}

impl BackendState {
    fn hit(&self, path: &str, headers: &HeaderMap) {
        *self.hits.lock().unwrap().entry(path.to_string()).or_default() += 1;
        self.seen_auth.lock().unwrap().push(
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
    }
}

pub struct MockBackend {
    pub url: String,
    state: Arc<BackendState>,
    _server: tokio::task::JoinHandle<()>,
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn expired() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Token expired", "code": "TOKEN_EXPIRED"})),
    )
        .into_response()
}

async fn refresh(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.refresh_delay_ms.load(Ordering::SeqCst) as u64;
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if state.reject_refresh.load(Ordering::SeqCst) || body["refreshToken"] != "R1" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "invalid_grant"})),
        )
            .into_response();
    }
    let mut response = serde_json::json!({
        "accessToken": FRESH_ACCESS,
        "user": {"id": 1, "email": "staff@club.test", "role": "staff"},
    });
    if let Some(rotated) = state.rotated_refresh.lock().unwrap().clone() {
        response["refreshToken"] = serde_json::Value::String(rotated);
    }
    Json(response).into_response()
}

async fn login(Json(body): Json<serde_json::Value>) -> Response {
    if body["email"] == "staff@club.test" && body["password"] == "pw" {
        Json(serde_json::json!({
            "accessToken": "A1",
            "refreshToken": "R1",
            "user": {"id": 1, "email": "staff@club.test", "role": "staff"},
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid credentials"})),
        )
            .into_response()
    }
}

async fn logout(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    if let Some(token) = body["refreshToken"].as_str() {
        state.logout_tokens.lock().unwrap().push(token.to_string());
    }
    if state.fail_logout.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}

/// `/api/bookings`: the expiry signal unless the caller holds `A2`.
async fn bookings(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.hit("/api/bookings", &headers);
    match bearer(&headers) {
        Some(FRESH_ACCESS) => {
            Json(serde_json::json!({"bookings": [{"table": 4, "game": "snooker"}]}))
                .into_response()
        }
        Some(_) => expired(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "No token provided"})),
        )
            .into_response(),
    }
}

/// `/api/lagging`: like `/api/bookings`, but a stale token's expiry response
/// is held back for 300ms.
async fn lagging(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.hit("/api/lagging", &headers);
    if bearer(&headers) == Some(FRESH_ACCESS) {
        return Json(serde_json::json!({"bookings": []})).into_response();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    expired()
}

/// `/api/stale`: the expiry signal no matter what token is sent.
async fn stale(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.hit("/api/stale", &headers);
    expired()
}

/// `/api/denied`: 401 without the expiry code.
async fn denied(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.hit("/api/denied", &headers);
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Invalid credentials"})),
    )
        .into_response()
}

/// `/api/conflict`: a business-rule failure.
async fn conflict(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.hit("/api/conflict", &headers);
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({"error": "Table already booked"})),
    )
        .into_response()
}

async fn slow(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> StatusCode {
    state.hit("/api/slow", &headers);
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK
}

/// Echo method, path, headers and body. Mounted under `/api/echo` and `/ext/echo`.
async fn echo(State(state): State<Arc<BackendState>>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    state.hit(&path, request.headers());
    let headers: serde_json::Map<String, serde_json::Value> = request
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                serde_json::Value::String(value.to_str().unwrap_or("").to_string()),
            )
        })
        .collect();
    let method = request.method().to_string();
    let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap();
    Json(serde_json::json!({
        "method": method,
        "path": path,
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
    .into_response()
}

impl MockBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(BackendState::default());

        let app = axum::Router::new()
            .route(LOGIN_PATH, post(login))
            .route(REFRESH_PATH, post(refresh))
            .route(LOGOUT_PATH, post(logout))
            .route("/api/bookings", get(bookings))
            .route("/api/lagging", get(lagging))
            .route("/api/stale", any(stale))
            .route("/api/denied", get(denied))
            .route("/api/conflict", post(conflict))
            .route("/api/slow", get(slow))
            .route("/api/echo", any(echo))
            .route("/ext/echo", any(echo))
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url,
            state,
            _server: server,
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state
            .refresh_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn reject_refresh(&self) {
        self.state.reject_refresh.store(true, Ordering::SeqCst);
    }

    pub fn rotate_refresh_token(&self, token: &str) {
        *self.state.rotated_refresh.lock().unwrap() = Some(token.to_string());
    }

    pub fn fail_logout(&self) {
        self.state.fail_logout.store(true, Ordering::SeqCst);
    }

    pub fn logout_tokens(&self) -> Vec<String> {
        self.state.logout_tokens.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Authorization header of every protected/echo request, in arrival order.
    pub fn seen_auth(&self) -> Vec<Option<String>> {
        self.state.seen_auth.lock().unwrap().clone()
    }
}
