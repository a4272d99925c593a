//! Request descriptions and buffered responses
//!
//! A request may be sent twice (original + post-refresh replay), so
//! `RequestOptions` owns everything needed to rebuild it: method, headers,
//! body bytes and timeout. Responses are buffered into `ApiResponse` because
//! the body has to be inspected for the expiry code before deciding whether
//! the caller gets it.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Replayable request description.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Overrides the client's default timeout for this request.
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Serialize `body` as JSON and set the content type.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::InvalidRequest(format!("serializing JSON body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add or replace a header.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidRequest(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidRequest(format!("invalid header value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Where a request goes and whether it gets the auth pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// The application's own API: bearer token, expiry detection, one replay.
    Api(String),
    /// Anything else: sent as-is.
    External(String),
}

/// Resolve a caller-supplied path or URL.
///
/// Relative paths are joined to `base_url` and belong to the API. Absolute
/// URLs belong to the API only when they start with `base_url` + `api_prefix`.
pub(crate) fn resolve(base_url: &str, api_prefix: &str, path: &str) -> Target {
    let base = base_url.trim_end_matches('/');
    if path.starts_with("http://") || path.starts_with("https://") {
        let api_root = format!("{base}{api_prefix}");
        let is_api = path
            .strip_prefix(api_root.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']));
        return if is_api {
            Target::Api(path.to_string())
        } else {
            Target::External(path.to_string())
        };
    }
    if path.starts_with('/') {
        Target::Api(format!("{base}{path}"))
    } else {
        Target::Api(format!("{base}/{path}"))
    }
}

/// Fully read response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: String,
    body: Bytes,
}

impl ApiResponse {
    /// Buffer a reqwest response.
    pub(crate) async fn read(response: reqwest::Response, timeout: Duration) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::from_transport(e, timeout))?;
        Ok(Self {
            status,
            headers,
            url,
            body,
        })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Decode(format!("{} from {}: {e}", self.status, self.url)))
    }

    /// Error message from a `{ "error": ... }` or `{ "message": ... }` body,
    /// falling back to the raw text.
    pub fn error_message(&self) -> String {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            for field in ["error", "message"] {
                if let Some(msg) = value.get(field).and_then(|v| v.as_str()) {
                    return msg.to_string();
                }
            }
        }
        let text = self.text();
        if text.is_empty() {
            self.status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        } else {
            text
        }
    }
}

#[cfg(test)]
impl ApiResponse {
    pub(crate) fn from_parts(status: u16, body: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            url: "http://club.test/api/test".into(),
            body: Bytes::from(body.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://club.test";

    #[test]
    fn relative_paths_are_api() {
        assert_eq!(
            resolve(BASE, "/api", "/api/bookings"),
            Target::Api("https://club.test/api/bookings".into())
        );
        assert_eq!(
            resolve("https://club.test/", "/api", "api/menu"),
            Target::Api("https://club.test/api/menu".into())
        );
    }

    #[test]
    fn absolute_url_under_api_prefix_is_api() {
        assert_eq!(
            resolve(BASE, "/api", "https://club.test/api/tables?free=1"),
            Target::Api("https://club.test/api/tables?free=1".into())
        );
    }

    #[test]
    fn absolute_url_outside_prefix_is_external() {
        assert_eq!(
            resolve(BASE, "/api", "https://maps.example.com/geocode"),
            Target::External("https://maps.example.com/geocode".into())
        );
        assert_eq!(
            resolve(BASE, "/api", "https://club.test/static/logo.png"),
            Target::External("https://club.test/static/logo.png".into())
        );
    }

    #[test]
    fn lookalike_prefix_is_external() {
        assert_eq!(
            resolve(BASE, "/api", "https://club.test/apikeys"),
            Target::External("https://club.test/apikeys".into())
        );
        assert_eq!(
            resolve(BASE, "/api", "https://club.test.evil.com/api/x"),
            Target::External("https://club.test.evil.com/api/x".into())
        );
    }

    #[test]
    fn json_body_sets_content_type() {
        let options = RequestOptions::post()
            .json(&serde_json::json!({"tableId": 4}))
            .unwrap();
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.headers[CONTENT_TYPE], "application/json");
        assert_eq!(options.body.unwrap(), Bytes::from_static(br#"{"tableId":4}"#));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let result = RequestOptions::get().header("bad header", "x");
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn response_error_message_prefers_error_field() {
        let resp = ApiResponse::from_parts(409, r#"{"error":"Table already booked"}"#);
        assert_eq!(resp.error_message(), "Table already booked");

        let resp = ApiResponse::from_parts(500, "");
        assert_eq!(resp.error_message(), "Internal Server Error");
    }

    #[test]
    fn response_json_decode_error_names_status() {
        let resp = ApiResponse::from_parts(200, "not json");
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(err.to_string().contains("200"), "got: {err}");
    }
}
