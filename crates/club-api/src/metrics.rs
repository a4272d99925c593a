//! Client-side metrics
//!
//! Emitted through the `metrics` facade; the embedding application decides
//! whether to install a recorder. Without one these calls are no-ops.
//!
//! - `club_api_requests_total` (counter): labels `route` (`api`/`external`), `status`
//! - `club_api_request_duration_seconds` (histogram): label `route`
//! - `club_api_transport_errors_total` (counter): labels `route`, `error_type`
//! - `club_api_refresh_total` (counter): label `outcome` (`success`/`failure`)
//! - `club_api_retries_total` (counter): post-refresh replays

/// Record a completed request with its final status.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    ::metrics::counter!("club_api_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    ::metrics::histogram!("club_api_request_duration_seconds", "route" => route)
        .record(duration_secs);
}

/// Record a request that never produced a response.
pub fn record_transport_error(route: &'static str, error_type: &'static str) {
    ::metrics::counter!("club_api_transport_errors_total", "route" => route, "error_type" => error_type)
        .increment(1);
}

/// Record the outcome of one refresh network call.
pub fn record_refresh(outcome: &'static str) {
    ::metrics::counter!("club_api_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request replayed after a successful refresh.
pub fn record_retry() {
    ::metrics::counter!("club_api_retries_total").increment(1);
}
