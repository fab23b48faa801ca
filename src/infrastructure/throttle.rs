//! Server-side request throttling
//!
//! Fixed-window counter per client IP: at most `limit` requests per `window`.
//! Independent of the client pipeline's token buckets.

use crate::core::{duration_ms, SharedClock};
use crate::infrastructure::config::ThrottleConfig;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Prune expired windows once this many clients are tracked
const PRUNE_THRESHOLD: usize = 4096;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy)]
struct ThrottleRecord {
    hits: u32,
    /// Epoch millis
    window_start: u64,
}

/// Outcome of one throttled request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the client's window resets
    pub reset_secs: u64,
}

pub struct ThrottleGuard {
    clock: SharedClock,
    limit: u32,
    window_ms: u64,
    records: Mutex<HashMap<String, ThrottleRecord>>,
}

impl ThrottleGuard {
    pub fn new(clock: SharedClock, limit: u32, window: Duration) -> Self {
        Self {
            clock,
            limit,
            window_ms: duration_ms(window).max(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(clock: SharedClock, config: &ThrottleConfig) -> Self {
        Self::new(clock, config.limit, config.window())
    }

    /// Count one request from `client`
    pub fn hit(&self, client: &str) -> ThrottleDecision {
        let now = self.clock.now_ms();
        let mut records = self.records.lock();

        if records.len() >= PRUNE_THRESHOLD {
            let window_ms = self.window_ms;
            records.retain(|_, r| now.saturating_sub(r.window_start) < window_ms);
        }

        let record = records.entry(client.to_string()).or_insert(ThrottleRecord {
            hits: 0,
            window_start: now,
        });
        if now.saturating_sub(record.window_start) >= self.window_ms {
            record.hits = 0;
            record.window_start = now;
        }

        record.hits = record.hits.saturating_add(1);
        let reset_ms = (record.window_start + self.window_ms).saturating_sub(now);

        ThrottleDecision {
            allowed: record.hits <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(record.hits),
            reset_secs: reset_ms.div_ceil(1000),
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.records.lock().len()
    }
}

impl std::fmt::Debug for ThrottleGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleGuard")
            .field("limit", &self.limit)
            .field("window_ms", &self.window_ms)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

/// axum middleware applying a [`ThrottleGuard`] keyed by client IP
pub async fn throttle_requests(
    State(guard): State<Arc<ThrottleGuard>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let decision = guard.hit(&client);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        crate::log_api!(
            tracing::Level::WARN,
            client = %client,
            path = %request.uri().path(),
            "Request throttled"
        );
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "statusCode": 429,
                "message": "ThrottlerException: Too Many Requests",
            })),
        )
            .into_response()
    };

    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_secs));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;

    fn guard(limit: u32) -> (Arc<ManualClock>, ThrottleGuard) {
        let clock = Arc::new(ManualClock::new(0));
        let guard = ThrottleGuard::new(clock.clone(), limit, Duration::from_secs(60));
        (clock, guard)
    }

    #[test]
    fn test_limit_per_window() {
        let (_, guard) = guard(3);
        for expected_remaining in [2, 1, 0] {
            let decision = guard.hit("10.0.0.1");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = guard.hit("10.0.0.1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_secs, 60);
    }

    #[test]
    fn test_window_reset() {
        let (clock, guard) = guard(1);
        assert!(guard.hit("a").allowed);
        assert!(!guard.hit("a").allowed);

        clock.advance(Duration::from_secs(59));
        let decision = guard.hit("a");
        assert!(!decision.allowed);
        assert_eq!(decision.reset_secs, 1);

        clock.advance(Duration::from_secs(1));
        assert!(guard.hit("a").allowed);
    }

    #[test]
    fn test_clients_are_independent() {
        let (_, guard) = guard(1);
        assert!(guard.hit("a").allowed);
        assert!(guard.hit("b").allowed);
        assert!(!guard.hit("a").allowed);
        assert_eq!(guard.tracked_clients(), 2);
    }
}
