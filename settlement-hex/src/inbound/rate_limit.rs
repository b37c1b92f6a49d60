//! Per-caller request throttling.
//!
//! Callers are bucketed by a digest of their bearer key, so raw keys never
//! sit in memory here. Requests without a key share one anonymous bucket.
//! Provider callbacks and the health check are never throttled.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter, clock::Clock};
use serde_json::json;

use settlement_repo::security::hash_api_key;

use super::auth::WEBHOOK_PATH;

const UNTHROTTLED: [&str; 2] = ["/health", WEBHOOK_PATH];

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Caller {
    Key(String),
    Anonymous,
}

impl Caller {
    fn of(request: &Request<Body>) -> Self {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| Caller::Key(hash_api_key(key)))
            .unwrap_or(Caller::Anonymous)
    }
}

/// Token buckets keyed by caller.
pub struct Throttle {
    buckets: DefaultKeyedRateLimiter<Caller>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::per_minute(100)
    }
}

impl Throttle {
    /// Allows `requests` per `period`, all of which may be spent at once.
    /// Zero is treated as one.
    pub fn new(requests: u32, period: Duration) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            buckets: RateLimiter::keyed(quota),
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Spends one token. When the bucket is empty, returns the wait until
    /// the next token.
    fn admit(&self, caller: &Caller) -> Result<(), Duration> {
        self.buckets
            .check_key(caller)
            .map_err(|not_until| not_until.wait_time_from(self.buckets.clock().now()))
    }

    /// Drops buckets that have refilled completely.
    pub fn forget_idle(&self) {
        self.buckets.retain_recent();
    }

    pub fn tracked_callers(&self) -> usize {
        self.buckets.len()
    }
}

/// Rejects with 429 and a `Retry-After` once the caller's bucket is empty.
pub async fn throttle_middleware(
    State(throttle): State<Arc<Throttle>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if UNTHROTTLED.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let caller = Caller::of(&request);
    match throttle.admit(&caller) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            let retry_after = wait.as_secs().max(1);
            tracing::warn!(
                anonymous = caller == Caller::Anonymous,
                retry_after,
                "rate limit exceeded"
            );
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded. Please try again later.",
                    "code": "RATE_LIMITED",
                    "retry_after_seconds": retry_after
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}
