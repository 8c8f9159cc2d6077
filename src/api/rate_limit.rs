//! Rate limiting middleware for the API
//!
//! Per-IP token buckets on the configured path prefixes, with support for
//! exempt IPs.

use axum::{
    Json,
    extract::{ConnectInfo, Request},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Instant,
};
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;

/// Simple token bucket rate limiter
struct TokenBucket {
    /// Available tokens
    tokens: f64,
    /// Last refill time
    last_refill: Instant,
    /// Tokens per second
    rate: f64,
    /// Maximum burst size
    capacity: u32,
}

impl TokenBucket {
    fn new(rate: f64, capacity: u32) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: Instant::now(),
            rate,
            capacity,
        }
    }

    fn try_consume(&mut self) -> Option<u64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let wait_secs = ((1.0 - self.tokens) / self.rate).ceil() as u64;
            Some(wait_secs.max(1))
        }
    }
}

/// Rate limiter with per-IP tracking
pub struct RateLimiter {
    /// Per-IP token buckets
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    /// Configuration
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter from configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Tokens refilled per second: `max_requests` spread over the window
    fn refill_rate(&self) -> f64 {
        let window = self.config.window.as_secs_f64().max(1.0);
        self.config.max_requests as f64 / window
    }

    /// Check if a path falls under one of the limited prefixes
    fn is_path_limited(&self, path: &str) -> bool {
        self.config
            .limited_paths
            .iter()
            .any(|prefix| path == prefix || path.starts_with(prefix.as_str()))
    }

    /// Check if an IP address is exempt from rate limiting
    fn is_ip_exempt(&self, addr: &SocketAddr) -> bool {
        self.config.exempt_ips.contains(&addr.ip())
    }

    /// Check if request should be rate limited
    ///
    /// Returns the number of seconds to wait when the request is rejected.
    pub async fn check(&self, path: &str, addr: SocketAddr) -> Option<u64> {
        if !self.is_path_limited(path) || self.is_ip_exempt(&addr) {
            return None;
        }

        let rate = self.refill_rate();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(addr.ip())
            .or_insert_with(|| TokenBucket::new(rate, self.config.burst_size));
        bucket.try_consume()
    }
}

/// Rate limiting middleware function
pub async fn rate_limit_middleware(
    axum::extract::State(limiter): axum::extract::State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: axum::middleware::Next,
) -> Response {
    match limiter.check(req.uri().path(), addr).await {
        None => next.run(req).await,
        Some(retry_after) => {
            tracing::debug!(client = %addr.ip(), retry_after, "request rate limited");
            let error = json!({
                "error": {
                    "code": "rate_limited",
                    "message": "Too many requests, please try again later",
                    "details": {
                        "retry_after_seconds": retry_after
                    }
                }
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}
