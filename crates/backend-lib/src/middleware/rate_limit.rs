// ============================
// crates/backend-lib/src/middleware/rate_limit.rs
// ============================
//! Fixed-window request throttling per client address.
use crate::config::RateLimitSettings;
use crate::error::AppError;
use crate::metrics::REQUEST_THROTTLED;
use crate::models::ClientMeta;
use crate::storage::Storage;
use crate::time::TimeProvider;
use crate::AppState;
use axum::{extract::State, http::Request, middleware::Next, response::Response};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use tracing::warn;

/// Rate limit entry for a client
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    requests: u32,
    window_start: DateTime<Utc>,
}

/// Counts requests per key inside a fixed window
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    window: Duration,
    max_requests: u32,
    clock: TimeProvider,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings, clock: TimeProvider) -> Self {
        Self {
            entries: DashMap::new(),
            window: settings.window(),
            max_requests: settings.max_requests,
            clock,
        }
    }

    /// Count a request. False once the key is over its budget for the window.
    pub fn check(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                requests: 0,
                window_start: now,
            });

        if now - entry.window_start >= self.window {
            entry.requests = 0;
            entry.window_start = now;
        }
        if entry.requests >= self.max_requests {
            return false;
        }
        entry.requests += 1;
        true
    }

    /// Forget windows that have run out
    pub fn purge(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.window_start < self.window);
        before.saturating_sub(self.entries.len())
    }
}

/// Rate limiter middleware
pub async fn rate_limit<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    meta: ClientMeta,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let client = meta.ip_address.as_deref().unwrap_or("unknown");
    if !state.rate_limiter.check(client) {
        counter!(REQUEST_THROTTLED).increment(1);
        warn!(client, path = %request.uri().path(), "request throttled");
        return Err(AppError::RateLimitExceeded);
    }
    Ok(next.run(request).await)
}
