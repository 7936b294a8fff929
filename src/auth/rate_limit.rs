use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::extractors::client_ip;
use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Fixed-window attempt counter keyed by client address.
///
/// Independent of account lockout: this throttles a client, lockout
/// protects an account.
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            window: Duration::from_secs(cfg.window_secs),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one attempt. `Err` holds the seconds until the window resets.
    pub fn hit(&self, key: &str, now: Instant) -> Result<(), u64> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        // stale windows are dropped as they are encountered
        windows.retain(|_, (start, _)| now.duration_since(*start) < self.window);

        let (start, count) = windows.entry(key.to_string()).or_insert((now, 0));
        if *count >= self.max_attempts {
            let left = self.window.saturating_sub(now.duration_since(*start));
            return Err(left.as_secs().max(1));
        }
        *count += 1;
        Ok(())
    }
}

pub async fn limit_auth_attempts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_ip(
        request.headers(),
        request.extensions(),
        state.config.trusted_proxy_hops,
    )
    .map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
    if let Err(retry_after_secs) = state.limiter.hit(&key, Instant::now()) {
        warn!(client = %key, retry_after_secs, "auth rate limit exceeded");
        return Err(ApiError::TooManyRequests { retry_after_secs });
    }
    Ok(next.run(request).await)
}
