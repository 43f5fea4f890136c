// src/api/middleware.rs - API-key auth, fixed-window rate limiting and request logging
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use log::{debug, warn};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::api::AppState;
use crate::errors::{ApiError, MatchError};

const ANONYMOUS_CLIENT: &str = "anonymous";

/// Per-client request counter over fixed one-minute windows.
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, (Instant, u32)>,
    last_sweep: Mutex<Instant>,
}

impl FixedWindowLimiter {
    /// A `limit_per_minute` of 0 disables limiting.
    pub fn new(limit_per_minute: u32) -> Self {
        Self::with_window(limit_per_minute, Duration::from_secs(60))
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.limit > 0
    }

    /// Number of clients with a tracked window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Counts one request for `client`, or returns the seconds until the
    /// current window resets. Rejected requests are not counted.
    pub fn check(&self, client: &str) -> Result<(), u64> {
        if !self.enabled() {
            return Ok(());
        }
        let now = Instant::now();
        self.sweep_expired(now);

        let mut slot = self
            .windows
            .entry(client.to_string())
            .or_insert((now, 0));
        let (started, count) = *slot;

        if now.duration_since(started) >= self.window {
            *slot = (now, 1);
            return Ok(());
        }
        if count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(started));
            return Err(remaining.as_secs().max(1));
        }
        slot.1 += 1;
        Ok(())
    }

    /// Drops windows that have ended, at most once per window length.
    /// Must not be called while holding a `windows` entry.
    fn sweep_expired(&self, now: Instant) {
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last) < self.window {
            return;
        }
        *last = now;
        drop(last);

        let before = self.windows.len();
        let window = self.window;
        self.windows
            .retain(|_, (started, _)| now.duration_since(*started) < window);
        let dropped = before.saturating_sub(self.windows.len());
        if dropped > 0 {
            debug!("🚦 Dropped {} expired rate-limit windows", dropped);
        }
    }
}

/// Key from `x-api-key` or `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.trim().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|key| key.trim().to_string())
}

/// Rate-limit identity: the verified API key, else the first
/// `x-forwarded-for` hop when the proxy is trusted, else the peer address.
fn client_id(
    headers: &HeaderMap,
    verified_key: Option<&str>,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if let Some(key) = verified_key {
        return format!("key:{}", key);
    }
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(|ip| format!("ip:{}", ip))
        })
        .flatten();
    forwarded
        .or_else(|| peer.map(|addr| format!("ip:{}", addr.ip())))
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

/// Rejects unauthenticated or over-limit requests before they reach a handler.
pub async fn guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let headers = request.headers();
    let api_key = presented_key(headers);

    if state.config.auth_enabled() {
        let accepted = api_key
            .as_deref()
            .map_or(false, |key| state.config.api_keys.iter().any(|k| k == key));
        if !accepted {
            warn!("🔐 Rejected {} {}: missing or invalid API key", request.method(), request.uri());
            return ApiError::new(MatchError::Unauthorized, Uuid::new_v4().to_string()).into_response();
        }
    }

    let verified_key = api_key.as_deref().filter(|_| state.config.auth_enabled());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_id(headers, verified_key, peer, state.config.trust_forwarded_for);
    if let Err(retry_after_secs) = state.limiter.check(&client) {
        warn!("🚦 Rate limit hit for {}, retry in {}s", client, retry_after_secs);
        return ApiError::new(
            MatchError::RateLimited { retry_after_secs },
            Uuid::new_v4().to_string(),
        )
        .into_response();
    }

    next.run(request).await
}

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start_time = Instant::now();

    let response = next.run(request).await;

    debug!(
        "{} {} - {} - {:?}",
        method,
        uri,
        response.status(),
        start_time.elapsed()
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_limiter_blocks_after_limit_without_counting_rejections() {
        let limiter = FixedWindowLimiter::new(2);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        let retry = limiter.check("a").unwrap_err();
        assert!((1..=60).contains(&retry));
        assert!(limiter.check("a").is_err());
        assert_eq!(limiter.windows.get("a").map(|slot| slot.1), Some(2));

        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn test_limiter_window_resets() {
        let limiter = FixedWindowLimiter::with_window(1, Duration::from_millis(10));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("a").is_ok());
    }

    #[test]
    fn test_limiter_drops_expired_windows() {
        let limiter = FixedWindowLimiter::with_window(5, Duration::from_millis(1));
        for i in 0..10_000 {
            assert!(limiter.check(&format!("client-{}", i)).is_ok());
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("late").is_ok());
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_client_id_ignores_forwarded_for_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let peer: SocketAddr = "192.0.2.10:51234".parse().unwrap();

        assert_eq!(client_id(&headers, None, Some(peer), false), "ip:192.0.2.10");
        assert_eq!(client_id(&headers, None, None, false), ANONYMOUS_CLIENT);
        assert_eq!(client_id(&headers, None, Some(peer), true), "ip:203.0.113.7");
        assert_eq!(client_id(&headers, Some("alpha"), Some(peer), true), "key:alpha");
    }

    #[test]
    fn test_disabled_limiter() {
        let limiter = FixedWindowLimiter::new(0);
        for _ in 0..100 {
            assert!(limiter.check("a").is_ok());
        }
    }

    #[test]
    fn test_presented_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert_eq!(presented_key(&headers).as_deref(), Some("secret"));

        headers.insert("x-api-key", HeaderValue::from_static("other"));
        assert_eq!(presented_key(&headers).as_deref(), Some("other"));
    }
}
