//! API Middleware (Auth, Rate Limiting, Logging)

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use super::handlers::AppState;
use crate::models::{AppError, RateLimitConfig};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Result of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_secs: u64,
}

/// In-memory fixed-window rate limiter, keyed by API key or client IP
pub struct RateLimiter {
    requests: DashMap<String, (u32, Instant)>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            requests: DashMap::new(),
            config,
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut entry = self.requests.entry(key.to_string()).or_insert((0, now));

        if now.duration_since(entry.1) >= self.config.window_duration {
            entry.0 = 0;
            entry.1 = now;
        }

        let reset_secs = self
            .config
            .window_duration
            .saturating_sub(now.duration_since(entry.1))
            .as_secs();

        if entry.0 >= self.config.requests_per_window {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_secs,
            };
        }

        entry.0 += 1;
        RateDecision {
            allowed: true,
            remaining: self.config.requests_per_window - entry.0,
            reset_secs,
        }
    }

    /// Drop entries idle for two windows
    pub fn cleanup(&self) {
        let now = Instant::now();
        let ttl = self.config.window_duration * 2;
        self.requests
            .retain(|_, (_, started)| now.duration_since(*started) < ttl);
    }

    pub fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Periodically evict stale rate-limit entries
pub fn start_cleanup_task(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    let period = limiter.config.window_duration.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    })
}

fn is_health_path(path: &str) -> bool {
    path == "/health" || path == "/v1/health"
}

fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// Configured API key if one was sent, else the client IP from proxy headers.
/// Unknown keys share the caller's IP bucket.
fn rate_key(headers: &HeaderMap, known_keys: &[String]) -> String {
    let known = api_key(headers).filter(|k| known_keys.iter().any(|known| known.as_str() == *k));
    if let Some(key) = known {
        return format!("key:{}", key);
    }
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .unwrap_or("unknown");
    format!("ip:{}", ip)
}

/// API key authentication, only enforced when keys are configured
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.auth_enabled() || is_health_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    match api_key(request.headers()) {
        Some(key) if state.config.api_keys.iter().any(|k| k == key) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            warn!("Invalid API key attempted");
            Err(AppError::unauthorized())
        }
        None => Err(AppError::unauthorized()),
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if is_health_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let key = rate_key(request.headers(), &state.config.api_keys);
    let decision = state.rate_limiter.check(&key);
    if !decision.allowed {
        warn!(key = %key, "Rate limit exceeded");
        return Err(AppError::rate_limited(decision.reset_secs));
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-remaining", decision.remaining.into());
    headers.insert("x-ratelimit-reset", decision.reset_secs.into());
    Ok(response)
}

/// Give bodyless 404/405/408 responses from routing and timeouts the
/// standard JSON error body
pub async fn error_body_middleware(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.headers().contains_key(header::CONTENT_TYPE) {
        return response;
    }

    let error = match response.status() {
        StatusCode::NOT_FOUND => AppError::not_found("Not Found"),
        StatusCode::METHOD_NOT_ALLOWED => AppError::method_not_allowed(),
        StatusCode::REQUEST_TIMEOUT => AppError::timeout(),
        _ => return response,
    };

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut mapped = error.into_response();
    if let Some(allow) = allow {
        mapped.headers_mut().insert(header::ALLOW, allow);
    }
    mapped
}

/// Request logging middleware, propagates or assigns `x-request-id`
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let request_id = match request.headers().get(REQUEST_ID_HEADER) {
        Some(id) => id.clone(),
        None => {
            let id = HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
            request.headers_mut().insert(REQUEST_ID_HEADER, id.clone());
            id
        }
    };

    let mut response = next.run(request).await;

    info!(
        request_id = request_id.to_str().unwrap_or("-"),
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    response
}
