//! Request pipeline layers: bearer authentication, per-client rate limiting,
//! response hardening headers, and access logging.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::api::auth::TokenVerifier;
use crate::api::ApiError;
use crate::error::EngineError;

const RATE_WINDOW: Duration = Duration::from_secs(60);

const HARDENING_HEADERS: [(&str, &str); 4] = [
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("cache-control", "no-store"),
];

#[derive(Debug, Clone)]
pub struct SecurityMiddlewareConfig {
    pub rate_limit_per_minute: u32,
    /// Emit one access log line per request
    pub log_requests: bool,
}

impl Default for SecurityMiddlewareConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 120,
            log_requests: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    opened: Instant,
    used: u32,
}

/// Outcome of counting one request against its client's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl RateDecision {
    fn write_headers(&self, limit: u32, headers: &mut HeaderMap) {
        let reset = self.reset_after.as_secs();
        headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
        if !self.allowed {
            headers.insert("retry-after", HeaderValue::from(reset));
        }
    }
}

/// Fixed one-minute windows keyed by client address
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    per_window: u32,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            windows: DashMap::new(),
            per_window: requests_per_minute,
        }
    }

    pub fn check(&self, client: &str) -> RateDecision {
        let now = Instant::now();
        let mut window = self
            .windows
            .entry(client.to_string())
            .or_insert(RateWindow { opened: now, used: 0 });

        let age = now.duration_since(window.opened);
        if age >= RATE_WINDOW {
            *window = RateWindow { opened: now, used: 0 };
        }
        let reset_after = RATE_WINDOW.saturating_sub(now.duration_since(window.opened));

        let allowed = window.used < self.per_window;
        if allowed {
            window.used += 1;
        }
        RateDecision {
            allowed,
            remaining: self.per_window.saturating_sub(window.used),
            reset_after,
        }
    }

    /// Forget clients idle for more than two windows
    pub fn cleanup(&self) {
        self.windows
            .retain(|_, w| w.opened.elapsed() < RATE_WINDOW * 2);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

#[derive(Clone)]
pub struct SecurityState {
    pub config: SecurityMiddlewareConfig,
    pub rate_limiter: Arc<RateLimiter>,
    pub tokens: TokenVerifier,
}

impl SecurityState {
    pub fn new(config: SecurityMiddlewareConfig, tokens: TokenVerifier) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_per_minute)),
            config,
            tokens,
        }
    }
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn request_client(request: &Request) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    client_key(request.headers(), peer)
}

/// Keep four characters at each end; shorter values are fully masked
pub fn mask_client(value: &str) -> String {
    let len = value.chars().count();
    if len <= 8 {
        return "*".repeat(len);
    }
    let head: String = value.chars().take(4).collect();
    let tail: String = value.chars().skip(len - 4).collect();
    format!("{}...{}", head, tail)
}

/// Resolve the bearer token, if any, into a `Caller` request extension.
///
/// No `Authorization` header means an anonymous request. A header that is
/// present but unusable is a 401, even on public routes.
pub async fn auth_middleware(
    State(state): State<SecurityState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(raw) = request.headers().get("authorization") else {
        return Ok(next.run(request).await);
    };

    let claims = raw
        .to_str()
        .ok()
        .and_then(TokenVerifier::bearer)
        .ok_or(EngineError::Unauthorized)
        .and_then(|token| state.tokens.verify(token))
        .map_err(|e| {
            warn!(path = %request.uri().path(), "Rejected authorization header");
            ApiError(e)
        })?;

    debug!(user_id = %claims.sub, role = %claims.role, "Caller authenticated");
    request.extensions_mut().insert(claims.caller());
    Ok(next.run(request).await)
}

pub async fn rate_limit_middleware(
    State(state): State<SecurityState>,
    request: Request,
    next: Next,
) -> Response {
    let client = request_client(&request);
    let decision = state.rate_limiter.check(&client);
    let limit = state.config.rate_limit_per_minute;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(
            client = %mask_client(&client),
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        StatusCode::TOO_MANY_REQUESTS.into_response()
    };
    decision.write_headers(limit, response.headers_mut());
    response
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in HARDENING_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers.remove("server");
    response
}

struct AccessLine {
    method: String,
    path: String,
    client: String,
    status: StatusCode,
    elapsed: Duration,
}

impl fmt::Display for AccessLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} in {}ms from {}",
            self.method,
            self.path,
            self.status.as_u16(),
            self.elapsed.as_millis(),
            self.client
        )
    }
}

pub async fn logging_middleware(
    State(state): State<SecurityState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.log_requests {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let client = mask_client(&request_client(&request));

    let response = next.run(request).await;
    let line = AccessLine {
        method,
        path,
        client,
        status: response.status(),
        elapsed: started.elapsed(),
    };

    if line.status.is_server_error() {
        error!("{}", line);
    } else if line.status.is_client_error() {
        warn!("{}", line);
    } else {
        info!("{}", line);
    }
    response
}
