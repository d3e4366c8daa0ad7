//! Anti-abuse middleware for the WebSocket endpoint
//!
//! Keeps scripted clients from flooding a live room:
//! - Blocks curl/wget-style user agents
//! - Requires browser WebSocket headers
//! - Rate limits connection attempts per participant token

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Browsers always send this for WS upgrades
const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";

/// Fixed-window counter keyed by participant token
#[derive(Debug, Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(30, Duration::from_secs(10))
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Returns true if allowed, false if rate limited
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Drop entries whose window ended long ago
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[derive(Debug, Clone)]
pub struct AbuseConfig {
    pub block_user_agents: bool,
    /// Require Origin and Sec-WebSocket-Key on upgrades
    pub require_browser_headers: bool,
    /// None = disabled
    pub rate_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            block_user_agents: true,
            require_browser_headers: true,
            rate_limiter: Some(RateLimiter::default()),
        }
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(true)
}

impl AbuseConfig {
    /// Disable every check (tests, trusted networks)
    pub fn permissive() -> Self {
        Self {
            block_user_agents: false,
            require_browser_headers: false,
            rate_limiter: None,
        }
    }

    pub fn from_env() -> Self {
        let block_user_agents = env_flag("ABUSE_BLOCK_USER_AGENTS");
        let require_browser_headers = env_flag("ABUSE_REQUIRE_BROWSER");
        let rate_limit_enabled = env_flag("ABUSE_RATE_LIMIT");

        let rate_limiter = rate_limit_enabled.then(|| {
            let max_requests = std::env::var("ABUSE_RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            let window_secs = std::env::var("ABUSE_RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10);
            RateLimiter::new(max_requests, Duration::from_secs(window_secs))
        });

        tracing::info!(
            block_user_agents,
            require_browser_headers,
            rate_limit_enabled,
            "Anti-abuse config loaded"
        );

        Self {
            block_user_agents,
            require_browser_headers,
            rate_limiter,
        }
    }
}

/// Periodically prune the rate limiter so departed participants don't pile up
pub fn spawn_rate_limit_cleanup(config: Arc<AbuseConfig>) {
    let Some(limiter) = config.rate_limiter.clone() else {
        return;
    };
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.window.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });
}

fn is_blocked_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    const CLI_TOOLS: &[&str] = &[
        "curl",
        "wget",
        "httpie",
        "python-requests",
        "python-urllib",
        "libwww-perl",
        "go-http-client",
        "java/",
    ];
    if CLI_TOOLS.iter().any(|tool| ua.contains(tool)) {
        return true;
    }

    // "bot" as a word, not a substring
    ua.ends_with("bot")
        || ua.contains("bot/")
        || ua.contains("bot ")
        || ua.contains("spider")
        || ua.contains("crawler")
}

/// Participant token from the query string. Anonymous upgrades are not
/// limited: a venue shares a handful of public IPs.
fn rate_limit_key(request: &Request<Body>) -> Option<String> {
    let query = request.uri().query()?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .map(|token| format!("token:{}", token))
}

fn is_browser_websocket(request: &Request<Body>) -> bool {
    request.headers().contains_key(SEC_WEBSOCKET_KEY)
        && request.headers().contains_key(header::ORIGIN)
}

fn forbidden() -> Response<Body> {
    (StatusCode::FORBIDDEN, "Access denied").into_response()
}

fn rate_limited() -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "10")],
        "Rate limit exceeded. Please slow down.",
    )
        .into_response()
}

pub async fn ws_abuse_middleware(
    State(config): State<Arc<AbuseConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if config.block_user_agents {
        match request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|ua| ua.to_str().ok())
        {
            Some(ua) if is_blocked_user_agent(ua) => {
                tracing::warn!(user_agent = ua, "Blocked suspicious user agent");
                return forbidden();
            }
            Some(_) => {}
            None => {
                tracing::warn!("Blocked request with no User-Agent");
                return forbidden();
            }
        }
    }

    if config.require_browser_headers && !is_browser_websocket(&request) {
        tracing::warn!(
            uri = %request.uri(),
            has_origin = request.headers().contains_key(header::ORIGIN),
            has_ws_key = request.headers().contains_key(SEC_WEBSOCKET_KEY),
            "Blocked non-browser WebSocket request"
        );
        return forbidden();
    }

    if let Some(ref limiter) = config.rate_limiter {
        if let Some(key) = rate_limit_key(&request) {
            if !limiter.check(&key).await {
                tracing::warn!(key, "Rate limited");
                return rate_limited();
            }
        }
    }

    next.run(request).await
}
