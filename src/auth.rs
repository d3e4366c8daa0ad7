//! HTTP Basic Authentication for the host and presenter surfaces

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::types::Role;
use crate::ws::{parse_role, WsQuery};

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Username for the host surface (None = auth disabled)
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    /// Load auth config from environment variables.
    /// HOST_USERNAME and HOST_PASSWORD must both be set to enable auth.
    pub fn from_env() -> Self {
        let username = std::env::var("HOST_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("HOST_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Host authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "HOST_USERNAME and HOST_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Host authentication DISABLED - anyone can drive the quiz!");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => true,
        }
    }

    /// Whether the request headers carry valid Basic credentials
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        if !self.is_enabled() {
            return true;
        }
        basic_credentials(headers)
            .is_some_and(|(username, password)| self.validate(&username, &password))
    }
}

/// Constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Decode `Authorization: Basic ...` into (username, password)
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized(realm: &str) -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", realm))],
        "Unauthorized",
    )
        .into_response()
}

/// Middleware for HTTP Basic Authentication on host HTTP routes
pub async fn host_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if auth_config.authorize(request.headers()) {
        return next.run(request).await;
    }
    unauthorized("Quiz Host")
}

/// Middleware to require Basic Auth for `/ws?role=host` and `/ws?role=presenter`.
///
/// The role is decoded exactly as the WebSocket handler decodes it, so a
/// percent-encoded role cannot slip past as an audience socket.
/// Audience sockets pass through untouched.
pub async fn privileged_ws_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let role = match Query::<WsQuery>::try_from_uri(request.uri()) {
        Ok(Query(params)) => parse_role(params.role.as_deref()),
        Err(rejection) => return rejection.into_response(),
    };
    if !matches!(role, Role::Host | Role::Presenter) {
        return next.run(request).await;
    }

    if !auth_config.is_enabled() {
        tracing::warn!(
            "Privileged WebSocket requested but host authentication is DISABLED; set HOST_USERNAME and HOST_PASSWORD"
        );
        return next.run(request).await;
    }

    if auth_config.authorize(request.headers()) {
        return next.run(request).await;
    }
    unauthorized("Quiz Host (WebSocket)")
}
