// Public API for the binary and integration tests

pub mod abuse;
pub mod api;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod protocol;
pub mod state;
pub mod store;
pub mod timer;
pub mod types;
pub mod ws;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Assemble the HTTP and WebSocket router
pub fn app(
    state: Arc<state::AppState>,
    auth_config: Arc<auth::AuthConfig>,
    abuse_config: Arc<abuse::AbuseConfig>,
) -> Router {
    let host_routes = Router::new()
        .route("/api/host/state", get(api::host_state))
        .route("/api/host/questions/{id}/tally", get(api::question_tally))
        .route("/api/host/export", get(api::export_review))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::host_auth_middleware,
        ));

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config,
            auth::privileged_ws_auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            abuse_config,
            abuse::ws_abuse_middleware,
        ));

    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/api/state", get(api::audience_state))
        .route("/api/leaderboard", get(api::leaderboard))
        .route("/health", get(api::health))
        .merge(host_routes)
        .merge(ws_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
