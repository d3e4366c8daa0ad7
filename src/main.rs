use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizroom::{
    abuse, auth, broadcast,
    config::EngineConfig,
    state::AppState,
    store::{MemoryStore, Store},
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizroom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting quizroom...");

    let config = EngineConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());
    let abuse_config = Arc::new(abuse::AbuseConfig::from_env());

    let store: Arc<dyn Store> = match config.snapshot_path {
        Some(ref path) => match MemoryStore::open(path).await {
            Ok(store) => {
                tracing::info!("Store restored from {}", path.display());
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!("Failed to open snapshot {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState::with_store(store, config));
    if let Err(e) = state.recover().await {
        tracing::error!("Failed to recover on-screen question: {}", e);
    }

    // Expires timed questions and pushes countdown resyncs
    broadcast::spawn_timer_watcher(state.clone());
    abuse::spawn_rate_limit_cleanup(abuse_config.clone());

    let app = quizroom::app(state, auth_config, abuse_config);

    tracing::info!("Listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
