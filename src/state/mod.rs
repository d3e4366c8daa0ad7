pub mod export;
mod participant;
mod question;
pub mod score;
mod snapshot;
pub mod vote;

pub use question::Closure;

use crate::config::EngineConfig;
use crate::protocol::ServerMessage;
use crate::store::{MemoryStore, Store};
use crate::timer::{Clock, SystemClock};
use crate::types::*;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: EngineConfig,
    pub clock: Arc<dyn Clock>,
    /// Lifecycle events for every connected client
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Live tally stream for host and presenter clients
    pub presenter_broadcast: broadcast::Sender<ServerMessage>,
    /// Question currently on screen (active, or closed until the view is cleared)
    on_screen: RwLock<Option<QuestionId>>,
    /// Serialises lifecycle transitions so pushes leave in commit order
    lifecycle_lock: Mutex<()>,
    /// Last tally `seq` handed out; held while the tally it numbers is read
    tally_seq: Mutex<u64>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), EngineConfig::default())
    }

    pub fn with_store(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn Store>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        let (presenter_tx, _rx) = broadcast::channel(256);
        Self {
            store,
            config,
            clock,
            broadcast: tx,
            presenter_broadcast: presenter_tx,
            on_screen: RwLock::new(None),
            lifecycle_lock: Mutex::new(()),
            tally_seq: Mutex::new(0),
        }
    }

    /// Restore the on-screen question after a restart: the active question, if any
    pub async fn recover(&self) -> crate::error::EngineResult<()> {
        let active = self.store.active_questions().await?;
        if let Some(q) = active.first() {
            tracing::info!("Recovered active question {}", q.id);
            *self.on_screen.write().await = Some(q.id.clone());
        }
        Ok(())
    }

    /// Broadcast a message to all connected clients
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        // No receivers connected is fine
        let _ = self.broadcast.send(msg);
    }

    /// Broadcast a message to host and presenter clients only
    pub fn broadcast_to_presenters(&self, msg: ServerMessage) {
        let _ = self.presenter_broadcast.send(msg);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_without_receivers() {
        let state = AppState::new();
        // Must not panic or error with nobody listening
        state.broadcast_to_all(ServerMessage::ViewCleared);
        state.broadcast_to_presenters(ServerMessage::ViewCleared);
    }

    #[tokio::test]
    async fn test_presenter_stream_is_separate() {
        let state = AppState::new();
        let mut all_rx = state.broadcast.subscribe();
        let mut presenter_rx = state.presenter_broadcast.subscribe();

        state.broadcast_to_presenters(ServerMessage::SessionReset);

        assert!(matches!(
            presenter_rx.try_recv(),
            Ok(ServerMessage::SessionReset)
        ));
        assert!(all_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_recover_restores_on_screen_question() {
        let state = AppState::new();
        let q = state
            .create_question(test_support::spec(&["Yes", "No"], None))
            .await
            .unwrap();
        state.start_voting(&q.id).await.unwrap();

        let restarted = AppState::with_store(state.store.clone(), EngineConfig::default());
        restarted.recover().await.unwrap();
        let snapshot = restarted
            .current_state(Role::Audience, None)
            .await
            .unwrap();
        assert_eq!(snapshot.question.unwrap().id, q.id);
    }
}
