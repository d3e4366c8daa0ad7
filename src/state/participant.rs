use super::AppState;
use crate::error::{EngineError, EngineResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use rand::Rng;
use sha2::{Digest, Sha256};

/// URL-safe alphabet for bearer tokens
const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LENGTH: usize = 32;
const MAX_DISPLAY_NAME_CHARS: usize = 40;

fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_CHARS[rng.random_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

/// Only the digest is stored; the token itself lives on the client
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn display_name_or_generated(name: Option<String>) -> String {
    let trimmed: String = name
        .as_deref()
        .unwrap_or("")
        .trim()
        .chars()
        .take(MAX_DISPLAY_NAME_CHARS)
        .collect();
    if !trimmed.is_empty() {
        return trimmed;
    }
    petname::petname(2, "-").unwrap_or_else(|| "anonymous".to_string())
}

impl AppState {
    /// Register a new participant. Returns the record and the bearer token,
    /// which is never stored in clear.
    pub async fn register_participant(
        &self,
        display_name: Option<String>,
    ) -> EngineResult<(Participant, String)> {
        let token = generate_token();
        let participant = Participant {
            id: ulid::Ulid::new().to_string(),
            token_hash: hash_token(&token),
            display_name: display_name_or_generated(display_name),
            score: 0,
            correct_count: 0,
            total_time_ms: 0,
            registered_at: self.clock.now(),
        };

        self.store.insert_participant(participant.clone()).await?;
        tracing::info!(
            "Registered participant {} ({})",
            participant.id,
            participant.display_name
        );
        Ok((participant, token))
    }

    pub async fn participant_by_token(&self, token: &str) -> EngineResult<Option<Participant>> {
        Ok(self
            .store
            .participant_by_token_hash(&hash_token(token))
            .await?)
    }

    /// Re-bind a reconnecting client to its identity
    pub async fn resume_participant(&self, token: &str) -> EngineResult<Participant> {
        self.participant_by_token(token)
            .await?
            .ok_or_else(|| EngineError::participant_not_found("for token"))
    }

    /// Close any active question and drop every vote and participant.
    /// Question definitions survive.
    pub async fn reset_session(&self) -> EngineResult<()> {
        let _lifecycle = self.lifecycle_lock.lock().await;

        let revision = self.store.clear_session().await?;
        *self.on_screen.write().await = None;

        tracing::warn!("Session reset (revision {})", revision);
        self.broadcast_to_all(ServerMessage::SessionReset);
        Ok(())
    }
}
