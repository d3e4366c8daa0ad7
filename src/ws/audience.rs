//! Audience message handlers: identity, voting and reconciliation

use crate::error::EngineError;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

pub async fn handle_register(
    state: &Arc<AppState>,
    display_name: Option<String>,
) -> Option<ServerMessage> {
    match state.register_participant(display_name).await {
        Ok((participant, participant_token)) => Some(ServerMessage::Registered {
            participant: (&participant).into(),
            participant_token,
        }),
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_resume(state: &Arc<AppState>, participant_token: String) -> Option<ServerMessage> {
    match state.resume_participant(&participant_token).await {
        Ok(participant) => {
            tracing::debug!("Participant {} resumed", participant.id);
            Some(ServerMessage::Resumed {
                participant: (&participant).into(),
            })
        }
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_vote(
    state: &Arc<AppState>,
    participant_token: String,
    question_id: String,
    option: String,
    msg_id: Option<String>,
) -> Option<ServerMessage> {
    let participant = match state.resume_participant(&participant_token).await {
        Ok(p) => p,
        Err(e) => return Some(ServerMessage::error(&e)),
    };

    match state
        .submit_vote(&question_id, &participant.id, &option)
        .await
    {
        Ok(_) => Some(ServerMessage::VoteAcknowledged {
            question_id,
            msg_id,
        }),
        Err(e) => {
            match e {
                EngineError::Store(_) => tracing::error!("Vote failed: {}", e),
                _ => tracing::info!("Vote rejected: {}", e),
            }
            Some(ServerMessage::error(&e))
        }
    }
}

pub async fn handle_sync(
    state: &Arc<AppState>,
    role: Role,
    participant_token: Option<String>,
) -> Option<ServerMessage> {
    match state.state_for_token(role, participant_token.as_deref()).await {
        Ok(snapshot) => Some(ServerMessage::State(snapshot)),
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_get_leaderboard(state: &Arc<AppState>) -> Option<ServerMessage> {
    match state.leaderboard().await {
        Ok(entries) => Some(ServerMessage::Leaderboard { entries }),
        Err(e) => Some(ServerMessage::error(&e)),
    }
}
