//! Host-only command handlers
//!
//! Authorization is checked in the dispatch layer before calling these.
//! Lifecycle commands answer through the broadcast channels, so most
//! handlers only reply directly on error.

use crate::protocol::ServerMessage;
use crate::state::vote::total_votes;
use crate::state::AppState;
use crate::types::{OptionCode, QuestionSpec};
use std::sync::Arc;

pub async fn handle_create_question(
    state: &Arc<AppState>,
    spec: QuestionSpec,
) -> Option<ServerMessage> {
    tracing::info!("Host creating question: {}", spec.title);
    match state.create_question(spec).await {
        Ok(question) => Some(ServerMessage::QuestionCreated { question }),
        Err(e) => {
            tracing::warn!("Question rejected: {}", e);
            Some(ServerMessage::error(&e))
        }
    }
}

pub async fn handle_start_voting(state: &Arc<AppState>, question_id: String) -> Option<ServerMessage> {
    tracing::info!("Host starting voting on {}", question_id);
    match state.start_voting(&question_id).await {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

/// Replies with the final tally even when the question was already closed
pub async fn handle_stop_voting(
    state: &Arc<AppState>,
    question_id: String,
    correct_option: Option<OptionCode>,
) -> Option<ServerMessage> {
    tracing::info!(
        "Host stopping voting on {} (correct: {:?})",
        question_id,
        correct_option
    );
    match state.stop_voting(&question_id, correct_option).await {
        Ok(closure) => Some(ServerMessage::Tally {
            question_id: closure.question.id,
            total_votes: total_votes(&closure.final_tally),
            tally: closure.final_tally,
        }),
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_show_results(
    state: &Arc<AppState>,
    question_id: String,
) -> Option<ServerMessage> {
    tracing::info!("Host showing results for {}", question_id);
    match state.show_results(&question_id).await {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_clear_view(state: &Arc<AppState>) -> Option<ServerMessage> {
    tracing::info!("Host clearing view");
    state
        .clear_view()
        .await
        .err()
        .map(|e| ServerMessage::error(&e))
}

pub async fn handle_reset_session(state: &Arc<AppState>) -> Option<ServerMessage> {
    tracing::info!("Host resetting session");
    state
        .reset_session()
        .await
        .err()
        .map(|e| ServerMessage::error(&e))
}

pub async fn handle_list_questions(state: &Arc<AppState>) -> Option<ServerMessage> {
    match state.list_questions().await {
        Ok(list) => Some(ServerMessage::Questions { list }),
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_get_tally(state: &Arc<AppState>, question_id: String) -> Option<ServerMessage> {
    match state.tally_of(&question_id).await {
        Ok(tally) => Some(ServerMessage::Tally {
            question_id,
            total_votes: total_votes(&tally),
            tally,
        }),
        Err(e) => Some(ServerMessage::error(&e)),
    }
}
