//! HTTP pull endpoints.
//!
//! Reconciliation and review reads for clients that cannot (or not yet)
//! hold a WebSocket. Routes under `/api/host` sit behind Basic auth.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::EngineResult;
use crate::protocol::StateSnapshot;
use crate::state::export::ReviewExport;
use crate::state::score::LeaderboardEntry;
use crate::state::vote::total_votes;
use crate::state::AppState;
use crate::types::{QuestionId, Role, Tally};

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyResponse {
    pub question_id: QuestionId,
    pub tally: Tally,
    pub total_votes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub revision: u64,
}

/// Audience reconciliation snapshot.
///
/// GET /api/state?token=
pub async fn audience_state(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StateQuery>,
) -> EngineResult<Json<StateSnapshot>> {
    let snapshot = state
        .state_for_token(Role::Audience, query.token.as_deref())
        .await?;
    Ok(Json(snapshot))
}

/// GET /api/host/state
pub async fn host_state(State(state): State<Arc<AppState>>) -> EngineResult<Json<StateSnapshot>> {
    Ok(Json(state.current_state(Role::Host, None).await?))
}

/// GET /api/host/questions/{id}/tally
pub async fn question_tally(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<QuestionId>,
) -> EngineResult<Json<TallyResponse>> {
    let tally = state.tally_of(&question_id).await?;
    Ok(Json(TallyResponse {
        question_id,
        total_votes: total_votes(&tally),
        tally,
    }))
}

/// Post-session review download.
///
/// GET /api/host/export
pub async fn export_review(State(state): State<Arc<AppState>>) -> EngineResult<Json<ReviewExport>> {
    Ok(Json(state.export_review().await?))
}

/// GET /api/leaderboard
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
) -> EngineResult<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.leaderboard().await?))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> EngineResult<Json<HealthResponse>> {
    let revision = state.store.revision().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        revision,
    }))
}
