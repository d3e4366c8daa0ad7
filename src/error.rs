use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by engine operations. Never retried at this layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Question {0} is not accepting votes")]
    NotActive(String),

    #[error("Already voted on question {0}")]
    DuplicateVote(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Invalid question config: {0}")]
    InvalidConfig(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    pub fn question_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Question",
            id: id.into(),
        }
    }

    pub fn participant_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Participant",
            id: id.into(),
        }
    }

    /// Stable wire code for `ServerMessage::Error`
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::NotActive(_) => "NOT_ACTIVE",
            EngineError::DuplicateVote(_) => "DUPLICATE_VOTE",
            EngineError::InvalidOption(_) => "INVALID_OPTION",
            EngineError::InvalidConfig(_) => "INVALID_CONFIG",
            EngineError::Unauthorized(_) => "UNAUTHORIZED",
            EngineError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::NotActive(_) | EngineError::DuplicateVote(_) => StatusCode::CONFLICT,
            EngineError::InvalidOption(_) | EngineError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::QuestionNotFound(id) => EngineError::question_not_found(id),
            StoreError::ParticipantNotFound(id) => EngineError::participant_not_found(id),
            StoreError::QuestionNotOpen(id) => EngineError::NotActive(id),
            StoreError::DuplicateVote { question_id, .. } => EngineError::DuplicateVote(question_id),
            e @ StoreError::AlreadyScored { .. } => EngineError::InvalidConfig(e.to_string()),
            other => EngineError::Store(other),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        if let EngineError::Store(ref e) = self {
            tracing::error!("Store failure: {}", e);
        }
        let body = Json(json!({
            "code": self.code(),
            "msg": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
