//! Durable store contract
//!
//! The two shared invariants (one active question, one vote per participant
//! per question) are enforced here as single atomic operations, not by
//! callers holding locks.

mod journal;
mod memory;
pub mod snapshot;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::*;

pub use memory::MemoryStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a store implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Question {0} not found")]
    QuestionNotFound(QuestionId),

    #[error("Question {0} already exists")]
    QuestionExists(QuestionId),

    #[error("Question {0} is not accepting votes")]
    QuestionNotOpen(QuestionId),

    #[error("Participant {participant_id} already voted on question {question_id}")]
    DuplicateVote {
        question_id: QuestionId,
        participant_id: ParticipantId,
    },

    #[error("Participant {0} not found")]
    ParticipantNotFound(ParticipantId),

    #[error("Question {question_id} was already scored against option {recorded}")]
    AlreadyScored {
        question_id: QuestionId,
        recorded: OptionCode,
    },

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Snapshot invalid: {0}")]
    InvalidSnapshot(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result of an exclusive activation
#[derive(Debug, Clone)]
pub struct Activation {
    pub question: Question,
    /// Questions that were active and got closed by this activation
    pub closed: Vec<Question>,
    pub revision: u64,
}

/// Who is asking for a question to close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseGuard {
    /// Administrator stop; closes whatever activation is running
    Manual,
    /// Timer expiry; only closes the activation that was observed
    Expiry { activated_at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// This call moved the question from active to closed
    Closed { question: Question, revision: u64 },
    /// Nothing to close (already closed or a different activation is running)
    Unchanged(Question),
}

/// Points earned by one participant on one closed activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreAward {
    pub participant_id: ParticipantId,
    pub points: u64,
    pub elapsed_ms: u64,
}

/// Persistence contract required by the engine
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_question(&self, question: Question) -> StoreResult<()>;

    async fn question(&self, id: &str) -> StoreResult<Option<Question>>;

    /// All questions in creation order
    async fn questions(&self) -> StoreResult<Vec<Question>>;

    async fn active_questions(&self) -> StoreResult<Vec<Question>>;

    /// Close every other active question, activate `id`, drop its prior votes.
    async fn activate_exclusive(
        &self,
        id: &str,
        activated_at: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Activation>;

    /// Compare-and-set closure. `correct_option` (when given) is stamped even
    /// if the question was already closed, unless that activation has been
    /// scored against a different option.
    async fn close_question(
        &self,
        id: &str,
        guard: CloseGuard,
        correct_option: Option<OptionCode>,
    ) -> StoreResult<CloseOutcome>;

    /// Close every active question, returning the ones that changed
    async fn close_all_active(&self) -> StoreResult<(Vec<Question>, u64)>;

    async fn set_results_visible(&self, id: &str) -> StoreResult<Question>;

    /// Insert if the question is open at `vote.submitted_at` and the
    /// participant has not voted on it yet. Both checks and the insert are
    /// one atomic step.
    async fn insert_vote(&self, vote: Vote) -> StoreResult<()>;

    async fn votes_for(&self, question_id: &str) -> StoreResult<Vec<Vote>>;

    async fn vote_of(&self, question_id: &str, participant_id: &str)
        -> StoreResult<Option<Vote>>;

    async fn insert_participant(&self, participant: Participant) -> StoreResult<()>;

    async fn participant(&self, id: &str) -> StoreResult<Option<Participant>>;

    async fn participant_by_token_hash(&self, token_hash: &str)
        -> StoreResult<Option<Participant>>;

    async fn participants(&self) -> StoreResult<Vec<Participant>>;

    /// Apply awards for the activation of `question_id` that started at
    /// `activated_at`, once. Returns false if it was already scored.
    async fn apply_scores(
        &self,
        question_id: &str,
        activated_at: DateTime<Utc>,
        scored_at: DateTime<Utc>,
        awards: Vec<ScoreAward>,
    ) -> StoreResult<bool>;

    /// Close active questions, drop all votes and participants
    async fn clear_session(&self) -> StoreResult<u64>;

    /// Monotonic counter bumped on every lifecycle change
    async fn revision(&self) -> StoreResult<u64>;
}
