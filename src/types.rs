use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque ID types for type safety
pub type QuestionId = String;
pub type ParticipantId = String;
pub type OptionCode = String;

/// Vote counts per option code. Every configured option is present, zero or not.
pub type Tally = BTreeMap<OptionCode, u32>;

/// Option codes handed out when a question spec omits them
pub const DEFAULT_OPTION_CODES: &str = "abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Draft,
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub code: OptionCode,
    pub text: String,
}

/// Input for creating a question
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub options: Vec<OptionSpec>,
    #[serde(default)]
    pub correct_option: Option<OptionCode>,
    #[serde(default)]
    pub explanation: Option<String>,
    /// `None` means the question runs until stopped by hand
    #[serde(default)]
    pub timer_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    #[serde(default)]
    pub code: Option<OptionCode>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub title: String,
    pub body: Option<String>,
    pub options: Vec<QuestionOption>,
    pub correct_option: Option<OptionCode>,
    pub explanation: Option<String>,
    pub timer_seconds: Option<u32>,
    pub is_active: bool,
    pub voting_closed: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Audience may see the tally of the current activation before it closes
    #[serde(default)]
    pub results_visible: bool,
    /// Set once scores for the current activation have been applied
    #[serde(default)]
    pub scored_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn lifecycle(&self) -> LifecycleState {
        if self.is_active {
            LifecycleState::Active
        } else if self.voting_closed {
            LifecycleState::Closed
        } else {
            LifecycleState::Draft
        }
    }

    pub fn has_option(&self, code: &str) -> bool {
        self.options.iter().any(|o| o.code == code)
    }

    /// Whether a vote stamped at `at` may still be accepted
    pub fn accepts_votes_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active && !self.voting_closed && self.end_time.is_none_or(|end| at < end)
    }

    /// Zero-filled tally for every configured option
    pub fn empty_tally(&self) -> Tally {
        self.options.iter().map(|o| (o.code.clone(), 0)).collect()
    }

    /// Copy safe to show the audience: the answer stays hidden until closed
    pub fn audience_view(&self) -> Question {
        let mut q = self.clone();
        if q.lifecycle() != LifecycleState::Closed {
            q.correct_option = None;
            q.explanation = None;
        }
        q
    }
}

/// One vote per (question, participant). Never mutated once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub question_id: QuestionId,
    pub participant_id: ParticipantId,
    pub option: OptionCode,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    /// SHA-256 hex digest of the bearer token held by the client
    pub token_hash: String,
    pub display_name: String,
    pub score: u64,
    pub correct_count: u32,
    /// Sum of answer times for correct answers, used as ranking tie-break
    pub total_time_ms: u64,
    pub registered_at: DateTime<Utc>,
}

/// Client-facing participant info (never carries the token hash)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub display_name: String,
    pub score: u64,
    pub correct_count: u32,
    pub total_time_ms: u64,
}

impl From<&Participant> for ParticipantInfo {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.clone(),
            display_name: p.display_name.clone(),
            score: p.score,
            correct_count: p.correct_count,
            total_time_ms: p.total_time_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator driving the session
    Host,
    /// Projector screen showing live tallies
    Presenter,
    Audience,
}

impl Role {
    /// Roles subscribed to the live tally stream
    pub fn sees_live_tally(&self) -> bool {
        matches!(self, Role::Host | Role::Presenter)
    }
}
