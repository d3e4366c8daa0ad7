use crate::state::score::LeaderboardEntry;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Register a new audience identity
    Register {
        #[serde(default)]
        display_name: Option<String>,
    },
    /// Re-bind a reconnecting client to its stored identity
    Resume {
        participant_token: String,
    },
    Vote {
        participant_token: String,
        question_id: QuestionId,
        option: OptionCode,
        #[serde(default)]
        msg_id: Option<String>,
    },
    /// Pull the authoritative current state
    Sync {
        #[serde(default)]
        participant_token: Option<String>,
    },
    GetLeaderboard,
    // Host-only messages
    HostCreateQuestion {
        spec: QuestionSpec,
    },
    HostStartVoting {
        question_id: QuestionId,
    },
    HostStopVoting {
        question_id: QuestionId,
        #[serde(default)]
        correct_option: Option<OptionCode>,
    },
    HostShowResults {
        question_id: QuestionId,
    },
    HostClearView,
    /// Drop all votes and participants; every client must re-register
    HostResetSession,
    HostListQuestions,
    HostGetTally {
        question_id: QuestionId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        server_now: DateTime<Utc>,
    },
    /// Authoritative state, sent on connect, on request and after missed pushes
    State(StateSnapshot),
    QuestionActivated {
        question: Question,
        end_time: Option<DateTime<Utc>>,
        server_now: DateTime<Utc>,
        revision: u64,
    },
    QuestionClosed {
        question: Question,
        final_tally: Tally,
        revision: u64,
    },
    /// Presenter stream only (and audience once results are shown)
    TallyDelta {
        question_id: QuestionId,
        tally: Tally,
        total_votes: u32,
        seq: u64,
    },
    /// Sent to the submitting client only
    VoteAcknowledged {
        question_id: QuestionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg_id: Option<String>,
    },
    ViewCleared,
    TimerSync {
        question_id: QuestionId,
        end_time: DateTime<Utc>,
        server_now: DateTime<Utc>,
        remaining_seconds: u64,
    },
    ResultsShown {
        question_id: QuestionId,
        tally: Tally,
    },
    SessionReset,
    Registered {
        participant: ParticipantInfo,
        /// Bearer token; the client keeps it to survive reloads
        participant_token: String,
    },
    Resumed {
        participant: ParticipantInfo,
    },
    QuestionCreated {
        question: Question,
    },
    Questions {
        list: Vec<Question>,
    },
    Tally {
        question_id: QuestionId,
        tally: Tally,
        total_votes: u32,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(e: &crate::error::EngineError) -> Self {
        ServerMessage::Error {
            code: e.code().to_string(),
            msg: e.to_string(),
        }
    }
}

/// Everything a client needs to rebuild its view from scratch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub role: Role,
    pub server_now: DateTime<Utc>,
    pub revision: u64,
    /// Question on screen: the active one, or the last closed one until the
    /// view is cleared
    pub question: Option<Question>,
    pub end_time: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<u64>,
    /// The caller's own vote on `question`, if any
    pub my_vote: Option<OptionCode>,
    /// Present for host/presenter, and for audience once results are visible
    pub tally: Option<Tally>,
    pub participant: Option<ParticipantInfo>,
}
