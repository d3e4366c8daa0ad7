//! Post-session review export: every question with its tally and the
//! individual votes, suitable for download by the host.

use super::score::points_for;
use super::vote::{tally_from, total_votes};
use super::AppState;
use crate::error::EngineResult;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewExport {
    pub exported_at: DateTime<Utc>,
    pub questions: Vec<QuestionReview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReview {
    pub question: Question,
    pub state: LifecycleState,
    pub tally: Tally,
    pub total_votes: u32,
    /// `None` when the question has no known correct option
    pub correct_votes: Option<u32>,
    pub votes: Vec<VoteRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub participant_id: ParticipantId,
    /// Empty once the participant has been removed by a session reset
    pub display_name: String,
    pub option: OptionCode,
    pub submitted_at: DateTime<Utc>,
    pub elapsed_ms: Option<u64>,
    pub correct: Option<bool>,
    pub points: Option<u64>,
}

fn review(
    question: Question,
    votes: Vec<Vote>,
    names: &HashMap<ParticipantId, String>,
) -> QuestionReview {
    let tally = tally_from(&question, &votes);
    let correct = question.correct_option.clone();

    let records: Vec<VoteRecord> = votes
        .into_iter()
        .map(|v| {
            let elapsed_ms = question
                .activated_at
                .map(|at| (v.submitted_at - at).num_milliseconds().max(0) as u64);
            let is_correct = correct.as_ref().map(|c| *c == v.option);
            let points = match (is_correct, elapsed_ms) {
                (Some(true), Some(ms)) => Some(points_for(ms, question.timer_seconds)),
                (Some(false), _) => Some(0),
                _ => None,
            };
            VoteRecord {
                display_name: names.get(&v.participant_id).cloned().unwrap_or_default(),
                participant_id: v.participant_id,
                option: v.option,
                submitted_at: v.submitted_at,
                elapsed_ms,
                correct: is_correct,
                points,
            }
        })
        .collect();

    let correct_votes = correct.as_ref().map(|c| tally.get(c).copied().unwrap_or(0));

    QuestionReview {
        state: question.lifecycle(),
        total_votes: total_votes(&tally),
        question,
        tally,
        correct_votes,
        votes: records,
    }
}

impl AppState {
    /// Build the review export for every question in creation order
    pub async fn export_review(&self) -> EngineResult<ReviewExport> {
        let names: HashMap<ParticipantId, String> = self
            .store
            .participants()
            .await?
            .into_iter()
            .map(|p| (p.id, p.display_name))
            .collect();

        let mut questions = Vec::new();
        for question in self.store.questions().await? {
            let votes = self.store.votes_for(&question.id).await?;
            questions.push(review(question, votes, &names));
        }

        tracing::info!("Exported review of {} questions", questions.len());
        Ok(ReviewExport {
            exported_at: self.clock.now(),
            questions,
        })
    }
}
