use super::AppState;
use crate::error::EngineResult;
use crate::store::ScoreAward;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Points for an instant correct answer
pub const MAX_POINTS: u64 = 1000;
/// Points for a correct answer at the last moment of the timer
pub const MIN_POINTS: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub participant: ParticipantInfo,
}

/// Linear falloff from MAX_POINTS to MIN_POINTS over the timer.
/// Untimed questions always give MAX_POINTS.
pub fn points_for(elapsed_ms: u64, timer_seconds: Option<u32>) -> u64 {
    match timer_seconds {
        Some(secs) if secs > 0 => {
            let duration_ms = u64::from(secs) * 1000;
            let elapsed = elapsed_ms.min(duration_ms);
            MAX_POINTS - (MAX_POINTS - MIN_POINTS) * elapsed / duration_ms
        }
        _ => MAX_POINTS,
    }
}

/// Awards for every correct vote of a closed question
pub fn compute_awards(question: &Question, votes: &[Vote]) -> Vec<ScoreAward> {
    let (Some(correct), Some(activated_at)) = (&question.correct_option, question.activated_at)
    else {
        return Vec::new();
    };

    votes
        .iter()
        .filter(|v| &v.option == correct)
        .map(|v| {
            let elapsed_ms = (v.submitted_at - activated_at).num_milliseconds().max(0) as u64;
            ScoreAward {
                participant_id: v.participant_id.clone(),
                points: points_for(elapsed_ms, question.timer_seconds),
                elapsed_ms,
            }
        })
        .collect()
}

impl AppState {
    /// Apply awards for a closed question once per activation. Failures are
    /// logged; the question stays unscored and can be scored by a later stop.
    pub(super) async fn award_scores(&self, question: &Question, votes: &[Vote]) {
        let Some(activated_at) = question.activated_at else {
            return;
        };
        if question.correct_option.is_none() || question.scored_at.is_some() {
            return;
        }

        let awards = compute_awards(question, votes);
        let count = awards.len();
        match self
            .store
            .apply_scores(&question.id, activated_at, self.clock.now(), awards)
            .await
        {
            Ok(true) => tracing::info!(
                "Scored question {}: {} correct answers",
                question.id,
                count
            ),
            Ok(false) => tracing::debug!("Question {} already scored", question.id),
            Err(e) => tracing::error!("Failed to score question {}: {}", question.id, e),
        }
    }

    /// Participants ordered by score, then correct answers, then speed
    pub async fn leaderboard(&self) -> EngineResult<Vec<LeaderboardEntry>> {
        let mut participants = self.store.participants().await?;
        participants.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.correct_count.cmp(&a.correct_count))
                .then(a.total_time_ms.cmp(&b.total_time_ms))
        });

        Ok(participants
            .iter()
            .enumerate()
            .map(|(i, p)| LeaderboardEntry {
                rank: i + 1,
                participant: p.into(),
            })
            .collect())
    }
}
