use super::AppState;
use crate::error::{EngineError, EngineResult};
use crate::protocol::ServerMessage;
use crate::types::*;

/// Aggregate stored votes into a tally seeded with every option of `question`
pub fn tally_from(question: &Question, votes: &[Vote]) -> Tally {
    let mut tally = question.empty_tally();
    for vote in votes {
        if let Some(count) = tally.get_mut(&vote.option) {
            *count += 1;
        }
    }
    tally
}

pub fn total_votes(tally: &Tally) -> u32 {
    tally.values().sum()
}

impl AppState {
    /// Record a participant's single vote on an open question and return the
    /// updated tally
    pub async fn submit_vote(
        &self,
        question_id: &str,
        participant_id: &str,
        option: &str,
    ) -> EngineResult<Tally> {
        let question = self.get_question(question_id).await?;
        let now = self.clock.now();

        if !question.accepts_votes_at(now) {
            return Err(EngineError::NotActive(question_id.to_string()));
        }
        if !question.has_option(option) {
            return Err(EngineError::InvalidOption(format!(
                "{:?} is not an option of question {}",
                option, question_id
            )));
        }

        // The store re-checks openness and uniqueness under its own lock
        self.store
            .insert_vote(Vote {
                question_id: question_id.to_string(),
                participant_id: participant_id.to_string(),
                option: option.to_string(),
                submitted_at: now,
            })
            .await?;

        tracing::debug!(
            "Participant {} voted {} on question {}",
            participant_id,
            option,
            question_id
        );

        let visible = self
            .store
            .question(question_id)
            .await?
            .is_some_and(|q| q.results_visible);
        self.push_tally(&question, visible).await
    }

    /// Read the tally of `question` and push it as the next numbered delta.
    ///
    /// The read, the `seq` allocation and the send share one critical
    /// section, so a higher `seq` never carries an older count.
    pub(super) async fn push_tally(
        &self,
        question: &Question,
        to_audience: bool,
    ) -> EngineResult<Tally> {
        let mut seq = self.tally_seq.lock().await;
        let votes = self.store.votes_for(&question.id).await?;
        let tally = tally_from(question, &votes);
        *seq += 1;

        let delta = ServerMessage::TallyDelta {
            question_id: question.id.clone(),
            tally: tally.clone(),
            total_votes: total_votes(&tally),
            seq: *seq,
        };
        if to_audience {
            self.broadcast_to_all(delta.clone());
        }
        self.broadcast_to_presenters(delta);

        Ok(tally)
    }

    /// Current tally of a question, recomputed from the stored votes
    pub async fn tally_of(&self, question_id: &str) -> EngineResult<Tally> {
        let question = self.get_question(question_id).await?;
        let votes = self.store.votes_for(question_id).await?;
        Ok(tally_from(&question, &votes))
    }

    pub async fn vote_of(
        &self,
        question_id: &str,
        participant_id: &str,
    ) -> EngineResult<Option<Vote>> {
        Ok(self.store.vote_of(question_id, participant_id).await?)
    }
}
