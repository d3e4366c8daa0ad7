//! Client reconciliation: the authoritative state a (re)connecting client
//! rebuilds its view from.

use super::vote::tally_from;
use super::AppState;
use crate::error::EngineResult;
use crate::protocol::StateSnapshot;
use crate::timer;
use crate::types::*;

impl AppState {
    /// Question on screen: the active one, otherwise the last one started
    /// until the view is cleared
    async fn on_screen_question(&self) -> EngineResult<Option<Question>> {
        if let Some(active) = self.active_question().await? {
            return Ok(Some(active));
        }
        let id = self.on_screen.read().await.clone();
        match id {
            Some(id) => Ok(self.store.question(&id).await?),
            None => Ok(None),
        }
    }

    /// Snapshot for a client known only by its bearer token. An unknown
    /// token gets the anonymous view; store failures are returned.
    pub async fn state_for_token(
        &self,
        role: Role,
        token: Option<&str>,
    ) -> EngineResult<StateSnapshot> {
        let participant = match token {
            Some(token) => self.participant_by_token(token).await?,
            None => None,
        };
        self.current_state(role, participant.as_ref()).await
    }

    /// Build the state snapshot for `role`. `participant` personalises the
    /// caller's own vote and score.
    pub async fn current_state(
        &self,
        role: Role,
        participant: Option<&Participant>,
    ) -> EngineResult<StateSnapshot> {
        let server_now = self.clock.now();
        let revision = self.store.revision().await?;
        let question = self.on_screen_question().await?;

        let mut end_time = None;
        let mut remaining_seconds = None;
        let mut my_vote = None;
        let mut tally = None;

        if let Some(ref q) = question {
            if q.is_active {
                end_time = q.end_time;
                remaining_seconds = q.end_time.map(|end| timer::remaining_seconds(end, server_now));
            }
            if let Some(p) = participant {
                my_vote = self.store.vote_of(&q.id, &p.id).await?.map(|v| v.option);
            }
            if role.sees_live_tally() || !q.is_active || q.results_visible {
                let votes = self.store.votes_for(&q.id).await?;
                tally = Some(tally_from(q, &votes));
            }
        }

        // Re-read so the score reflects any closure scored since the caller fetched it
        let participant = match participant {
            Some(p) => self
                .store
                .participant(&p.id)
                .await?
                .map(|p| ParticipantInfo::from(&p)),
            None => None,
        };

        let question = match role {
            Role::Host => question,
            Role::Presenter | Role::Audience => question.map(|q| q.audience_view()),
        };

        Ok(StateSnapshot {
            role,
            server_now,
            revision,
            question,
            end_time,
            remaining_seconds,
            my_vote,
            tally,
            participant,
        })
    }
}
