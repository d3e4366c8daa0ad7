//! Question lifecycle: create, start, stop, clear, expire

use std::collections::HashSet;

use super::AppState;
use crate::error::{EngineError, EngineResult};
use crate::protocol::ServerMessage;
use crate::store::{CloseGuard, CloseOutcome};
use crate::timer::{self, Countdown};
use crate::types::*;

const MAX_CODE_LEN: usize = 8;

/// A question after closure, with its frozen tally
#[derive(Debug, Clone)]
pub struct Closure {
    pub question: Question,
    pub final_tally: Tally,
}

fn valid_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

impl AppState {
    fn check_timer(&self, timer_seconds: Option<u32>) -> EngineResult<()> {
        if let Some(secs) = timer_seconds {
            if secs < self.config.timer_min_secs || secs > self.config.timer_max_secs {
                return Err(EngineError::InvalidConfig(format!(
                    "Timer must be between {} and {} seconds, got {}",
                    self.config.timer_min_secs, self.config.timer_max_secs, secs
                )));
            }
        }
        Ok(())
    }

    /// Validate a spec and store the question in draft state
    pub async fn create_question(&self, spec: QuestionSpec) -> EngineResult<Question> {
        let title = spec.title.trim().to_string();
        if title.is_empty() {
            return Err(EngineError::InvalidConfig("Title cannot be empty".to_string()));
        }
        if spec.options.is_empty() {
            return Err(EngineError::InvalidConfig(
                "At least one option is required".to_string(),
            ));
        }
        if spec.options.len() > self.config.max_options {
            return Err(EngineError::InvalidConfig(format!(
                "At most {} options are allowed",
                self.config.max_options
            )));
        }
        self.check_timer(spec.timer_seconds)?;

        let mut seen = HashSet::new();
        let mut options = Vec::with_capacity(spec.options.len());
        for (i, option) in spec.options.into_iter().enumerate() {
            let text = option.text.trim().to_string();
            if text.is_empty() {
                return Err(EngineError::InvalidConfig(format!(
                    "Option {} has no text",
                    i + 1
                )));
            }
            let code = match option.code {
                Some(code) => code.trim().to_string(),
                None => DEFAULT_OPTION_CODES
                    .get(i..i + 1)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("o{}", i + 1)),
            };
            if !valid_code(&code) {
                return Err(EngineError::InvalidConfig(format!(
                    "Option code {:?} must be 1-{} lowercase letters or digits",
                    code, MAX_CODE_LEN
                )));
            }
            if !seen.insert(code.clone()) {
                return Err(EngineError::InvalidConfig(format!(
                    "Duplicate option code {:?}",
                    code
                )));
            }
            options.push(QuestionOption { code, text });
        }

        if let Some(ref correct) = spec.correct_option {
            if !seen.contains(correct) {
                return Err(EngineError::InvalidConfig(format!(
                    "Correct option {:?} is not one of the options",
                    correct
                )));
            }
        }

        let question = Question {
            id: ulid::Ulid::new().to_string(),
            title,
            body: spec.body.filter(|b| !b.trim().is_empty()),
            options,
            correct_option: spec.correct_option,
            explanation: spec.explanation,
            timer_seconds: spec.timer_seconds,
            is_active: false,
            voting_closed: false,
            activated_at: None,
            end_time: None,
            results_visible: false,
            scored_at: None,
            created_at: self.clock.now(),
        };

        self.store.insert_question(question.clone()).await?;
        tracing::info!(
            "Created question {} with {} options",
            question.id,
            question.options.len()
        );
        Ok(question)
    }

    pub async fn get_question(&self, id: &str) -> EngineResult<Question> {
        self.store
            .question(id)
            .await?
            .ok_or_else(|| EngineError::question_not_found(id))
    }

    pub async fn list_questions(&self) -> EngineResult<Vec<Question>> {
        Ok(self.store.questions().await?)
    }

    /// The currently active question, if any
    pub async fn active_question(&self) -> EngineResult<Option<Question>> {
        Ok(self.store.active_questions().await?.into_iter().next())
    }

    /// Close every other active question and open `id` with a fresh tally
    pub async fn start_voting(&self, id: &str) -> EngineResult<Question> {
        let _lifecycle = self.lifecycle_lock.lock().await;

        let question = self.get_question(id).await?;
        if question.options.is_empty() {
            return Err(EngineError::InvalidConfig(format!(
                "Question {} has no options",
                id
            )));
        }
        self.check_timer(question.timer_seconds)?;

        let now = self.clock.now();
        let end_time = timer::end_time_for(now, question.timer_seconds);
        let activation = self.store.activate_exclusive(id, now, end_time).await?;

        // Committed from here on; failed pushes are logged, clients resync
        for closed in &activation.closed {
            tracing::info!("Question {} closed by activation of {}", closed.id, id);
            if let Err(e) = self.publish_closure(closed, activation.revision).await {
                tracing::error!("Failed to publish closure of question {}: {}", closed.id, e);
            }
        }

        *self.on_screen.write().await = Some(id.to_string());

        let question = activation.question;
        tracing::info!(
            "Voting started on question {} (ends: {:?})",
            question.id,
            question.end_time
        );

        self.broadcast_to_all(ServerMessage::QuestionActivated {
            question: question.audience_view(),
            end_time: question.end_time,
            server_now: now,
            revision: activation.revision,
        });
        if let Err(e) = self.push_tally(&question, false).await {
            tracing::error!("Failed to push opening tally of question {}: {}", question.id, e);
        }

        Ok(question)
    }

    /// Close `id` by hand, recording the correct option if given
    pub async fn stop_voting(
        &self,
        id: &str,
        correct_option: Option<OptionCode>,
    ) -> EngineResult<Closure> {
        let _lifecycle = self.lifecycle_lock.lock().await;

        let question = self.get_question(id).await?;
        if let Some(ref code) = correct_option {
            if !question.has_option(code) {
                return Err(EngineError::InvalidOption(format!(
                    "{:?} is not an option of question {}",
                    code, id
                )));
            }
        }
        let stamped = correct_option.is_some();

        match self
            .store
            .close_question(id, CloseGuard::Manual, correct_option)
            .await?
        {
            CloseOutcome::Closed { question, revision } => {
                tracing::info!("Voting stopped on question {}", id);
                let final_tally = self.publish_closure(&question, revision).await?;
                Ok(Closure {
                    question,
                    final_tally,
                })
            }
            CloseOutcome::Unchanged(question) => {
                tracing::debug!("Question {} was already closed", id);
                let final_tally = self.tally_of(id).await?;
                if stamped {
                    let votes = self.store.votes_for(id).await?;
                    self.award_scores(&question, &votes).await;
                }
                Ok(Closure {
                    question,
                    final_tally,
                })
            }
        }
    }

    /// Close any active question and blank the audience view
    pub async fn clear_view(&self) -> EngineResult<()> {
        let _lifecycle = self.lifecycle_lock.lock().await;

        let (closed, revision) = self.store.close_all_active().await?;
        for question in &closed {
            self.publish_closure(question, revision).await?;
        }
        *self.on_screen.write().await = None;

        tracing::info!("View cleared ({} questions closed)", closed.len());
        self.broadcast_to_all(ServerMessage::ViewCleared);
        Ok(())
    }

    /// Reveal the tally of `id` to the audience before it closes
    pub async fn show_results(&self, id: &str) -> EngineResult<Tally> {
        let question = self.store.set_results_visible(id).await?;
        let tally = self.tally_of(&question.id).await?;
        tracing::info!("Results shown for question {}", id);
        self.broadcast_to_all(ServerMessage::ResultsShown {
            question_id: question.id,
            tally: tally.clone(),
        });
        Ok(tally)
    }

    /// Close every active question whose countdown has reached zero.
    ///
    /// Safe to call repeatedly: each closure is a compare-and-set on the
    /// observed activation, so a second observation is a no-op.
    pub async fn close_expired_questions(&self) -> EngineResult<Vec<Question>> {
        let now = self.clock.now();
        let mut closed = Vec::new();

        for question in self.store.active_questions().await? {
            let (Some(end_time), Some(activated_at)) = (question.end_time, question.activated_at)
            else {
                continue;
            };
            if !timer::is_expired(end_time, now) {
                continue;
            }

            let _lifecycle = self.lifecycle_lock.lock().await;
            match self
                .store
                .close_question(&question.id, CloseGuard::Expiry { activated_at }, None)
                .await?
            {
                CloseOutcome::Closed { question, revision } => {
                    tracing::info!("Question {} expired", question.id);
                    self.publish_closure(&question, revision).await?;
                    closed.push(question);
                }
                CloseOutcome::Unchanged(_) => {
                    tracing::debug!("Question {} already closed before expiry", question.id);
                }
            }
        }

        Ok(closed)
    }

    /// Countdown of the active timed question, if any
    pub async fn countdown(&self) -> EngineResult<Option<(QuestionId, Countdown)>> {
        let now = self.clock.now();
        Ok(self.active_question().await?.and_then(|q| {
            q.end_time
                .map(|end_time| (q.id.clone(), Countdown::at(end_time, now)))
        }))
    }

    /// Freeze the tally of a just-closed question, score it, and push the results
    async fn publish_closure(&self, question: &Question, revision: u64) -> EngineResult<Tally> {
        let votes = self.store.votes_for(&question.id).await?;
        let final_tally = super::vote::tally_from(question, &votes);

        self.award_scores(question, &votes).await;

        self.broadcast_to_all(ServerMessage::QuestionClosed {
            question: question.clone(),
            final_tally: final_tally.clone(),
            revision,
        });
        Ok(final_tally)
    }
}
