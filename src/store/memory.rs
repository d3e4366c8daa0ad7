use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{Mutex, RwLock};

use super::journal::{Journal, JournalEntry, COMPACT_AFTER};
use super::snapshot::StoreSnapshot;
use super::*;

/// Store holding every table behind a single lock.
///
/// Each mutation is planned against the current tables as a list of row
/// changes. With a snapshot path, those changes are appended to the journal
/// before they are applied, so a failed write leaves the tables untouched.
pub struct MemoryStore {
    tables: RwLock<StoreSnapshot>,
    journal: Option<Mutex<Journal>>,
}

impl MemoryStore {
    /// Purely in-memory store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(StoreSnapshot::empty()),
            journal: None,
        }
    }

    /// Store persisted at `path`, restoring whatever was committed there
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_compaction(path, COMPACT_AFTER).await
    }

    async fn open_with_compaction(path: impl AsRef<Path>, compact_after: usize) -> StoreResult<Self> {
        let (journal, tables) = Journal::open(path.as_ref(), compact_after).await?;
        Ok(Self {
            tables: RwLock::new(tables),
            journal: Some(Mutex::new(journal)),
        })
    }

    async fn commit<T, F>(&self, plan: F) -> StoreResult<T>
    where
        F: FnOnce(&StoreSnapshot) -> StoreResult<(T, Vec<JournalEntry>)> + Send,
        T: Send,
    {
        let mut tables = self.tables.write().await;
        let (out, entries) = plan(&tables)?;

        let Some(journal) = &self.journal else {
            for entry in entries {
                entry.apply(&mut tables);
            }
            return Ok(out);
        };

        let mut journal = journal.lock().await;
        if let Err(e) = journal.append(&entries).await {
            tracing::error!("Failed to append to the store journal: {}", e);
            return Err(e);
        }
        for entry in entries {
            entry.apply(&mut tables);
        }

        if journal.needs_compaction() {
            // Readers proceed while the snapshot is written; writers wait on the journal
            let tables = tables.downgrade();
            if let Err(e) = journal.compact(&tables).await {
                tracing::warn!("Journal compaction failed, retrying on the next write: {}", e);
            }
        }
        Ok(out)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find<'a>(tables: &'a StoreSnapshot, id: &str) -> StoreResult<&'a Question> {
    tables
        .questions
        .iter()
        .find(|q| q.id == id)
        .ok_or_else(|| StoreError::QuestionNotFound(id.to_string()))
}

fn closed(mut question: Question) -> Question {
    question.is_active = false;
    question.voting_closed = true;
    question.end_time = None;
    question
}

fn put(question: Question) -> JournalEntry {
    JournalEntry::PutQuestion { question }
}

/// Closed copies of every active question except `keep`
fn close_active(tables: &StoreSnapshot, keep: Option<&str>) -> Vec<Question> {
    tables
        .questions
        .iter()
        .filter(|q| q.is_active && Some(q.id.as_str()) != keep)
        .cloned()
        .map(closed)
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_question(&self, question: Question) -> StoreResult<()> {
        self.commit(move |t| {
            if t.questions.iter().any(|q| q.id == question.id) {
                return Err(StoreError::QuestionExists(question.id));
            }
            Ok(((), vec![put(question)]))
        })
        .await
    }

    async fn question(&self, id: &str) -> StoreResult<Option<Question>> {
        let tables = self.tables.read().await;
        Ok(tables.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn questions(&self) -> StoreResult<Vec<Question>> {
        Ok(self.tables.read().await.questions.clone())
    }

    async fn active_questions(&self) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .iter()
            .filter(|q| q.is_active)
            .cloned()
            .collect())
    }

    async fn activate_exclusive(
        &self,
        id: &str,
        activated_at: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Activation> {
        self.commit(move |t| {
            let mut question = find(t, id)?.clone();
            let closed = close_active(t, Some(id));

            question.is_active = true;
            question.voting_closed = false;
            question.activated_at = Some(activated_at);
            question.end_time = end_time;
            question.results_visible = false;
            question.scored_at = None;
            let revision = t.revision + 1;

            let mut entries: Vec<JournalEntry> = closed.iter().cloned().map(put).collect();
            entries.push(put(question.clone()));
            entries.push(JournalEntry::DropVotes {
                question_id: id.to_string(),
            });
            entries.push(JournalEntry::Revision { revision });

            Ok((
                Activation {
                    question,
                    closed,
                    revision,
                },
                entries,
            ))
        })
        .await
    }

    async fn close_question(
        &self,
        id: &str,
        guard: CloseGuard,
        correct_option: Option<OptionCode>,
    ) -> StoreResult<CloseOutcome> {
        self.commit(move |t| {
            let mut question = find(t, id)?.clone();

            let running = match guard {
                CloseGuard::Manual => {
                    if question.lifecycle() == LifecycleState::Draft {
                        return Err(StoreError::QuestionNotOpen(id.to_string()));
                    }
                    question.is_active
                }
                CloseGuard::Expiry { activated_at } => {
                    question.is_active && question.activated_at == Some(activated_at)
                }
            };

            let mut stamped = false;
            if let Some(code) = correct_option {
                if question.correct_option.as_ref() != Some(&code) {
                    // Scores already handed out for this activation stay valid
                    if question.scored_at.is_some() {
                        return Err(StoreError::AlreadyScored {
                            question_id: id.to_string(),
                            recorded: question.correct_option.unwrap_or_default(),
                        });
                    }
                    question.correct_option = Some(code);
                    stamped = true;
                }
            }

            if !running {
                let entries = if stamped {
                    vec![put(question.clone())]
                } else {
                    Vec::new()
                };
                return Ok((CloseOutcome::Unchanged(question), entries));
            }

            let question = closed(question);
            let revision = t.revision + 1;
            Ok((
                CloseOutcome::Closed {
                    question: question.clone(),
                    revision,
                },
                vec![put(question), JournalEntry::Revision { revision }],
            ))
        })
        .await
    }

    async fn close_all_active(&self) -> StoreResult<(Vec<Question>, u64)> {
        self.commit(|t| {
            let closed = close_active(t, None);
            if closed.is_empty() {
                return Ok(((closed, t.revision), Vec::new()));
            }
            let revision = t.revision + 1;
            let mut entries: Vec<JournalEntry> = closed.iter().cloned().map(put).collect();
            entries.push(JournalEntry::Revision { revision });
            Ok(((closed, revision), entries))
        })
        .await
    }

    async fn set_results_visible(&self, id: &str) -> StoreResult<Question> {
        self.commit(move |t| {
            let mut question = find(t, id)?.clone();
            if question.lifecycle() == LifecycleState::Draft {
                return Err(StoreError::QuestionNotOpen(id.to_string()));
            }
            question.results_visible = true;
            Ok((question.clone(), vec![put(question)]))
        })
        .await
    }

    async fn insert_vote(&self, vote: Vote) -> StoreResult<()> {
        self.commit(move |t| {
            if !find(t, &vote.question_id)?.accepts_votes_at(vote.submitted_at) {
                return Err(StoreError::QuestionNotOpen(vote.question_id));
            }
            if !t.participants.contains_key(&vote.participant_id) {
                return Err(StoreError::ParticipantNotFound(vote.participant_id));
            }
            let already = t
                .votes
                .get(&vote.question_id)
                .is_some_and(|votes| votes.contains_key(&vote.participant_id));
            if already {
                return Err(StoreError::DuplicateVote {
                    question_id: vote.question_id,
                    participant_id: vote.participant_id,
                });
            }
            Ok(((), vec![JournalEntry::PutVote { vote }]))
        })
        .await
    }

    async fn votes_for(&self, question_id: &str) -> StoreResult<Vec<Vote>> {
        let tables = self.tables.read().await;
        let mut votes: Vec<Vote> = tables
            .votes
            .get(question_id)
            .map(|v| v.values().cloned().collect())
            .unwrap_or_default();
        votes.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(votes)
    }

    async fn vote_of(
        &self,
        question_id: &str,
        participant_id: &str,
    ) -> StoreResult<Option<Vote>> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .get(question_id)
            .and_then(|v| v.get(participant_id))
            .cloned())
    }

    async fn insert_participant(&self, participant: Participant) -> StoreResult<()> {
        self.commit(move |_| Ok(((), vec![JournalEntry::PutParticipant { participant }])))
            .await
    }

    async fn participant(&self, id: &str) -> StoreResult<Option<Participant>> {
        Ok(self.tables.read().await.participants.get(id).cloned())
    }

    async fn participant_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<Participant>> {
        let tables = self.tables.read().await;
        Ok(tables
            .participants
            .values()
            .find(|p| p.token_hash == token_hash)
            .cloned())
    }

    async fn participants(&self) -> StoreResult<Vec<Participant>> {
        let tables = self.tables.read().await;
        let mut participants: Vec<Participant> = tables.participants.values().cloned().collect();
        participants.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        Ok(participants)
    }

    async fn apply_scores(
        &self,
        question_id: &str,
        activated_at: DateTime<Utc>,
        scored_at: DateTime<Utc>,
        awards: Vec<ScoreAward>,
    ) -> StoreResult<bool> {
        self.commit(move |t| {
            let mut question = find(t, question_id)?.clone();
            if question.activated_at != Some(activated_at) || question.scored_at.is_some() {
                return Ok((false, Vec::new()));
            }
            question.scored_at = Some(scored_at);

            let mut entries = vec![put(question)];
            for award in awards {
                let Some(current) = t.participants.get(&award.participant_id) else {
                    continue;
                };
                let mut participant = current.clone();
                participant.score += award.points;
                participant.correct_count += 1;
                participant.total_time_ms += award.elapsed_ms;
                entries.push(JournalEntry::PutParticipant { participant });
            }
            Ok((true, entries))
        })
        .await
    }

    async fn clear_session(&self) -> StoreResult<u64> {
        self.commit(|t| {
            let revision = t.revision + 1;
            let mut entries: Vec<JournalEntry> = close_active(t, None).into_iter().map(put).collect();
            entries.push(JournalEntry::ClearSession);
            entries.push(JournalEntry::Revision { revision });
            Ok((revision, entries))
        })
        .await
    }

    async fn revision(&self) -> StoreResult<u64> {
        Ok(self.tables.read().await.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            title: format!("Question {}", id),
            body: None,
            options: ["a", "b", "c"]
                .iter()
                .map(|c| QuestionOption {
                    code: c.to_string(),
                    text: c.to_uppercase(),
                })
                .collect(),
            correct_option: None,
            explanation: None,
            timer_seconds: None,
            is_active: false,
            voting_closed: false,
            activated_at: None,
            end_time: None,
            results_visible: false,
            scored_at: None,
            created_at: Utc::now(),
        }
    }

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            token_hash: format!("hash-{}", id),
            display_name: id.to_string(),
            score: 0,
            correct_count: 0,
            total_time_ms: 0,
            registered_at: Utc::now(),
        }
    }

    fn vote(question_id: &str, participant_id: &str, option: &str) -> Vote {
        Vote {
            question_id: question_id.to_string(),
            participant_id: participant_id.to_string(),
            option: option.to_string(),
            submitted_at: Utc::now(),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_question(question("q1")).await.unwrap();
        store.insert_question(question("q2")).await.unwrap();
        store.insert_participant(participant("p1")).await.unwrap();
        store.insert_participant(participant("p2")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_duplicate_question_id_rejected() {
        let store = seeded().await;
        let result = store.insert_question(question("q1")).await;
        assert!(matches!(result, Err(StoreError::QuestionExists(_))));
    }

    #[tokio::test]
    async fn test_activate_closes_others() {
        let store = seeded().await;
        let now = Utc::now();

        store.activate_exclusive("q1", now, None).await.unwrap();
        let activation = store.activate_exclusive("q2", now, None).await.unwrap();

        assert_eq!(activation.closed.len(), 1);
        assert_eq!(activation.closed[0].id, "q1");
        assert!(activation.closed[0].voting_closed);

        let active = store.active_questions().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "q2");
    }

    #[tokio::test]
    async fn test_activate_missing_question_changes_nothing() {
        let store = seeded().await;
        store.activate_exclusive("q1", Utc::now(), None).await.unwrap();
        let before = store.revision().await.unwrap();

        let result = store.activate_exclusive("nope", Utc::now(), None).await;
        assert!(matches!(result, Err(StoreError::QuestionNotFound(_))));

        // q1 stays active
        assert_eq!(store.active_questions().await.unwrap()[0].id, "q1");
        assert_eq!(store.revision().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_concurrent_activations_leave_one_active() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..20 {
            store.insert_question(question(&format!("q{}", i))).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .activate_exclusive(&format!("q{}", i), Utc::now(), None)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.active_questions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reactivation_clears_votes() {
        let store = seeded().await;
        store.activate_exclusive("q1", Utc::now(), None).await.unwrap();
        store.insert_vote(vote("q1", "p1", "a")).await.unwrap();
        store
            .close_question("q1", CloseGuard::Manual, None)
            .await
            .unwrap();
        assert_eq!(store.votes_for("q1").await.unwrap().len(), 1);

        store.activate_exclusive("q1", Utc::now(), None).await.unwrap();
        assert!(store.votes_for("q1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vote_uniqueness() {
        let store = seeded().await;
        store.activate_exclusive("q1", Utc::now(), None).await.unwrap();

        store.insert_vote(vote("q1", "p1", "a")).await.unwrap();
        let second = store.insert_vote(vote("q1", "p1", "b")).await;
        assert!(matches!(second, Err(StoreError::DuplicateVote { .. })));

        let stored = store.vote_of("q1", "p1").await.unwrap().unwrap();
        assert_eq!(stored.option, "a");
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_votes_store_one() {
        let store = Arc::new(seeded().await);
        store.activate_exclusive("q1", Utc::now(), None).await.unwrap();

        let mut handles = Vec::new();
        for option in ["a", "b", "c", "a", "b", "c"] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_vote(vote("q1", "p1", option)).await
            }));
        }

        let mut ok = 0;
        let mut duplicates = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(StoreError::DuplicateVote { .. }) => duplicates += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(duplicates, 5);
        assert_eq!(store.votes_for("q1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vote_rejected_when_not_open() {
        let store = seeded().await;

        // Draft
        let result = store.insert_vote(vote("q1", "p1", "a")).await;
        assert!(matches!(result, Err(StoreError::QuestionNotOpen(_))));

        // Past end time
        let now = Utc::now();
        store
            .activate_exclusive("q1", now - Duration::seconds(40), Some(now - Duration::seconds(10)))
            .await
            .unwrap();
        let result = store.insert_vote(vote("q1", "p1", "a")).await;
        assert!(matches!(result, Err(StoreError::QuestionNotOpen(_))));
    }

    #[tokio::test]
    async fn test_vote_from_unknown_participant() {
        let store = seeded().await;
        store.activate_exclusive("q1", Utc::now(), None).await.unwrap();
        let result = store.insert_vote(vote("q1", "ghost", "a")).await;
        assert!(matches!(result, Err(StoreError::ParticipantNotFound(_))));
    }

    #[tokio::test]
    async fn test_expiry_close_is_compare_and_set() {
        let store = seeded().await;
        let first = Utc::now();
        store.activate_exclusive("q1", first, None).await.unwrap();

        let guard = CloseGuard::Expiry {
            activated_at: first,
        };
        let outcome = store.close_question("q1", guard, None).await.unwrap();
        assert!(matches!(outcome, CloseOutcome::Closed { .. }));

        let outcome = store.close_question("q1", guard, None).await.unwrap();
        assert!(matches!(outcome, CloseOutcome::Unchanged(_)));
    }

    #[tokio::test]
    async fn test_stale_expiry_does_not_close_new_activation() {
        let store = seeded().await;
        let first = Utc::now();
        store.activate_exclusive("q1", first, None).await.unwrap();
        let second = first + Duration::seconds(1);
        store.activate_exclusive("q1", second, None).await.unwrap();

        let outcome = store
            .close_question(
                "q1",
                CloseGuard::Expiry {
                    activated_at: first,
                },
                None,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, CloseOutcome::Unchanged(_)));
        assert!(store.question("q1").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_manual_close_of_draft_rejected() {
        let store = seeded().await;
        let result = store
            .close_question("q1", CloseGuard::Manual, Some("b".to_string()))
            .await;
        assert!(matches!(result, Err(StoreError::QuestionNotOpen(_))));
        assert!(store
            .question("q1")
            .await
            .unwrap()
            .unwrap()
            .correct_option
            .is_none());
    }

    #[tokio::test]
    async fn test_manual_close_stamps_correct_option() {
        let store = seeded().await;
        store.activate_exclusive("q1", Utc::now(), None).await.unwrap();
        let outcome = store
            .close_question("q1", CloseGuard::Manual, Some("b".to_string()))
            .await
            .unwrap();
        match outcome {
            CloseOutcome::Closed { question, .. } => {
                assert_eq!(question.correct_option.as_deref(), Some("b"));
                assert!(question.voting_closed);
                assert!(question.end_time.is_none());
            }
            CloseOutcome::Unchanged(_) => panic!("Expected Closed"),
        }
    }

    #[tokio::test]
    async fn test_apply_scores_once() {
        let store = seeded().await;
        let at = Utc::now();
        store.activate_exclusive("q1", at, None).await.unwrap();
        let award = ScoreAward {
            participant_id: "p1".to_string(),
            points: 900,
            elapsed_ms: 1200,
        };

        assert!(store
            .apply_scores("q1", at, Utc::now(), vec![award.clone()])
            .await
            .unwrap());
        assert!(!store
            .apply_scores("q1", at, Utc::now(), vec![award])
            .await
            .unwrap());

        let p1 = store.participant("p1").await.unwrap().unwrap();
        assert_eq!(p1.score, 900);
        assert_eq!(p1.correct_count, 1);
        assert_eq!(p1.total_time_ms, 1200);
    }

    #[tokio::test]
    async fn test_clear_session() {
        let store = seeded().await;
        store.activate_exclusive("q1", Utc::now(), None).await.unwrap();
        store.insert_vote(vote("q1", "p1", "a")).await.unwrap();

        store.clear_session().await.unwrap();

        assert!(store.active_questions().await.unwrap().is_empty());
        assert!(store.votes_for("q1").await.unwrap().is_empty());
        assert!(store.participants().await.unwrap().is_empty());
        // Questions themselves survive
        assert_eq!(store.questions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_journal_replays_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let at = Utc::now();

        {
            let store = MemoryStore::open(&path).await.unwrap();
            store.insert_question(question("q1")).await.unwrap();
            store.insert_question(question("q2")).await.unwrap();
            store.insert_participant(participant("p1")).await.unwrap();
            store.insert_participant(participant("p2")).await.unwrap();
            store.activate_exclusive("q1", at, None).await.unwrap();
            store.insert_vote(vote("q1", "p1", "a")).await.unwrap();
            store.insert_vote(vote("q1", "p2", "c")).await.unwrap();
            store
                .close_question("q1", CloseGuard::Manual, Some("a".to_string()))
                .await
                .unwrap();
            store
                .apply_scores(
                    "q1",
                    at,
                    Utc::now(),
                    vec![ScoreAward {
                        participant_id: "p1".to_string(),
                        points: 800,
                        elapsed_ms: 5000,
                    }],
                )
                .await
                .unwrap();
            store.activate_exclusive("q2", Utc::now(), None).await.unwrap();

            // Nothing compacted yet: the state lives in the log alone
            assert!(!tokio::fs::try_exists(&path).await.unwrap());
        }

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.votes_for("q1").await.unwrap().len(), 2);
        let q1 = reopened.question("q1").await.unwrap().unwrap();
        assert!(q1.voting_closed);
        assert_eq!(q1.correct_option.as_deref(), Some("a"));
        assert!(q1.scored_at.is_some());
        assert_eq!(reopened.active_questions().await.unwrap()[0].id, "q2");
        assert_eq!(reopened.participant("p1").await.unwrap().unwrap().score, 800);
        assert_eq!(reopened.revision().await.unwrap(), 3);

        // Uniqueness still enforced after restart
        reopened.activate_exclusive("q1", Utc::now(), None).await.unwrap();
        reopened.insert_vote(vote("q1", "p1", "a")).await.unwrap();
        let again = reopened.insert_vote(vote("q1", "p1", "b")).await;
        assert!(matches!(again, Err(StoreError::DuplicateVote { .. })));

        // Reopened from the compacted snapshot plus the newer log records
        drop(reopened);
        let third = MemoryStore::open(&path).await.unwrap();
        assert_eq!(third.votes_for("q1").await.unwrap().len(), 1);
        assert_eq!(third.participants().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_session_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = MemoryStore::open(&path).await.unwrap();
            store.insert_question(question("q1")).await.unwrap();
            store.insert_participant(participant("p1")).await.unwrap();
            store.activate_exclusive("q1", Utc::now(), None).await.unwrap();
            store.insert_vote(vote("q1", "p1", "a")).await.unwrap();
            store.clear_session().await.unwrap();
            store.insert_participant(participant("p2")).await.unwrap();
        }

        let reopened = MemoryStore::open(&path).await.unwrap();
        let participants = reopened.participants().await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].id, "p2");
        assert!(reopened.votes_for("q1").await.unwrap().is_empty());
        assert!(reopened.active_questions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compaction_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = MemoryStore::open_with_compaction(&path, 3).await.unwrap();
            store.insert_question(question("q1")).await.unwrap();
            for id in ["p1", "p2", "p3", "p4"] {
                store.insert_participant(participant(id)).await.unwrap();
            }
            // Third record triggered a compaction into the snapshot
            let snapshot = StoreSnapshot::load(&path).await.unwrap();
            assert_eq!(snapshot.participants.len(), 2);
        }

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.participants().await.unwrap().len(), 4);
        assert_eq!(reopened.questions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_leaves_tables_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = MemoryStore::open(&path).await.unwrap();
        store.insert_question(question("q1")).await.unwrap();

        let log_path = {
            let mut journal = store.journal.as_ref().unwrap().lock().await;
            journal.break_log().await.unwrap();
            journal.log_path().to_path_buf()
        };

        let result = store.activate_exclusive("q1", Utc::now(), None).await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(store.active_questions().await.unwrap().is_empty());
        assert_eq!(store.revision().await.unwrap(), 0);

        // Nothing of the failed record reached the log
        drop(store);
        assert!(tokio::fs::read_to_string(&log_path)
            .await
            .unwrap()
            .lines()
            .all(|l| !l.contains("drop_votes")));
        let reopened = MemoryStore::open(&path).await.unwrap();
        assert!(reopened.active_questions().await.unwrap().is_empty());
        assert_eq!(reopened.questions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_correct_option_locked_after_scoring() {
        let store = seeded().await;
        let at = Utc::now();
        store.activate_exclusive("q1", at, None).await.unwrap();
        store
            .close_question("q1", CloseGuard::Manual, Some("a".to_string()))
            .await
            .unwrap();
        store.apply_scores("q1", at, Utc::now(), Vec::new()).await.unwrap();

        let result = store
            .close_question("q1", CloseGuard::Manual, Some("b".to_string()))
            .await;
        assert!(matches!(result, Err(StoreError::AlreadyScored { .. })));
        let q1 = store.question("q1").await.unwrap().unwrap();
        assert_eq!(q1.correct_option.as_deref(), Some("a"));

        let same = store
            .close_question("q1", CloseGuard::Manual, Some("a".to_string()))
            .await
            .unwrap();
        assert!(matches!(same, CloseOutcome::Unchanged(_)));
    }
}
