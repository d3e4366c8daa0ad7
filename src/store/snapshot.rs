//! On-disk snapshot of the store tables.
//!
//! Rewritten when the change log is compacted and read back at startup, so
//! votes and lifecycle state survive a process restart.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::{StoreError, StoreResult};

/// Schema version for snapshot format compatibility
/// Version 1: questions, votes, participants, revision
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Serializable copy of every table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub schema_version: u32,
    /// Questions in creation order
    pub questions: Vec<Question>,
    /// question id -> participant id -> vote
    pub votes: HashMap<QuestionId, HashMap<ParticipantId, Vote>>,
    pub participants: HashMap<ParticipantId, Participant>,
    pub revision: u64,
}

impl StoreSnapshot {
    pub fn empty() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            ..Default::default()
        }
    }

    /// Validate a snapshot before loading it
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(format!(
                "Snapshot schema version {} is newer than supported version {}",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            ));
        }

        let active = self.questions.iter().filter(|q| q.is_active).count();
        if active > 1 {
            return Err(format!("Snapshot has {} active questions", active));
        }

        for (question_id, votes) in &self.votes {
            let question = self
                .questions
                .iter()
                .find(|q| &q.id == question_id)
                .ok_or_else(|| {
                    format!("Votes reference question '{}' which doesn't exist", question_id)
                })?;

            for (participant_id, vote) in votes {
                if &vote.participant_id != participant_id || &vote.question_id != question_id {
                    return Err(format!(
                        "Vote keyed by ({}, {}) has mismatched ids",
                        question_id, participant_id
                    ));
                }
                if !question.has_option(&vote.option) {
                    return Err(format!(
                        "Vote by '{}' on '{}' uses unknown option '{}'",
                        participant_id, question_id, vote.option
                    ));
                }
            }
        }

        Ok(())
    }

    /// Read and validate a snapshot. A missing file yields an empty snapshot.
    pub async fn load(path: &Path) -> StoreResult<Self> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No snapshot at {}, starting empty", path.display());
                return Ok(Self::empty());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Self = serde_json::from_slice(&raw)?;
        snapshot.validate().map_err(StoreError::InvalidSnapshot)?;
        tracing::info!(
            questions = snapshot.questions.len(),
            participants = snapshot.participants.len(),
            revision = snapshot.revision,
            "Loaded snapshot from {}",
            path.display()
        );
        Ok(snapshot)
    }

    /// Write and sync a sibling temp file, then rename it over `path`
    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        let json = serde_json::to_vec(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
