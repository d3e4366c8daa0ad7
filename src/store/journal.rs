//! Append-only change log behind a persisted `MemoryStore`.
//!
//! Each committed mutation is one JSON line listing the rows it wrote. On
//! open the last snapshot is loaded, the log is replayed over it, and the
//! result is folded back into a fresh snapshot. Every entry sets a row to an
//! absolute value, so replaying records a snapshot already contains yields
//! the same tables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::snapshot::StoreSnapshot;
use super::{StoreError, StoreResult};
use crate::types::*;

/// Records appended before the log is folded into the snapshot
pub const COMPACT_AFTER: usize = 1000;

/// One row-level change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    PutQuestion { question: Question },
    PutVote { vote: Vote },
    DropVotes { question_id: QuestionId },
    PutParticipant { participant: Participant },
    /// Drop every vote and participant
    ClearSession,
    Revision { revision: u64 },
}

impl JournalEntry {
    pub fn apply(self, tables: &mut StoreSnapshot) {
        match self {
            JournalEntry::PutQuestion { question } => {
                match tables.questions.iter_mut().find(|q| q.id == question.id) {
                    Some(existing) => *existing = question,
                    None => tables.questions.push(question),
                }
            }
            JournalEntry::PutVote { vote } => {
                tables
                    .votes
                    .entry(vote.question_id.clone())
                    .or_default()
                    .insert(vote.participant_id.clone(), vote);
            }
            JournalEntry::DropVotes { question_id } => {
                tables.votes.remove(&question_id);
            }
            JournalEntry::PutParticipant { participant } => {
                tables
                    .participants
                    .insert(participant.id.clone(), participant);
            }
            JournalEntry::ClearSession => {
                tables.votes.clear();
                tables.participants.clear();
            }
            JournalEntry::Revision { revision } => tables.revision = revision,
        }
    }
}

fn log_path_for(snapshot_path: &Path) -> PathBuf {
    let mut path = snapshot_path.as_os_str().to_owned();
    path.push(".log");
    PathBuf::from(path)
}

/// Apply every complete record in the log at `path`; returns how many
async fn replay(path: &Path, tables: &mut StoreSnapshot) -> StoreResult<usize> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut applied = 0;
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<Vec<JournalEntry>>(line) {
            Ok(entries) => {
                for entry in entries {
                    entry.apply(tables);
                }
                applied += 1;
            }
            // A crash mid-append leaves an unterminated last line
            Err(e) if i + 1 == lines.len() && !raw.ends_with('\n') => {
                tracing::warn!(
                    "Ignoring torn record at the end of {}: {}",
                    path.display(),
                    e
                );
            }
            Err(e) => {
                return Err(StoreError::InvalidSnapshot(format!(
                    "Journal record {} in {} is unreadable: {}",
                    i + 1,
                    path.display(),
                    e
                )))
            }
        }
    }
    Ok(applied)
}

pub struct Journal {
    snapshot_path: PathBuf,
    log_path: PathBuf,
    log: File,
    /// Length of the log after the last complete record
    len: u64,
    pending: usize,
    compact_after: usize,
}

impl Journal {
    /// Restore tables from the snapshot at `path` plus its log
    pub async fn open(path: &Path, compact_after: usize) -> StoreResult<(Self, StoreSnapshot)> {
        let snapshot_path = path.to_path_buf();
        let log_path = log_path_for(path);

        let mut tables = StoreSnapshot::load(&snapshot_path).await?;
        let replayed = replay(&log_path, &mut tables).await?;
        tables.validate().map_err(StoreError::InvalidSnapshot)?;

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;
        let len = log.metadata().await?.len();

        let mut journal = Self {
            snapshot_path,
            log_path,
            log,
            len,
            pending: replayed,
            compact_after: compact_after.max(1),
        };
        if replayed > 0 {
            tracing::info!(
                "Replayed {} records from {}",
                replayed,
                journal.log_path.display()
            );
        }
        // Also drops a torn tail so later appends start on a clean line
        if replayed > 0 || len > 0 {
            journal.compact(&tables).await?;
        }
        Ok((journal, tables))
    }

    /// Durably append the entries of one mutation as a single record
    pub async fn append(&mut self, entries: &[JournalEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut line = serde_json::to_vec(entries)?;
        line.push(b'\n');

        if let Err(e) = self.write_record(&line).await {
            // Cut off whatever part of the record made it to disk
            if let Err(trim) = self.log.set_len(self.len).await {
                tracing::warn!("Failed to trim {}: {}", self.log_path.display(), trim);
            }
            return Err(e);
        }
        self.len += line.len() as u64;
        self.pending += 1;
        Ok(())
    }

    async fn write_record(&mut self, line: &[u8]) -> StoreResult<()> {
        self.log.write_all(line).await?;
        self.log.flush().await?;
        self.log.sync_data().await?;
        Ok(())
    }

    pub fn needs_compaction(&self) -> bool {
        self.pending >= self.compact_after
    }

    /// Write `tables` as the new snapshot and empty the log
    pub async fn compact(&mut self, tables: &StoreSnapshot) -> StoreResult<()> {
        tables.save(&self.snapshot_path).await?;
        self.log.set_len(0).await?;
        self.log.sync_all().await?;
        tracing::debug!(
            "Folded {} records into {}",
            self.pending,
            self.snapshot_path.display()
        );
        self.len = 0;
        self.pending = 0;
        Ok(())
    }

    #[cfg(test)]
    pub(super) fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Swap the log handle for a read-only one so appends fail
    #[cfg(test)]
    pub(super) async fn break_log(&mut self) -> StoreResult<()> {
        self.log = File::open(&self.log_path).await?;
        Ok(())
    }
}
