// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL mutation journal.
//!
//! Each committed store write is one line of JSON:
//! `{"seq":N,"mutation":{...}}\n`. On open the journal is scanned and the
//! valid prefix replayed; a corrupt tail is rotated to `.bak` so startup
//! never wedges on a torn write.

use crate::state::Mutation;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialization helper for writing entries without cloning the mutation.
#[derive(Serialize)]
struct JournalRecordRef<'a> {
    seq: u64,
    mutation: &'a Mutation,
}

/// Deserialization helper for reading entries.
#[derive(Deserialize)]
struct JournalRecord {
    seq: u64,
    mutation: Mutation,
}

/// Append-only mutation journal backing the store.
pub struct Journal {
    file: File,
    path: PathBuf,
    /// Next sequence number to assign
    write_seq: u64,
}

impl Journal {
    /// Open or create a journal, returning it together with the replayable
    /// mutation prefix.
    ///
    /// A parse failure partway through rotates the damaged file to `.bak`
    /// and rewrites a clean journal holding only the valid prefix.
    pub fn open(path: &Path) -> Result<(Self, Vec<Mutation>), JournalError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (records, corrupt) = Self::read_valid_records(&file)?;

        if corrupt {
            drop(file);

            let bak_path = rotate_bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak_path.display(),
                valid_entries = records.len(),
                "Corrupt journal detected, rotating to .bak and preserving valid entries",
            );
            std::fs::rename(path, &bak_path)?;

            let mut journal = Self {
                file: OpenOptions::new()
                    .create(true)
                    .read(true)
                    .append(true)
                    .open(path)?,
                path: path.to_owned(),
                write_seq: 0,
            };
            for record in &records {
                journal.append(&record.mutation)?;
            }
            journal.file.sync_all()?;

            let mutations = records.into_iter().map(|r| r.mutation).collect();
            return Ok((journal, mutations));
        }

        let write_seq = records.last().map(|r| r.seq).unwrap_or(0);
        let mutations = records.into_iter().map(|r| r.mutation).collect();

        Ok((
            Self {
                file,
                path: path.to_owned(),
                write_seq,
            },
            mutations,
        ))
    }

    /// Read all parseable records, stopping at the first corrupt entry.
    ///
    /// Returns the valid prefix and whether a corrupt tail was found.
    fn read_valid_records(file: &File) -> Result<(Vec<JournalRecord>, bool), JournalError> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut records = Vec::new();
        let mut saw_content_after_valid = false;
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    saw_content_after_valid = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JournalRecord>(trimmed) {
                Ok(r) => records.push(r),
                Err(_) => {
                    saw_content_after_valid = true;
                    break;
                }
            }
        }

        Ok((records, saw_content_after_valid))
    }

    /// Append a mutation and flush it to the OS.
    ///
    /// Returns the assigned sequence number. Store writes are row-granular,
    /// so each append is written out immediately rather than group-committed.
    pub fn append(&mut self, mutation: &Mutation) -> Result<u64, JournalError> {
        self.write_seq += 1;
        let seq = self.write_seq;
        let record = JournalRecordRef { seq, mutation };
        let mut json_bytes = serde_json::to_vec(&record)?;
        json_bytes.push(b'\n');
        self.file.write_all(&json_bytes)?;
        Ok(seq)
    }

    /// Make all appended entries durable with a single fsync.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Replace the journal contents with a fresh mutation sequence.
    ///
    /// Used for compaction on open: the replayed state is rewritten as an
    /// insert-shaped prefix so the file does not grow without bound across
    /// restarts. Writes to a temp file and renames atomically.
    pub fn rewrite(&mut self, mutations: &[Mutation]) -> Result<(), JournalError> {
        let tmp_path = self.path.with_extension("tmp");

        {
            let mut tmp_file = File::create(&tmp_path)?;
            for (i, mutation) in mutations.iter().enumerate() {
                let record = JournalRecordRef {
                    seq: (i + 1) as u64,
                    mutation,
                };
                let mut json_bytes = serde_json::to_vec(&record)?;
                json_bytes.push(b'\n');
                tmp_file.write_all(&json_bytes)?;
            }
            tmp_file.sync_all()?;
        }

        std::fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        self.write_seq = mutations.len() as u64;

        Ok(())
    }

    /// Current write sequence number.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }
}

/// Pick a non-clobbering `.bak` path for a damaged journal.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let base = path.with_extension("bak");
    if !base.exists() {
        return base;
    }
    for i in 1..100 {
        let candidate = path.with_extension(format!("bak.{i}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    base
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
