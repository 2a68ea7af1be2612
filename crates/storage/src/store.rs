// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transactional row operations over the journal-backed state.
//!
//! All writes serialize through one lock; `transition_status` is the
//! atomic compare-and-set the engine uses to move workloads through the
//! state machine without racing delete/kill paths.

use crate::journal::{Journal, JournalError};
use crate::state::{Mutation, StoreState};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use vulcan_core::{valid_transition, LogLine, Workload, WorkloadId, WorkloadStatus};

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workload not found: {0}")]
    NotFound(WorkloadId),

    #[error("workload id collision: {0}")]
    IdCollision(WorkloadId),

    #[error("workload {id} must be inserted as pending (got {status})")]
    InsertNotPending { id: WorkloadId, status: WorkloadStatus },

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: WorkloadId,
        from: WorkloadStatus,
        to: WorkloadStatus,
    },

    #[error("status conflict for {id}: expected {expected}, found {actual}")]
    StatusConflict {
        id: WorkloadId,
        expected: WorkloadStatus,
        actual: WorkloadStatus,
    },

    #[error("log line conflict for {id}: seq {seq} not after {last}")]
    LogConflict { id: WorkloadId, seq: u64, last: u64 },

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}

impl StoreError {
    /// True for errors in the `conflict` taxonomy bucket (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::IdCollision(_)
                | Self::InsertNotPending { .. }
                | Self::InvalidTransition { .. }
                | Self::StatusConflict { .. }
                | Self::LogConflict { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Field updates applied atomically with a status transition.
#[derive(Debug, Default, Clone)]
pub struct TransitionPatch {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub output: Option<Vec<u8>>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

/// Aggregate workload statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_isolation: BTreeMap<String, usize>,
    pub avg_duration_ms: f64,
}

struct Inner {
    state: StoreState,
    journal: Option<Journal>,
}

impl Inner {
    /// Commit a validated mutation: journal first, then materialize.
    fn commit(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&mutation)?;
        }
        self.state.apply(&mutation);
        Ok(())
    }
}

/// Journal-backed workload store.
pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    /// Open a durable store, replaying and compacting the journal.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let (mut journal, mutations) = Journal::open(path)?;

        let mut state = StoreState::default();
        for mutation in &mutations {
            state.apply(mutation);
        }

        journal.rewrite(&state.compaction_mutations())?;

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                journal: Some(journal),
            }),
        })
    }

    /// Open an ephemeral store with no journal (tests, `:memory:`).
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: StoreState::default(),
                journal: None,
            }),
        }
    }

    /// Create a pending row. Fails on id collision or a non-pending row.
    pub fn insert_workload(&self, row: Workload) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        if row.status != WorkloadStatus::Pending {
            return Err(StoreError::InsertNotPending {
                id: row.id.clone(),
                status: row.status,
            });
        }
        if inner.state.workloads.contains_key(&row.id) {
            return Err(StoreError::IdCollision(row.id));
        }

        inner.commit(Mutation::WorkloadInserted { row })
    }

    pub fn get_workload(&self, id: &WorkloadId) -> Result<Workload, StoreError> {
        let inner = self.inner.lock();
        inner
            .state
            .workloads
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// List workloads ordered `created_at desc` (id desc tiebreak — ids are
    /// time-ordered), optionally filtered on status.
    ///
    /// Returns the page and the total count of the filtered set.
    pub fn list_workloads(
        &self,
        limit: usize,
        offset: usize,
        filter: Option<WorkloadStatus>,
    ) -> (Vec<Workload>, usize) {
        let inner = self.inner.lock();

        let mut rows: Vec<Workload> = inner
            .state
            .workloads
            .values()
            .filter(|w| filter.map_or(true, |f| w.status == f))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = rows.len();
        let page = rows.into_iter().skip(offset).take(limit).collect();
        (page, total)
    }

    /// Full-row replacement. Rejects illegal (old → new) status pairs.
    pub fn update_workload(&self, row: Workload) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        let current = inner
            .state
            .workloads
            .get(&row.id)
            .ok_or_else(|| StoreError::NotFound(row.id.clone()))?;

        if current.status != row.status && !valid_transition(current.status, row.status) {
            return Err(StoreError::InvalidTransition {
                id: row.id.clone(),
                from: current.status,
                to: row.status,
            });
        }

        inner.commit(Mutation::WorkloadUpdated { row })
    }

    /// Atomic compare-and-set status transition.
    ///
    /// Fails with `StatusConflict` if the current status is not
    /// `expect_from`, and with `InvalidTransition` if the pair is illegal.
    /// Returns the updated row.
    pub fn transition_status(
        &self,
        id: &WorkloadId,
        expect_from: WorkloadStatus,
        to: WorkloadStatus,
        patch: TransitionPatch,
    ) -> Result<Workload, StoreError> {
        let mut inner = self.inner.lock();

        let current = inner
            .state
            .workloads
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if current.status != expect_from {
            return Err(StoreError::StatusConflict {
                id: id.clone(),
                expected: expect_from,
                actual: current.status,
            });
        }
        if !valid_transition(expect_from, to) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: expect_from,
                to,
            });
        }

        let mut row = current.clone();
        row.status = to;
        if let Some(v) = patch.started_at {
            row.started_at = Some(v);
        }
        if let Some(v) = patch.finished_at {
            row.finished_at = Some(v);
        }
        if let Some(v) = patch.duration_ms {
            row.duration_ms = Some(v);
        }
        if let Some(v) = patch.output {
            row.output = v;
        }
        if let Some(v) = patch.exit_code {
            row.exit_code = Some(v);
        }
        if let Some(v) = patch.error {
            row.error = Some(v);
        }

        inner.commit(Mutation::WorkloadUpdated { row: row.clone() })?;
        Ok(row)
    }

    /// Append one log line. `seq` must extend the workload's history.
    pub fn insert_log_line(
        &self,
        workload_id: &WorkloadId,
        seq: u64,
        line: &str,
        created_at: DateTime<Utc>,
    ) -> Result<LogLine, StoreError> {
        let mut inner = self.inner.lock();

        if !inner.state.workloads.contains_key(workload_id) {
            return Err(StoreError::NotFound(workload_id.clone()));
        }

        if let Some(last) = inner
            .state
            .logs
            .get(workload_id)
            .and_then(|lines| lines.last())
        {
            if seq <= last.seq {
                return Err(StoreError::LogConflict {
                    id: workload_id.clone(),
                    seq,
                    last: last.seq,
                });
            }
        }

        let log_line = LogLine {
            id: inner.state.next_log_id,
            workload_id: workload_id.clone(),
            seq,
            line: line.to_string(),
            created_at,
        };

        inner.commit(Mutation::LogAppended {
            line: log_line.clone(),
        })?;
        Ok(log_line)
    }

    /// Ordered log history for a workload.
    pub fn get_log_lines(&self, workload_id: &WorkloadId) -> Result<Vec<LogLine>, StoreError> {
        let inner = self.inner.lock();

        if !inner.state.workloads.contains_key(workload_id) {
            return Err(StoreError::NotFound(workload_id.clone()));
        }
        Ok(inner.state.logs.get(workload_id).cloned().unwrap_or_default())
    }

    /// Remove a workload row and its log history, returning the prior row.
    pub fn delete_workload(&self, id: &WorkloadId) -> Result<Workload, StoreError> {
        let mut inner = self.inner.lock();

        let prior = inner
            .state
            .workloads
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        inner.commit(Mutation::WorkloadDeleted { id: id.clone() })?;
        Ok(prior)
    }

    /// Aggregate counts and average terminal duration.
    pub fn stats(&self) -> WorkloadStats {
        let inner = self.inner.lock();

        let mut stats = WorkloadStats {
            total: inner.state.workloads.len(),
            ..Default::default()
        };

        let mut duration_sum = 0u64;
        let mut duration_count = 0usize;

        for row in inner.state.workloads.values() {
            *stats
                .by_status
                .entry(row.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_isolation
                .entry(row.isolation.as_str().to_string())
                .or_default() += 1;
            if let Some(d) = row.duration_ms {
                duration_sum += d;
                duration_count += 1;
            }
        }

        if duration_count > 0 {
            stats.avg_duration_ms = duration_sum as f64 / duration_count as f64;
        }
        stats
    }

    /// Fsync the journal (durability point for tests and shutdown).
    pub fn sync(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(journal) = inner.journal.as_mut() {
            journal.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
