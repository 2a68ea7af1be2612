// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized row state built from journal replay.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vulcan_core::{LogLine, Workload, WorkloadId};

/// A single row mutation, the unit of journal persistence.
///
/// Mutations are facts about committed writes: validation happens in the
/// store before a mutation is journaled, so replay applies them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    WorkloadInserted { row: Workload },
    WorkloadUpdated { row: Workload },
    WorkloadDeleted { id: WorkloadId },
    LogAppended { line: LogLine },
}

/// In-memory rows: workloads plus per-workload ordered log lines.
#[derive(Debug, Default, Clone)]
pub struct StoreState {
    pub workloads: HashMap<WorkloadId, Workload>,
    /// Lines per workload, in seq order (seq is the vector index).
    pub logs: HashMap<WorkloadId, Vec<LogLine>>,
    /// Next global autoincrement id for log lines.
    pub next_log_id: u64,
}

impl StoreState {
    /// Apply a committed mutation.
    pub fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::WorkloadInserted { row } | Mutation::WorkloadUpdated { row } => {
                self.workloads.insert(row.id.clone(), row.clone());
            }
            Mutation::WorkloadDeleted { id } => {
                self.workloads.remove(id);
                self.logs.remove(id);
            }
            Mutation::LogAppended { line } => {
                self.next_log_id = self.next_log_id.max(line.id + 1);
                self.logs
                    .entry(line.workload_id.clone())
                    .or_default()
                    .push(line.clone());
            }
        }
    }

    /// Rebuild the minimal mutation sequence reproducing this state,
    /// for journal compaction on open. Rows are emitted in id order so
    /// compaction output is deterministic.
    pub fn compaction_mutations(&self) -> Vec<Mutation> {
        let mut ids: Vec<&WorkloadId> = self.workloads.keys().collect();
        ids.sort();

        let mut out = Vec::new();
        for id in ids {
            if let Some(row) = self.workloads.get(id) {
                out.push(Mutation::WorkloadInserted { row: row.clone() });
            }
            if let Some(lines) = self.logs.get(id) {
                for line in lines {
                    out.push(Mutation::LogAppended { line: line.clone() });
                }
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
