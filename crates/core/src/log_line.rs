// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted log line record.

use crate::id::WorkloadId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of workload log history.
///
/// `seq` is 0-based per workload and strictly monotonic in insertion order;
/// lines are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Store-assigned row id (autoincrement across all workloads)
    pub id: u64,
    pub workload_id: WorkloadId,
    pub seq: u64,
    pub line: String,
    pub created_at: DateTime<Utc>,
}
