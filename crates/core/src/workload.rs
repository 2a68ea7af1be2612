// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workload record and status state machine.

use crate::id::WorkloadId;
use crate::runtime::Runtime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    /// Accepted, waiting for a backend slot
    Pending,
    /// Backend is executing
    Running,
    /// Terminated normally
    Completed,
    /// Terminated with an error
    Failed,
    /// Cancelled by timeout or explicit kill
    Killed,
}

impl WorkloadStatus {
    /// Check if this status is terminal (absorbing).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Killed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Killed => "killed",
        }
    }

    /// Parse a wire name (used for the list filter query parameter).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "killed" => Some(Self::Killed),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns true if a status change from `from` to `to` is legal.
///
/// The only legal transitions are `pending → running | failed | killed` and
/// `running → completed | failed | killed`. Terminal statuses are absorbing.
/// The store consults this on every status update.
pub fn valid_transition(from: WorkloadStatus, to: WorkloadStatus) -> bool {
    use WorkloadStatus::*;
    matches!(
        (from, to),
        (Pending, Running | Failed | Killed) | (Running, Completed | Failed | Killed)
    )
}

/// Sandbox category a workload runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// KVM-based microVM
    Microvm,
    /// Process sandbox
    Isolate,
    /// User-space kernel
    Gvisor,
    /// Resolved by the registry at submit time; never persisted
    Auto,
}

impl IsolationMode {
    /// Deterministic preference order for `auto` resolution,
    /// strongest isolation first.
    pub const AUTO_PRIORITY: [IsolationMode; 3] = [Self::Microvm, Self::Isolate, Self::Gvisor];

    /// True for every mode except `auto`.
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Self::Auto)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Microvm => "microvm",
            Self::Isolate => "isolate",
            Self::Gvisor => "gvisor",
            Self::Auto => "auto",
        }
    }
}

impl std::fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable record of a single workload submission.
///
/// Field invariants (enforced by the store and engine together):
/// - `started_at` is set iff the record has ever been running or beyond
/// - `finished_at` and `duration_ms` are set iff the status is terminal
/// - non-empty `output` implies completed or failed
/// - `isolation` is always concrete, never `auto`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    pub status: WorkloadStatus,
    pub isolation: IsolationMode,
    pub runtime: Runtime,
    pub node_id: String,
    /// Fingerprint of the request code+input, for dedup and telemetry
    pub input_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_limit_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Workload {
    /// Build the pending-row shape for a freshly accepted submission.
    ///
    /// `isolation` must already be resolved to a concrete mode.
    pub fn pending(
        id: WorkloadId,
        runtime: Runtime,
        isolation: IsolationMode,
        node_id: impl Into<String>,
        input_hash: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: WorkloadStatus::Pending,
            isolation,
            runtime,
            node_id: node_id.into(),
            input_hash: input_hash.into(),
            output: Vec::new(),
            exit_code: None,
            error: None,
            cpu_limit: None,
            mem_limit_mb: None,
            timeout_s: None,
            duration_ms: None,
            created_at,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "workload_tests.rs"]
mod tests;
