// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request and response bodies.
//!
//! Timestamps render as RFC-3339 UTC; `output` crosses the wire base64
//! encoded.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vulcan_backends::Capabilities;
use vulcan_core::{IsolationMode, LogLine, Runtime, Workload, WorkloadId, WorkloadStatus};
use vulcan_engine::SubmitRequest;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkloadRequest {
    pub runtime: Runtime,
    #[serde(default)]
    pub isolation: Option<IsolationMode>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub resources: Option<Resources>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub mem_mb: Option<u64>,
    #[serde(default)]
    pub timeout_s: Option<u64>,
}

impl CreateWorkloadRequest {
    /// Lower into the engine's request shape, defaulting isolation to auto.
    pub fn into_submit(self) -> SubmitRequest {
        let resources = self.resources.unwrap_or_default();
        SubmitRequest {
            runtime: self.runtime,
            isolation: self.isolation.unwrap_or(IsolationMode::Auto),
            code: self.code.unwrap_or_default(),
            input: self.input.unwrap_or_default(),
            env: self.env.unwrap_or_default(),
            cpus: resources.cpus,
            mem_mb: resources.mem_mb,
            timeout_s: resources.timeout_s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadBody {
    pub id: WorkloadId,
    pub status: WorkloadStatus,
    pub isolation: IsolationMode,
    pub runtime: Runtime,
    pub node_id: String,
    pub input_hash: String,
    /// Base64 of the raw output bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
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

impl From<Workload> for WorkloadBody {
    fn from(w: Workload) -> Self {
        let output = (!w.output.is_empty())
            .then(|| base64::engine::general_purpose::STANDARD.encode(&w.output));
        Self {
            id: w.id,
            status: w.status,
            isolation: w.isolation,
            runtime: w.runtime,
            node_id: w.node_id,
            input_hash: w.input_hash,
            output,
            exit_code: w.exit_code,
            error: w.error,
            cpu_limit: w.cpu_limit,
            mem_limit_mb: w.mem_limit_mb,
            timeout_s: w.timeout_s,
            duration_ms: w.duration_ms,
            created_at: w.created_at,
            started_at: w.started_at,
            finished_at: w.finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadListResponse {
    pub workloads: Vec<WorkloadBody>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLineBody {
    pub seq: u64,
    pub line: String,
    pub created_at: DateTime<Utc>,
}

impl From<LogLine> for LogLineBody {
    fn from(l: LogLine) -> Self {
        Self {
            seq: l.seq,
            line: l.line,
            created_at: l.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogHistoryResponse {
    pub workload_id: WorkloadId,
    pub lines: Vec<LogLineBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendBody {
    pub name: String,
    pub capabilities: Capabilities,
}

impl From<Capabilities> for BackendBody {
    fn from(capabilities: Capabilities) -> Self {
        Self {
            name: capabilities.name.clone(),
            capabilities,
        }
    }
}

#[cfg(test)]
#[path = "dto_tests.rs"]
mod tests;
