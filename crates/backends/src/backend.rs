// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The backend capability surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use vulcan_core::{IsolationMode, Runtime, WorkloadId};

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unsupported runtime: {0}")]
    UnsupportedRuntime(Runtime),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload error: {0}")]
    Payload(#[from] vulcan_wire::PayloadError),

    #[error("{0}")]
    Internal(String),
}

impl From<vulcan_wire::ProtocolError> for BackendError {
    fn from(e: vulcan_wire::ProtocolError) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Callback invoked once per produced log line, in order.
pub type LogWriter = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything a backend needs to run one workload.
#[derive(Clone)]
pub struct ExecSpec {
    pub workload_id: WorkloadId,
    pub runtime: Runtime,
    pub code: String,
    pub input: String,
    pub env: HashMap<String, String>,
    pub cpu_limit: Option<u32>,
    pub mem_limit_mb: Option<u64>,
    /// Already resolved by the engine (default applied, cap enforced)
    pub timeout_s: u64,
    pub log_writer: LogWriter,
}

impl std::fmt::Debug for ExecSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSpec")
            .field("workload_id", &self.workload_id)
            .field("runtime", &self.runtime)
            .field("code_len", &self.code.len())
            .field("input_len", &self.input.len())
            .field("env_keys", &self.env.len())
            .field("cpu_limit", &self.cpu_limit)
            .field("mem_limit_mb", &self.mem_limit_mb)
            .field("timeout_s", &self.timeout_s)
            .finish()
    }
}

/// Terminal outcome reported by a backend.
///
/// Mirrors the guest response: `error` set means the workload itself
/// failed (non-zero exit, runtime fault) while the backend stayed healthy;
/// transport and infrastructure faults surface as `BackendError` instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadResult {
    pub exit_code: Option<i32>,
    pub output: Vec<u8>,
    pub error: Option<String>,
}

/// Static description of what a backend can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub name: String,
    pub supported_runtimes: Vec<Runtime>,
    pub supported_isolations: Vec<IsolationMode>,
    pub max_concurrency: usize,
}

/// A concrete executor for one isolation mode.
#[async_trait]
pub trait Backend: std::fmt::Debug + Send + Sync + 'static {
    fn capabilities(&self) -> Capabilities;

    /// Run one workload to termination.
    ///
    /// Blocks until the workload terminates or `cancel` fires; on
    /// cancellation it must return promptly with best-effort teardown.
    /// `spec.log_writer` must be invoked once per produced log line, in
    /// order.
    async fn execute(
        &self,
        cancel: CancellationToken,
        spec: ExecSpec,
    ) -> Result<WorkloadResult, BackendError>;

    /// Idempotent resource reclamation after a workload terminates.
    async fn cleanup(&self, _workload_id: &WorkloadId) -> Result<(), BackendError> {
        Ok(())
    }

    /// Pre-registration self-check (binaries present, images readable).
    fn verify(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
