// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake backend for deterministic testing
#![allow(clippy::panic)]

use crate::backend::{Backend, BackendError, Capabilities, ExecSpec, WorkloadResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vulcan_core::{IsolationMode, Runtime, WorkloadId};

/// Scripted behavior for one `execute` call.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Stream `lines` then succeed.
    Succeed {
        start_delay: Duration,
        lines: Vec<String>,
        line_delay: Duration,
        output: Vec<u8>,
        exit_code: i32,
    },
    /// Stream `lines` then report a workload failure (non-zero exit).
    FailWorkload {
        lines: Vec<String>,
        exit_code: i32,
        error: String,
    },
    /// Return a backend fault.
    FailBackend { message: String },
    /// Block until cancelled.
    Hang,
    /// Panic inside execute (worker-recovery tests).
    Panic { message: String },
}

impl FakeBehavior {
    /// Succeed immediately, echoing `lines` both to the log writer and as
    /// the combined output.
    pub fn echo(lines: &[&str]) -> Self {
        let output = lines
            .iter()
            .map(|l| format!("{l}\n"))
            .collect::<String>()
            .into_bytes();
        Self::Succeed {
            start_delay: Duration::ZERO,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            line_delay: Duration::ZERO,
            output,
            exit_code: 0,
        }
    }
}

/// Fake backend for testing
///
/// Streams scripted lines, returns scripted results, and records every
/// spec and cleanup it receives.
#[derive(Debug)]
pub struct FakeBackend {
    name: String,
    isolation: IsolationMode,
    runtimes: Vec<Runtime>,
    max_concurrency: usize,
    behavior: Mutex<FakeBehavior>,
    specs: Mutex<Vec<ExecSpec>>,
    cleanups: Mutex<Vec<WorkloadId>>,
}

impl FakeBackend {
    pub fn new(isolation: IsolationMode, runtimes: Vec<Runtime>) -> Self {
        Self {
            name: format!("fake-{isolation}"),
            isolation,
            runtimes,
            max_concurrency: 4,
            behavior: Mutex::new(FakeBehavior::echo(&[])),
            specs: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn behavior(self, behavior: FakeBehavior) -> Self {
        *self.behavior.lock() = behavior;
        self
    }

    /// Swap the scripted behavior for subsequent execute calls.
    pub fn set_behavior(&self, behavior: FakeBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Every spec received by `execute`, in call order.
    pub fn executed_specs(&self) -> Vec<ExecSpec> {
        self.specs.lock().clone()
    }

    /// Every workload id passed to `cleanup`, in call order.
    pub fn cleanups(&self) -> Vec<WorkloadId> {
        self.cleanups.lock().clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: self.name.clone(),
            supported_runtimes: self.runtimes.clone(),
            supported_isolations: vec![self.isolation],
            max_concurrency: self.max_concurrency,
        }
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        spec: ExecSpec,
    ) -> Result<WorkloadResult, BackendError> {
        self.specs.lock().push(spec.clone());
        let behavior = self.behavior.lock().clone();

        let scripted = async {
            match behavior {
                FakeBehavior::Succeed {
                    start_delay,
                    lines,
                    line_delay,
                    output,
                    exit_code,
                } => {
                    tokio::time::sleep(start_delay).await;
                    for line in &lines {
                        (spec.log_writer)(line);
                        tokio::time::sleep(line_delay).await;
                    }
                    Ok(WorkloadResult {
                        exit_code: Some(exit_code),
                        output,
                        error: None,
                    })
                }
                FakeBehavior::FailWorkload {
                    lines,
                    exit_code,
                    error,
                } => {
                    for line in &lines {
                        (spec.log_writer)(line);
                    }
                    Ok(WorkloadResult {
                        exit_code: Some(exit_code),
                        output: Vec::new(),
                        error: Some(error),
                    })
                }
                FakeBehavior::FailBackend { message } => Err(BackendError::Internal(message)),
                FakeBehavior::Hang => {
                    // Held open until the select arm below observes the
                    // cancellation; pending() never resolves on its own.
                    std::future::pending::<()>().await;
                    Err(BackendError::Internal("unreachable".to_string()))
                }
                FakeBehavior::Panic { message } => panic!("{message}"),
            }
        };

        tokio::select! {
            result = scripted => result,
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
        }
    }

    async fn cleanup(&self, workload_id: &WorkloadId) -> Result<(), BackendError> {
        self.cleanups.lock().push(workload_id.clone());
        Ok(())
    }
}
