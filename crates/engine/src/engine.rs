// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submission intake and the per-workload worker procedure.

use crate::error::EngineError;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vulcan_backends::{
    Backend, BackendError, BackendRegistry, ExecSpec, LogWriter, WorkloadResult,
};
use vulcan_broker::LogBroker;
use vulcan_core::{IsolationMode, Runtime, Workload, WorkloadId, WorkloadStatus};
use vulcan_storage::{Store, StoreError, TransitionPatch};

/// Applied when a submission omits `timeout_s` (or asks for zero).
pub const DEFAULT_TIMEOUT_S: u64 = 30;

/// Hard ceiling on any workload deadline.
pub const MAX_TIMEOUT_S: u64 = 300;

/// Window between topic close and topic delete, letting late stream
/// readers observe the close event. Also the unwind budget granted to a
/// cancelled backend.
const GRACE: Duration = Duration::from_secs(2);

/// One accepted submission, as the engine consumes it.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub runtime: Runtime,
    pub isolation: IsolationMode,
    pub code: String,
    pub input: String,
    pub env: HashMap<String, String>,
    pub cpus: Option<u32>,
    pub mem_mb: Option<u64>,
    pub timeout_s: Option<u64>,
}

/// Cancellation and completion handles for one live worker.
#[derive(Clone)]
struct WorkerHandle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

struct EngineInner {
    store: Arc<Store>,
    broker: Arc<LogBroker>,
    registry: Arc<BackendRegistry>,
    node_id: String,
    /// Per-isolation concurrency caps, sized from backend capabilities.
    semaphores: HashMap<IsolationMode, Arc<Semaphore>>,
    workers: Mutex<HashMap<WorkloadId, WorkerHandle>>,
}

/// The workload lifecycle engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        broker: Arc<LogBroker>,
        registry: Arc<BackendRegistry>,
        node_id: impl Into<String>,
    ) -> Self {
        let mut semaphores = HashMap::new();
        for mode in IsolationMode::AUTO_PRIORITY {
            if let Some(backend) = registry.lookup(mode) {
                let cap = backend.capabilities().max_concurrency.max(1);
                semaphores.insert(mode, Arc::new(Semaphore::new(cap)));
            }
        }

        Self {
            inner: Arc::new(EngineInner {
                store,
                broker,
                registry,
                node_id: node_id.into(),
                semaphores,
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Accept a submission: validate, route, persist the pending row, and
    /// hand off to a background worker. Returns the pending record.
    ///
    /// Never blocks on a backend; rejection is synchronous.
    pub fn submit_async(&self, request: SubmitRequest) -> Result<Workload, EngineError> {
        if request.code.is_empty() {
            return Err(EngineError::Validation("code must not be empty".to_string()));
        }

        let (mode, backend) = self
            .inner
            .registry
            .resolve(request.isolation, request.runtime)?;

        let id = WorkloadId::generate();
        let hash = input_hash(request.runtime, mode, &request.code, &request.input);

        let mut row = Workload::pending(
            id.clone(),
            request.runtime,
            mode,
            self.inner.node_id.clone(),
            hash,
            Utc::now(),
        );
        row.cpu_limit = request.cpus;
        row.mem_limit_mb = request.mem_mb;
        row.timeout_s = request.timeout_s;

        self.inner.store.insert_workload(row.clone())?;
        self.inner.broker.create(&id);

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.inner.workers.lock().insert(
            id.clone(),
            WorkerHandle {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        info!(workload_id = %id, runtime = %request.runtime, isolation = %mode, "workload accepted");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_worker(
            inner, id, mode, backend, request, cancel, done_tx,
        ));

        Ok(row)
    }

    /// Submit and wait for a terminal record.
    ///
    /// The wait is bounded by the workload deadline plus grace; on expiry
    /// the workload is killed, persists as `killed`, and `SyncTimeout` is
    /// returned.
    pub async fn submit_sync(&self, request: SubmitRequest) -> Result<Workload, EngineError> {
        let timeout_s = resolve_timeout(request.timeout_s);
        let row = self.submit_async(request)?;
        let id = row.id.clone();

        let done = self.inner.workers.lock().get(&id).map(|h| h.done.clone());
        let Some(mut done) = done else {
            return Ok(self.inner.store.get_workload(&id)?);
        };

        let wait = Duration::from_secs(timeout_s) + GRACE;
        let terminal = tokio::time::timeout(wait, async {
            loop {
                if *done.borrow_and_update() {
                    return;
                }
                if done.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;

        match terminal {
            Ok(()) => {
                let row = self.inner.store.get_workload(&id)?;
                // A deadline kill is still a timeout from the caller's
                // perspective; the killed row stays behind.
                let timed_out = row.status == WorkloadStatus::Killed
                    && row
                        .error
                        .as_deref()
                        .map_or(false, |e| e.starts_with("timeout after"));
                if timed_out {
                    return Err(EngineError::SyncTimeout { id });
                }
                Ok(row)
            }
            Err(_elapsed) => {
                let _ = self.kill(&id).await;
                Err(EngineError::SyncTimeout { id })
            }
        }
    }

    /// Cooperatively cancel a workload.
    ///
    /// Terminal workloads are a no-op returning the current record;
    /// pending and running workloads reach `killed` within the grace
    /// window.
    pub async fn kill(&self, id: &WorkloadId) -> Result<Workload, EngineError> {
        let row = self.inner.store.get_workload(id)?;
        if row.is_terminal() {
            return Ok(row);
        }

        let handle = self.inner.workers.lock().get(id).cloned();
        match handle {
            Some(handle) => {
                handle.cancel.cancel();

                let mut done = handle.done;
                let _ = tokio::time::timeout(GRACE * 2, async {
                    loop {
                        if *done.borrow_and_update() {
                            return;
                        }
                        if done.changed().await.is_err() {
                            return;
                        }
                    }
                })
                .await;

                Ok(self.inner.store.get_workload(id)?)
            }
            None => {
                // No live worker (lost during an earlier fault); force the
                // terminal state directly.
                let patch = TransitionPatch {
                    finished_at: Some(Utc::now()),
                    duration_ms: Some(elapsed_ms(&row)),
                    error: Some("killed".to_string()),
                    ..Default::default()
                };
                match self
                    .inner
                    .store
                    .transition_status(id, row.status, WorkloadStatus::Killed, patch)
                {
                    Ok(row) => Ok(row),
                    Err(StoreError::StatusConflict { .. }) => {
                        Ok(self.inner.store.get_workload(id)?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Remove a workload row, cancelling any live worker. Returns the
    /// prior row.
    pub fn delete(&self, id: &WorkloadId) -> Result<Workload, EngineError> {
        if let Some(handle) = self.inner.workers.lock().get(id) {
            handle.cancel.cancel();
        }
        Ok(self.inner.store.delete_workload(id)?)
    }
}

/// Deterministic fingerprint of a submission's executable identity.
fn input_hash(runtime: Runtime, isolation: IsolationMode, code: &str, input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(runtime.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(isolation.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(code.as_bytes());
    hasher.update([0]);
    hasher.update(input.as_bytes());

    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn resolve_timeout(timeout_s: Option<u64>) -> u64 {
    match timeout_s {
        None | Some(0) => DEFAULT_TIMEOUT_S,
        Some(t) => t.min(MAX_TIMEOUT_S),
    }
}

fn elapsed_ms(row: &Workload) -> u64 {
    row.started_at
        .map(|s| (Utc::now() - s).num_milliseconds().max(0) as u64)
        .unwrap_or(0)
}

/// How one execution ended, before classification.
enum Outcome {
    Finished(Result<WorkloadResult, BackendError>),
    Panicked(String),
    Deadline,
    Killed,
}

/// The worker procedure: one task per accepted workload.
async fn run_worker(
    inner: Arc<EngineInner>,
    id: WorkloadId,
    mode: IsolationMode,
    backend: Arc<dyn Backend>,
    request: SubmitRequest,
    cancel: CancellationToken,
    done_tx: watch::Sender<bool>,
) {
    worker_procedure(&inner, &id, mode, backend, request, &cancel).await;

    inner.workers.lock().remove(&id);
    let _ = done_tx.send(true);
}

async fn worker_procedure(
    inner: &Arc<EngineInner>,
    id: &WorkloadId,
    mode: IsolationMode,
    backend: Arc<dyn Backend>,
    request: SubmitRequest,
    cancel: &CancellationToken,
) {
    // Acquire the backend slot; the workload stays pending while queued.
    let _permit = match inner.semaphores.get(&mode) {
        Some(semaphore) => {
            tokio::select! {
                permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
                _ = cancel.cancelled() => {
                    finish_before_running(inner, id).await;
                    return;
                }
            }
        }
        None => None,
    };

    let started = Utc::now();
    let running = inner.store.transition_status(
        id,
        WorkloadStatus::Pending,
        WorkloadStatus::Running,
        TransitionPatch {
            started_at: Some(started),
            ..Default::default()
        },
    );
    if let Err(e) = running {
        // Deleted or killed while queued; nothing to run.
        debug!(workload_id = %id, error = %e, "worker aborting before start");
        close_topic(inner, id);
        return;
    }

    let timeout_s = resolve_timeout(request.timeout_s);

    // Dual-write log sink: durable history through the store (best-effort),
    // live fan-out through the broker. The worker-local counter is the
    // single source of seq.
    let seq = Arc::new(AtomicU64::new(0));
    let log_writer: LogWriter = {
        let store = Arc::clone(&inner.store);
        let broker = Arc::clone(&inner.broker);
        let id = id.clone();
        let seq = Arc::clone(&seq);
        Arc::new(move |line: &str| {
            let n = seq.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = store.insert_log_line(&id, n, line, Utc::now()) {
                warn!(workload_id = %id, seq = n, error = %e, "log persist failed, line dropped from history");
            }
            broker.publish(&id, n, line);
        })
    };

    let spec = ExecSpec {
        workload_id: id.clone(),
        runtime: request.runtime,
        code: request.code,
        input: request.input,
        env: request.env,
        cpu_limit: request.cpus,
        mem_limit_mb: request.mem_mb,
        timeout_s,
        log_writer,
    };

    // Execution runs on its own task so a panicking backend is recovered
    // here instead of tearing the worker down.
    let exec_cancel = cancel.child_token();
    let mut exec = {
        let exec_cancel = exec_cancel.clone();
        let backend = Arc::clone(&backend);
        tokio::spawn(async move { backend.execute(exec_cancel, spec).await })
    };

    let outcome = tokio::select! {
        joined = &mut exec => match joined {
            Ok(result) => Outcome::Finished(result),
            Err(e) if e.is_panic() => Outcome::Panicked(panic_message(e)),
            Err(_) => Outcome::Panicked("execution task aborted".to_string()),
        },
        _ = tokio::time::sleep(Duration::from_secs(timeout_s)) => {
            exec_cancel.cancel();
            let _ = tokio::time::timeout(GRACE, &mut exec).await;
            Outcome::Deadline
        },
        _ = cancel.cancelled() => {
            let _ = tokio::time::timeout(GRACE, &mut exec).await;
            Outcome::Killed
        },
    };

    let finished = Utc::now();
    let duration_ms = (finished - started).num_milliseconds().max(0) as u64;
    let base = TransitionPatch {
        finished_at: Some(finished),
        duration_ms: Some(duration_ms),
        ..Default::default()
    };

    let (to, patch) = match outcome {
        Outcome::Deadline => (
            WorkloadStatus::Killed,
            TransitionPatch {
                error: Some(format!("timeout after {timeout_s}s")),
                ..base
            },
        ),
        Outcome::Killed | Outcome::Finished(Err(BackendError::Cancelled)) => (
            WorkloadStatus::Killed,
            TransitionPatch {
                error: Some("killed".to_string()),
                ..base
            },
        ),
        Outcome::Panicked(message) => (
            WorkloadStatus::Failed,
            TransitionPatch {
                exit_code: Some(1),
                error: Some(format!("worker panic: {message}")),
                ..base
            },
        ),
        Outcome::Finished(Err(e)) => (
            WorkloadStatus::Failed,
            TransitionPatch {
                exit_code: Some(1),
                error: Some(e.to_string()),
                ..base
            },
        ),
        Outcome::Finished(Ok(result)) => match result.error {
            None => (
                WorkloadStatus::Completed,
                TransitionPatch {
                    exit_code: Some(result.exit_code.unwrap_or(0)),
                    output: Some(result.output),
                    ..base
                },
            ),
            Some(message) => (
                WorkloadStatus::Failed,
                TransitionPatch {
                    exit_code: Some(result.exit_code.unwrap_or(1)),
                    output: Some(result.output),
                    error: Some(message),
                    ..base
                },
            ),
        },
    };

    match inner
        .store
        .transition_status(id, WorkloadStatus::Running, to, patch)
    {
        Ok(row) => {
            info!(workload_id = %id, status = %row.status, duration_ms, "workload terminal");
        }
        Err(e) => {
            // Deleted mid-flight; the log topic still needs closing.
            debug!(workload_id = %id, error = %e, "terminal persist skipped");
        }
    }

    close_topic(inner, id);

    if let Err(e) = backend.cleanup(id).await {
        warn!(workload_id = %id, error = %e, "backend cleanup failed");
    }
}

/// Terminal path for a workload cancelled before it ever ran.
async fn finish_before_running(inner: &Arc<EngineInner>, id: &WorkloadId) {
    let patch = TransitionPatch {
        finished_at: Some(Utc::now()),
        duration_ms: Some(0),
        error: Some("killed".to_string()),
        ..Default::default()
    };
    match inner
        .store
        .transition_status(id, WorkloadStatus::Pending, WorkloadStatus::Killed, patch)
    {
        Ok(_) => info!(workload_id = %id, "workload killed while pending"),
        Err(e) => debug!(workload_id = %id, error = %e, "pending kill persist skipped"),
    }
    close_topic(inner, id);
}

/// Close the topic now and release it after the grace window.
fn close_topic(inner: &Arc<EngineInner>, id: &WorkloadId) {
    inner.broker.close(id);

    let broker = Arc::clone(&inner.broker);
    let id = id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(GRACE).await;
        broker.delete(&id);
    });
}

fn panic_message(e: tokio::task::JoinError) -> String {
    match e.try_into_panic() {
        Ok(panic) => {
            if let Some(s) = panic.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "opaque panic payload".to_string()
            }
        }
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
