// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process sandbox backend (`isolate` isolation mode).
//!
//! Stages the payload in a per-run work directory and executes the runtime
//! command directly, streaming stdout and stderr line by line.

use crate::backend::{Backend, BackendError, Capabilities, ExecSpec, LogWriter, WorkloadResult};
use vulcan_wire::stage_payload;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vulcan_core::{IsolationMode, Runtime, WorkloadId};

/// Runs workloads as host processes under per-run work directories.
#[derive(Debug)]
pub struct ProcessBackend {
    work_root: PathBuf,
}

impl ProcessBackend {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
        }
    }

    fn workdir(&self, id: &WorkloadId) -> PathBuf {
        self.work_root.join(id.as_str())
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "process".to_string(),
            supported_runtimes: vec![Runtime::Go, Runtime::Node, Runtime::Python],
            supported_isolations: vec![IsolationMode::Isolate],
            max_concurrency: 8,
        }
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        spec: ExecSpec,
    ) -> Result<WorkloadResult, BackendError> {
        let entrypoint = spec
            .runtime
            .default_entrypoint()
            .ok_or(BackendError::UnsupportedRuntime(spec.runtime))?;
        let (program, args) = spec
            .runtime
            .command(entrypoint)
            .ok_or(BackendError::UnsupportedRuntime(spec.runtime))?;

        let workdir = self.workdir(&spec.workload_id);
        stage_payload(&workdir, &spec.code, entrypoint)?;

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .current_dir(&workdir)
            .envs(&spec.env)
            .stdin(if spec.input.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError::SpawnFailed(format!("{program}: {e}")))?;

        if !spec.input.is_empty() {
            if let Some(mut stdin) = child.stdin.take() {
                let input = spec.input.clone();
                tokio::spawn(async move {
                    let _ = stdin.write_all(input.as_bytes()).await;
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let output = Arc::new(Mutex::new(Vec::new()));
        let stdout_pump = spawn_line_pump(
            child.stdout.take(),
            Arc::clone(&output),
            spec.log_writer.clone(),
        );
        let stderr_pump = spawn_line_pump(
            child.stderr.take(),
            Arc::clone(&output),
            spec.log_writer.clone(),
        );

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| BackendError::Internal(format!("wait failed: {e}")))?
            }
            _ = cancel.cancelled() => {
                debug!(workload_id = %spec.workload_id, "cancelling child process");
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(BackendError::Cancelled);
            }
        };

        // Drain both pumps so the capture is complete before returning.
        let _ = stdout_pump.await;
        let _ = stderr_pump.await;

        let output = output.lock().clone();
        let exit_code = status.code();
        let error = if status.success() {
            None
        } else {
            Some(match exit_code {
                Some(code) => format!("exit status: {code}"),
                None => "terminated by signal".to_string(),
            })
        };

        Ok(WorkloadResult {
            exit_code,
            output,
            error,
        })
    }

    async fn cleanup(&self, workload_id: &WorkloadId) -> Result<(), BackendError> {
        match tokio::fs::remove_dir_all(self.workdir(workload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Forward lines from a child stream to the log writer and capture buffer.
fn spawn_line_pump<R>(
    reader: Option<R>,
    capture: Arc<Mutex<Vec<u8>>>,
    log_writer: LogWriter,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(reader) = reader else { return };
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log_writer(&line);
            let mut capture = capture.lock();
            capture.extend_from_slice(line.as_bytes());
            capture.push(b'\n');
        }
    })
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
