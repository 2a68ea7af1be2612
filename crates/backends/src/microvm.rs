// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MicroVM host driver (`microvm` isolation mode).
//!
//! Per execute call: stage a rootfs from the template, boot the hypervisor
//! with a generated config file, dial the guest agent over the host-side
//! vsock Unix socket, write one framed request, pump log frames until the
//! result frame arrives, and always tear the VM down on exit.

use crate::backend::{Backend, BackendError, Capabilities, ExecSpec, WorkloadResult};
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vulcan_core::{IsolationMode, Runtime, WorkloadId};
use vulcan_wire::{GuestMessage, GuestRequest};

/// Vsock port the guest agent listens on.
pub const GUEST_PORT: u32 = 52;

/// How long to keep probing the guest socket after boot.
const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Host-side configuration for the microVM backend.
#[derive(Debug, Clone)]
pub struct MicrovmConfig {
    /// Firecracker-compatible hypervisor binary
    pub hypervisor_bin: PathBuf,
    /// Uncompressed kernel image booted into every VM
    pub kernel_image: PathBuf,
    /// Rootfs image template containing the guest agent as init
    pub rootfs_template: PathBuf,
    /// Staging directory for per-run rootfs copies and sockets
    pub work_root: PathBuf,
    pub guest_port: u32,
    pub boot_timeout: Duration,
}

impl MicrovmConfig {
    pub fn new(
        hypervisor_bin: impl Into<PathBuf>,
        kernel_image: impl Into<PathBuf>,
        rootfs_template: impl Into<PathBuf>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hypervisor_bin: hypervisor_bin.into(),
            kernel_image: kernel_image.into(),
            rootfs_template: rootfs_template.into(),
            work_root: work_root.into(),
            guest_port: GUEST_PORT,
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
        }
    }
}

/// Boots one microVM per workload and speaks the guest protocol to it.
#[derive(Debug)]
pub struct MicrovmBackend {
    config: MicrovmConfig,
}

impl MicrovmBackend {
    pub fn new(config: MicrovmConfig) -> Self {
        Self { config }
    }

    fn run_dir(&self, id: &WorkloadId) -> PathBuf {
        self.config.work_root.join(id.as_str())
    }

    /// Hypervisor config file contents for one run.
    fn vm_config(&self, spec: &ExecSpec, rootfs: &Path, vsock_uds: &Path) -> serde_json::Value {
        json!({
            "boot-source": {
                "kernel_image_path": self.config.kernel_image,
                "boot_args": "console=ttyS0 reboot=k panic=1 pci=off init=/usr/bin/vulcan-guest",
            },
            "drives": [{
                "drive_id": "rootfs",
                "path_on_host": rootfs,
                "is_root_device": true,
                "is_read_only": false,
            }],
            "machine-config": {
                "vcpu_count": spec.cpu_limit.unwrap_or(1),
                "mem_size_mib": spec.mem_limit_mb.unwrap_or(256),
            },
            "vsock": {
                "guest_cid": 3,
                "uds_path": vsock_uds,
            },
        })
    }

    /// Run the guest conversation: one request out, log frames in until the
    /// result frame terminates the stream.
    async fn converse(&self, vsock_uds: &Path, spec: &ExecSpec) -> Result<WorkloadResult, BackendError> {
        let mut stream =
            dial_vsock(vsock_uds, self.config.guest_port, self.config.boot_timeout).await?;

        let request = GuestRequest {
            runtime: spec.runtime,
            code: spec.code.clone(),
            entrypoint: None,
            env: spec.env.clone(),
            input: spec.input.clone(),
            timeout_s: Some(spec.timeout_s),
        };
        let payload = vulcan_wire::encode(&request)?;
        vulcan_wire::write_message(&mut stream, &payload).await?;

        loop {
            let bytes = vulcan_wire::read_message(&mut stream).await?;
            match vulcan_wire::decode::<GuestMessage>(&bytes)? {
                GuestMessage::Log { line } => (spec.log_writer)(&line),
                GuestMessage::Result { response } => {
                    return Ok(WorkloadResult {
                        exit_code: Some(response.exit_code),
                        output: response.output.into_bytes(),
                        error: (!response.error.is_empty()).then_some(response.error),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Backend for MicrovmBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "microvm".to_string(),
            supported_runtimes: vec![Runtime::Go, Runtime::Node, Runtime::Python],
            supported_isolations: vec![IsolationMode::Microvm],
            max_concurrency: 4,
        }
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        spec: ExecSpec,
    ) -> Result<WorkloadResult, BackendError> {
        let run_dir = self.run_dir(&spec.workload_id);
        tokio::fs::create_dir_all(&run_dir).await?;

        let rootfs = run_dir.join("rootfs.ext4");
        tokio::fs::copy(&self.config.rootfs_template, &rootfs).await?;

        let vsock_uds = run_dir.join("vsock.sock");
        let config_path = run_dir.join("vm.json");
        let vm_config = self.vm_config(&spec, &rootfs, &vsock_uds);
        let config_bytes = serde_json::to_vec_pretty(&vm_config)
            .map_err(|e| BackendError::Internal(format!("vm config: {e}")))?;
        tokio::fs::write(&config_path, config_bytes).await?;

        debug!(workload_id = %spec.workload_id, "booting microVM");
        let child = Command::new(&self.config.hypervisor_bin)
            .arg("--no-api")
            .arg("--config-file")
            .arg(&config_path)
            .current_dir(&run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::SpawnFailed(format!("hypervisor: {e}")))?;
        let vm = Vm { child, run_dir };

        let result = tokio::select! {
            r = self.converse(&vsock_uds, &spec) => r,
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
        };

        vm.shutdown().await;
        result
    }

    async fn cleanup(&self, workload_id: &WorkloadId) -> Result<(), BackendError> {
        match tokio::fs::remove_dir_all(self.run_dir(workload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn verify(&self) -> Result<(), BackendError> {
        for (what, path) in [
            ("hypervisor binary", &self.config.hypervisor_bin),
            ("kernel image", &self.config.kernel_image),
            ("rootfs template", &self.config.rootfs_template),
        ] {
            if !path.exists() {
                return Err(BackendError::Internal(format!(
                    "{what} not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// A booted hypervisor child plus its staging directory.
struct Vm {
    child: Child,
    run_dir: PathBuf,
}

impl Vm {
    /// Kill the hypervisor and remove the staged rootfs. Best-effort.
    async fn shutdown(mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!(error = %e, "hypervisor kill failed");
        }
        let _ = self.child.wait().await;
        let _ = tokio::fs::remove_dir_all(&self.run_dir).await;
    }
}

/// Dial the guest vsock through the hypervisor's host-side Unix socket,
/// retrying until the guest listener is up or `boot_timeout` expires.
async fn dial_vsock(
    uds: &Path,
    port: u32,
    boot_timeout: Duration,
) -> Result<UnixStream, BackendError> {
    let deadline = tokio::time::Instant::now() + boot_timeout;
    loop {
        match try_dial(uds, port).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(BackendError::Transport(format!(
                        "guest did not become ready: {e}"
                    )));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// One host-initiated dial: `CONNECT <port>\n` out, `OK <assigned>\n` back,
/// after which the stream is wired through to the guest listener.
async fn try_dial(uds: &Path, port: u32) -> Result<UnixStream, std::io::Error> {
    let mut stream = UnixStream::connect(uds).await?;
    stream
        .write_all(format!("CONNECT {port}\n").as_bytes())
        .await?;

    let mut ack = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "vsock handshake closed",
            ));
        }
        if byte[0] == b'\n' {
            break;
        }
        ack.push(byte[0]);
        if ack.len() > 64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "oversized vsock handshake",
            ));
        }
    }

    if connect_ack_ok(&String::from_utf8_lossy(&ack)) {
        Ok(stream)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("vsock handshake rejected: {}", String::from_utf8_lossy(&ack)),
        ))
    }
}

/// The hypervisor acknowledges a host-initiated dial with `OK <port>`.
fn connect_ack_ok(line: &str) -> bool {
    let line = line.trim();
    line == "OK" || line.starts_with("OK ")
}

#[cfg(test)]
#[path = "microvm_tests.rs"]
mod tests;
