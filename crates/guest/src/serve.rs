// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection workload execution.
//!
//! Each connection carries exactly one framed request. The runtime command
//! runs with the work directory as cwd and the request env overlaid; stdout
//! and stderr are drained concurrently line by line, each line leaving as a
//! `log` frame before the terminating `result` frame.

use parking_lot::Mutex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};
use vulcan_wire::{
    decode, encode, read_message, stage_payload, write_message, GuestMessage, GuestRequest,
    GuestResponse, ProtocolError,
};

/// Work directory, removed and recreated per request.
pub const WORKDIR: &str = "/tmp/workload";

/// Applied when the request omits a timeout (or asks for zero).
const DEFAULT_TIMEOUT_S: u64 = 30;

/// Serve one connection: read a request, execute it, stream logs, send the
/// result, done.
pub async fn serve_conn<S>(stream: S, workdir: &Path) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, writer) = tokio::io::split(stream);

    let request: GuestRequest = {
        let bytes = read_message(&mut reader).await?;
        decode(&bytes)?
    };
    debug!(runtime = %request.runtime, "request received");

    // One mutex around the write half so log frames never interleave.
    let writer = tokio::sync::Mutex::new(writer);

    let response = run_request(&request, workdir, &writer).await;

    let payload = encode(&GuestMessage::Result { response })?;
    let mut w = writer.lock().await;
    write_message(&mut *w, &payload).await?;
    Ok(())
}

/// Execute the request and assemble the terminal response.
///
/// Infrastructure failures (unknown runtime, payload staging, spawn) come
/// back as error results with `exit_code = 1`; the connection itself stays
/// healthy for the result frame.
async fn run_request<W>(
    request: &GuestRequest,
    workdir: &Path,
    writer: &tokio::sync::Mutex<W>,
) -> GuestResponse
where
    W: AsyncWrite + Unpin,
{
    let Some(default_entrypoint) = request.runtime.default_entrypoint() else {
        return error_response(format!("unknown runtime: {}", request.runtime));
    };
    let entrypoint = request.entrypoint.as_deref().unwrap_or(default_entrypoint);
    let Some((program, args)) = request.runtime.command(entrypoint) else {
        return error_response(format!("unknown runtime: {}", request.runtime));
    };

    if let Err(e) = stage_payload(workdir, &request.code, entrypoint) {
        return error_response(format!("payload: {e}"));
    }

    let timeout_s = match request.timeout_s {
        None | Some(0) => DEFAULT_TIMEOUT_S,
        Some(t) => t,
    };

    let mut cmd = Command::new(program);
    cmd.args(&args)
        .current_dir(workdir)
        .envs(&request.env)
        .stdin(if request.input.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return error_response(format!("spawn {program}: {e}")),
    };

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let capture = Mutex::new(String::new());

    let feed_stdin = async {
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(request.input.as_bytes()).await {
                warn!("stdin write failed: {e}");
            }
            let _ = stdin.shutdown().await;
        }
    };

    let run = async {
        let (status, (), (), ()) = tokio::join!(
            child.wait(),
            pump_lines(stdout, writer, &capture),
            pump_lines(stderr, writer, &capture),
            feed_stdin,
        );
        status
    };

    match tokio::time::timeout(Duration::from_secs(timeout_s), run).await {
        Err(_elapsed) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            GuestResponse {
                exit_code: 1,
                output: capture.into_inner(),
                error: format!("timeout after {timeout_s}s"),
            }
        }
        Ok(Err(e)) => GuestResponse {
            exit_code: 1,
            output: capture.into_inner(),
            error: format!("wait failed: {e}"),
        },
        Ok(Ok(status)) => {
            let exit_code = status.code().unwrap_or(1);
            let error = if status.success() {
                String::new()
            } else {
                match status.code() {
                    Some(code) => format!("exit status: {code}"),
                    None => "terminated by signal".to_string(),
                }
            };
            GuestResponse {
                exit_code,
                output: capture.into_inner(),
                error,
            }
        }
    }
}

/// Drain one child stream line by line, sending each as a log frame and
/// appending to the combined capture.
async fn pump_lines<R, W>(
    reader: Option<R>,
    writer: &tokio::sync::Mutex<W>,
    capture: &Mutex<String>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(reader) = reader else { return };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        send_log(writer, &line).await;
        let mut capture = capture.lock();
        capture.push_str(&line);
        capture.push('\n');
    }
}

/// Best-effort log frame; a dropped connection must not kill the workload.
async fn send_log<W>(writer: &tokio::sync::Mutex<W>, line: &str)
where
    W: AsyncWrite + Unpin,
{
    let Ok(payload) = encode(&GuestMessage::Log {
        line: line.to_string(),
    }) else {
        return;
    };
    let mut w = writer.lock().await;
    if let Err(e) = write_message(&mut *w, &payload).await {
        warn!("log frame dropped: {e}");
    }
}

fn error_response(error: String) -> GuestResponse {
    GuestResponse {
        exit_code: 1,
        output: String::new(),
        error,
    }
}

#[cfg(test)]
#[path = "serve_tests.rs"]
mod tests;
