// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::ExecSpec;
use std::collections::HashMap;
use vulcan_core::{IsolationMode, Runtime, WorkloadId};

fn spec(runtime: Runtime) -> ExecSpec {
    ExecSpec {
        workload_id: WorkloadId::generate(),
        runtime,
        code: "code".to_string(),
        input: String::new(),
        env: HashMap::new(),
        cpu_limit: None,
        mem_limit_mb: None,
        timeout_s: 30,
        log_writer: Arc::new(|_| {}),
    }
}

#[test]
fn capabilities_cover_file_runtimes_only() {
    let backend = ProcessBackend::new("/tmp/vulcan-test");
    let caps = backend.capabilities();

    assert_eq!(caps.name, "process");
    assert_eq!(
        caps.supported_runtimes,
        vec![Runtime::Go, Runtime::Node, Runtime::Python]
    );
    assert_eq!(caps.supported_isolations, vec![IsolationMode::Isolate]);
    assert!(caps.max_concurrency > 0);
}

#[tokio::test]
async fn wasm_is_rejected_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ProcessBackend::new(dir.path());

    let err = backend
        .execute(CancellationToken::new(), spec(Runtime::Wasm))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::UnsupportedRuntime(Runtime::Wasm)));
}

#[tokio::test]
async fn cleanup_removes_the_work_directory_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ProcessBackend::new(dir.path());
    let id = WorkloadId::generate();

    let workdir = dir.path().join(id.as_str());
    std::fs::create_dir_all(&workdir).unwrap();
    std::fs::write(workdir.join("main.py"), "x").unwrap();

    backend.cleanup(&id).await.unwrap();
    assert!(!workdir.exists());

    // Second cleanup is a no-op
    backend.cleanup(&id).await.unwrap();
}

#[tokio::test]
async fn line_pump_forwards_and_captures() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let lines_seen = Arc::new(Mutex::new(Vec::new()));

    let writer_lines = Arc::clone(&lines_seen);
    let log_writer: LogWriter = Arc::new(move |line| {
        writer_lines.lock().push(line.to_string());
    });

    let reader = std::io::Cursor::new(b"first\nsecond\n".to_vec());
    spawn_line_pump(Some(reader), Arc::clone(&captured), log_writer)
        .await
        .unwrap();

    assert_eq!(*lines_seen.lock(), vec!["first", "second"]);
    assert_eq!(captured.lock().as_slice(), b"first\nsecond\n");
}

#[tokio::test]
async fn line_pump_handles_missing_stream() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let log_writer: LogWriter = Arc::new(|_| {});

    spawn_line_pump(
        None::<std::io::Cursor<Vec<u8>>>,
        Arc::clone(&captured),
        log_writer,
    )
    .await
    .unwrap();

    assert!(captured.lock().is_empty());
}
