//! Store-level invariants observed through a full lifecycle.

use crate::prelude::{three_line_script, TestServer};
use serde_json::json;
use vulcan_core::{valid_transition, WorkloadStatus};
use vulcan_storage::{Store, StoreError, TransitionPatch};

#[tokio::test]
async fn store_rejects_pending_to_completed() {
    let store = Store::in_memory();
    let row = vulcan_core::Workload::pending(
        vulcan_core::WorkloadId::generate(),
        vulcan_core::Runtime::Node,
        vulcan_core::IsolationMode::Isolate,
        "node-0",
        "hash",
        chrono::Utc::now(),
    );
    let id = row.id.clone();
    store.insert_workload(row).unwrap();

    let err = store
        .transition_status(
            &id,
            WorkloadStatus::Pending,
            WorkloadStatus::Completed,
            TransitionPatch::default(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    // Row unchanged
    assert_eq!(
        store.get_workload(&id).unwrap().status,
        WorkloadStatus::Pending
    );
}

#[tokio::test]
async fn terminal_rows_satisfy_time_and_seq_invariants() {
    let server = TestServer::start(three_line_script()).await;

    let accepted: serde_json::Value = server
        .submit_async(json!({"runtime": "python", "code": "three lines"}))
        .await
        .json()
        .await
        .unwrap();
    let id = accepted["id"].as_str().unwrap();
    server.poll_terminal(id).await;

    let (rows, _) = server.store.list_workloads(10, 0, None);
    for row in &rows {
        // started/finished/duration line up with status
        if row.started_at.is_none() {
            assert_eq!(row.status, WorkloadStatus::Pending);
        }
        match row.finished_at {
            None => assert!(matches!(
                row.status,
                WorkloadStatus::Pending | WorkloadStatus::Running
            )),
            Some(finished) => {
                let started = row.started_at.expect("terminal row started");
                let elapsed = (finished - started).num_milliseconds().max(0) as u64;
                let recorded = row.duration_ms.expect("terminal row duration");
                // same clock reads, so exact agreement
                assert_eq!(recorded, elapsed);
            }
        }

        // no persisted auto
        assert!(row.isolation.is_concrete());

        // output only on completed/failed
        if !row.output.is_empty() {
            assert!(matches!(
                row.status,
                WorkloadStatus::Completed | WorkloadStatus::Failed
            ));
        }

        // log history is the gapless prefix 0..N-1
        let lines = server.store.get_log_lines(&row.id).unwrap();
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line.seq, i as u64);
        }
    }
}

#[test]
fn every_status_write_pairs_validate() {
    // The transition predicate is what the store enforces; spot-check the
    // whole matrix agrees with the absorbing-terminal rule.
    use WorkloadStatus::*;
    for from in [Pending, Running, Completed, Failed, Killed] {
        for to in [Pending, Running, Completed, Failed, Killed] {
            let legal = valid_transition(from, to);
            if from.is_terminal() {
                assert!(!legal, "{from} -> {to} must be rejected");
            }
            if legal {
                assert!(!matches!(to, Pending), "nothing transitions back to pending");
            }
        }
    }
}
