//! Submit-to-terminal scenarios over the HTTP surface.

use crate::prelude::{three_line_script, TestServer};
use base64::Engine as _;
use serde_json::json;
use std::time::Duration;
use vulcan_backends::FakeBehavior;

#[tokio::test]
async fn async_submit_completes_with_output_logs_and_duration() {
    let server = TestServer::start(FakeBehavior::Succeed {
        start_delay: Duration::from_millis(30),
        lines: vec!["hi".to_string()],
        line_delay: Duration::ZERO,
        output: b"hi\n".to_vec(),
        exit_code: 0,
    })
    .await;

    let response = server
        .submit_async(json!({"runtime": "node", "code": "console.log('hi')"}))
        .await;
    assert_eq!(response.status(), 202);
    let accepted: serde_json::Value = response.json().await.unwrap();
    assert_eq!(accepted["status"], "pending");

    let id = accepted["id"].as_str().unwrap();
    let terminal = server.poll_terminal(id).await;

    assert_eq!(terminal["status"], "completed");
    assert_eq!(terminal["exit_code"], 0);
    assert!(terminal["duration_ms"].as_u64().unwrap() > 0);

    let output = base64::engine::general_purpose::STANDARD
        .decode(terminal["output"].as_str().unwrap())
        .unwrap();
    assert!(String::from_utf8(output).unwrap().contains("hi"));

    let (status, history) = server
        .get_json(&format!("/v1/workloads/{id}/logs/history"))
        .await;
    assert_eq!(status, 200);
    assert!(!history["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn runaway_workload_is_killed_after_its_timeout() {
    let server = TestServer::start(FakeBehavior::Hang).await;

    let response = server
        .submit_async(json!({
            "runtime": "node",
            "code": "while(true){}",
            "resources": {"timeout_s": 1}
        }))
        .await;
    assert_eq!(response.status(), 202);
    let accepted: serde_json::Value = response.json().await.unwrap();

    let terminal = server.poll_terminal(accepted["id"].as_str().unwrap()).await;
    assert_eq!(terminal["status"], "killed");
    assert!(
        terminal["error"].as_str().unwrap().starts_with("timeout after"),
        "{terminal}"
    );
    assert!(terminal["exit_code"].is_null());
}

#[tokio::test]
async fn unsupported_pair_is_rejected_without_a_row() {
    let server = TestServer::start(three_line_script()).await;

    let response = server
        .submit_async(json!({"runtime": "wasm", "isolation": "isolate", "code": "x"}))
        .await;
    assert_eq!(response.status(), 422);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unsupported"));

    assert_eq!(server.store.list_workloads(10, 0, None).1, 0);
    assert!(server.fake.executed_specs().is_empty());
}

#[tokio::test]
async fn delete_before_running_returns_the_pending_row() {
    // A hanging workload occupies the only slot so the second submission
    // stays pending.
    let server = TestServer::start(FakeBehavior::Hang).await;

    server
        .submit_async(json!({"runtime": "node", "code": "spin"}))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The fake backend has capacity 4; saturate it so the target workload
    // cannot start.
    for _ in 0..3 {
        server
            .submit_async(json!({"runtime": "node", "code": "spin"}))
            .await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let target: serde_json::Value = server
        .submit_async(json!({"runtime": "node", "code": "queued"}))
        .await
        .json()
        .await
        .unwrap();
    let id = target["id"].as_str().unwrap();

    let response = server
        .client
        .delete(format!("{}/v1/workloads/{id}", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let prior: serde_json::Value = response.json().await.unwrap();
    assert_eq!(prior["status"], "pending");

    let (status, _) = server.get_json(&format!("/v1/workloads/{id}")).await;
    assert_eq!(status, 404);
}
