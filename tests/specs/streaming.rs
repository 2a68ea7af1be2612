//! Live log streaming fused with persisted history.

use crate::prelude::{three_line_script, TestServer};
use futures_util::StreamExt;
use serde_json::json;

/// Read SSE frames until the `done` event or end of stream.
///
/// Returns the `data:` payloads of anonymous frames and whether `done`
/// arrived.
async fn read_sse(response: reqwest::Response) -> (Vec<String>, bool) {
    let mut stream = response.bytes_stream();
    let mut buf = String::new();
    let mut lines = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        buf.push_str(std::str::from_utf8(&chunk).unwrap());

        while let Some(end) = buf.find("\n\n") {
            let frame = buf[..end].to_string();
            buf.drain(..end + 2);

            let mut event_name = None;
            let mut data = None;
            for field in frame.lines() {
                if let Some(rest) = field.strip_prefix("event:") {
                    event_name = Some(rest.trim().to_string());
                } else if let Some(rest) = field.strip_prefix("data:") {
                    data = Some(rest.strip_prefix(' ').unwrap_or(rest).to_string());
                }
                // comment fields (keep-alives) fall through
            }

            if event_name.as_deref() == Some("done") {
                return (lines, true);
            }
            if event_name.is_none() {
                if let Some(data) = data {
                    lines.push(data);
                }
            }
        }
    }
    (lines, false)
}

#[tokio::test]
async fn live_stream_and_history_agree() {
    let server = TestServer::start(three_line_script()).await;

    let accepted: serde_json::Value = server
        .submit_async(json!({"runtime": "node", "code": "print A B C"}))
        .await
        .json()
        .await
        .unwrap();
    let id = accepted["id"].as_str().unwrap();

    // Open the stream while the workload is still spinning up.
    let response = server
        .client
        .get(format!("{}/v1/workloads/{id}/logs", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let (streamed, done) = read_sse(response).await;
    assert!(done, "stream must end with the done event");
    assert_eq!(streamed, vec!["A", "B", "C"]);

    let (status, history) = server
        .get_json(&format!("/v1/workloads/{id}/logs/history"))
        .await;
    assert_eq!(status, 200);

    let persisted: Vec<(u64, String)> = history["lines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| {
            (
                l["seq"].as_u64().unwrap(),
                l["line"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        persisted,
        vec![(0, "A".to_string()), (1, "B".to_string()), (2, "C".to_string())]
    );
}

#[tokio::test]
async fn stream_opened_after_termination_replays_history() {
    let server = TestServer::start(three_line_script()).await;

    let accepted: serde_json::Value = server
        .submit_async(json!({"runtime": "node", "code": "print A B C"}))
        .await
        .json()
        .await
        .unwrap();
    let id = accepted["id"].as_str().unwrap();
    server.poll_terminal(id).await;

    let response = server
        .client
        .get(format!("{}/v1/workloads/{id}/logs", server.base))
        .send()
        .await
        .unwrap();

    let (streamed, done) = read_sse(response).await;
    assert!(done);
    assert_eq!(streamed, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn disconnecting_client_does_not_disturb_other_subscribers() {
    let server = TestServer::start(three_line_script()).await;

    let accepted: serde_json::Value = server
        .submit_async(json!({"runtime": "node", "code": "print A B C"}))
        .await
        .json()
        .await
        .unwrap();
    let id = accepted["id"].as_str().unwrap();

    let keeper = server
        .client
        .get(format!("{}/v1/workloads/{id}/logs", server.base))
        .send()
        .await
        .unwrap();
    let quitter = server
        .client
        .get(format!("{}/v1/workloads/{id}/logs", server.base))
        .send()
        .await
        .unwrap();
    drop(quitter);

    let (streamed, done) = read_sse(keeper).await;
    assert!(done);
    assert_eq!(streamed, vec!["A", "B", "C"]);

    let terminal = server.poll_terminal(id).await;
    assert_eq!(terminal["status"], "completed");
}

#[tokio::test]
async fn unknown_workload_stream_is_404() {
    let server = TestServer::start(three_line_script()).await;

    let response = server
        .client
        .get(format!(
            "{}/v1/workloads/01JUNKJUNKJUNKJUNKJUNKJUNK/logs",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
