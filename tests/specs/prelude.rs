//! Shared harness: a full server on an ephemeral port with a scripted
//! backend.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use vulcan_backends::{Backend, BackendRegistry, FakeBackend, FakeBehavior};
use vulcan_broker::LogBroker;
use vulcan_core::{IsolationMode, Runtime};
use vulcan_engine::Engine;
use vulcan_server::{router, AppState};
use vulcan_storage::Store;

pub struct TestServer {
    pub base: String,
    pub store: Arc<Store>,
    pub fake: Arc<FakeBackend>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn start(behavior: FakeBehavior) -> Self {
        let fake = Arc::new(
            FakeBackend::new(
                IsolationMode::Isolate,
                vec![Runtime::Node, Runtime::Python, Runtime::Go],
            )
            .behavior(behavior),
        );
        let registry = Arc::new(
            BackendRegistry::builder()
                .register(
                    IsolationMode::Isolate,
                    Arc::clone(&fake) as Arc<dyn Backend>,
                )
                .build(),
        );
        let store = Arc::new(Store::in_memory());
        let broker = Arc::new(LogBroker::new());
        let engine = Engine::new(
            Arc::clone(&store),
            Arc::clone(&broker),
            Arc::clone(&registry),
            "node-0",
        );

        let app = router(AppState {
            engine,
            store: Arc::clone(&store),
            broker,
            registry,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            store,
            fake,
            client: reqwest::Client::new(),
        }
    }

    pub async fn submit_async(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/v1/workloads/async", self.base))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn get_json(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Poll the record until it reaches a terminal status.
    pub async fn poll_terminal(&self, id: &str) -> Value {
        for _ in 0..500 {
            let (status, body) = self.get_json(&format!("/v1/workloads/{id}")).await;
            assert_eq!(status, 200, "poll of {id} failed: {body}");
            let workload_status = body["status"].as_str().unwrap().to_string();
            if matches!(workload_status.as_str(), "completed" | "failed" | "killed") {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("workload {id} never reached a terminal status");
    }
}

/// The behavior behind most scenarios: a short spin-up, three lines, exit 0.
pub fn three_line_script() -> FakeBehavior {
    FakeBehavior::Succeed {
        start_delay: Duration::from_millis(150),
        lines: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        line_delay: Duration::from_millis(20),
        output: b"A\nB\nC\n".to_vec(),
        exit_code: 0,
    }
}
