//! ---
//! fl_section: "15-testing-qa-runbook"
//! fl_subsection: "integration-tests"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "End-to-end chaos scenarios over the HTTP and WebSocket surface."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::sync::Arc;
use std::time::Duration;

use faultline_common::config::AppConfig;
use faultline_core::orchestrator::{RuntimeHandle, SimulationRuntime};
use faultline_net::{spawn_api_server, ApiServer, ApiState};
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

struct Stack {
    runtime: RuntimeHandle,
    server: ApiServer,
    client: Client,
}

impl Stack {
    async fn start() -> Self {
        let mut config = AppConfig::default();
        config.predictor.enabled = false;
        config.simulation.random_seed = Some(11);
        // Keep drift out of the way so metric assertions are exact.
        config.simulation.tick_interval = Duration::from_secs(3600);

        let runtime = SimulationRuntime::new(config, None).start().await.unwrap();
        let state = Arc::new(ApiState::new(
            runtime.registry(),
            runtime.broadcaster(),
            runtime.chaos(),
            runtime.advisor(),
        ));
        let server = spawn_api_server(state, "127.0.0.1:0".parse().unwrap(), None).unwrap();
        Self {
            runtime,
            server,
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.server.addr())
    }

    async fn services(&self) -> Value {
        self.client
            .get(self.url("/api/services"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn inject(&self, target: &str, fault: &str, duration: u64) -> reqwest::StatusCode {
        self.client
            .post(self.url("/api/chaos/inject"))
            .json(&json!({
                "target_service": target,
                "chaos_type": fault,
                "duration": duration
            }))
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn stop(self) {
        self.server.shutdown().await.unwrap();
        self.runtime.shutdown().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cpu_spike_expires_back_to_baseline() {
    let stack = Stack::start().await;
    let before = stack.services().await;
    let cpu_before = before["database"]["cpu"].as_f64().unwrap();
    let latency_before = before["database"]["latency"].as_u64().unwrap();

    assert!(stack.inject("database", "cpu_spike", 1).await.is_success());
    let faulted = stack.services().await;
    let database = &faulted["database"];
    assert_eq!(database["cpu"].as_f64().unwrap(), (cpu_before + 30.0).min(95.0));
    assert_eq!(database["latency"].as_u64().unwrap(), latency_before + 200);
    assert_eq!(database["active_chaos"]["type"], "cpu_spike");
    assert_eq!(database["active_chaos"]["duration"], 1);
    let start = database["active_chaos"]["started_at"].as_i64().unwrap();
    let end = database["active_chaos"]["end_time"].as_i64().unwrap();
    assert_eq!(end, start + 1);

    let recovered = timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = stack.services().await;
            if snapshot["database"].get("active_chaos").is_none() {
                return snapshot;
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();
    let database = &recovered["database"];
    let cpu = database["cpu"].as_f64().unwrap();
    assert!((30.0..45.0).contains(&cpu), "cpu {cpu} outside baseline");
    let latency = database["latency"].as_u64().unwrap();
    assert!((100..200).contains(&latency), "latency {latency} outside baseline");
    assert_eq!(database["status"], "healthy");

    stack.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn root_kill_cascades_and_reset_restores() {
    let stack = Stack::start().await;

    assert!(stack.inject("database", "service_kill", 120).await.is_success());
    let snapshot = stack.services().await;
    for (id, service) in snapshot.as_object().unwrap() {
        assert_eq!(service["status"], "down", "{id} should be down");
        assert_eq!(service["availability"].as_f64().unwrap(), 0.0);
        assert_eq!(service["error_rate"].as_f64().unwrap(), 100.0);
    }
    assert_eq!(snapshot["database"]["latency"], 9999);
    assert!(snapshot["api-gateway"].get("active_chaos").is_none());

    let prediction: Value = stack
        .client
        .get(stack.url("/api/predict"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prediction["risk_level"], "critical");
    assert_eq!(prediction["model_version"], "fallback_v1");

    stack
        .client
        .post(stack.url("/api/reset"))
        .send()
        .await
        .unwrap();
    let snapshot = stack.services().await;
    for (id, service) in snapshot.as_object().unwrap() {
        assert_eq!(service["status"], "healthy", "{id} should be healthy");
        assert!(service.get("active_chaos").is_none());
    }

    stack.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_target_leaves_registry_untouched() {
    let stack = Stack::start().await;
    let before = stack.services().await;

    assert_eq!(
        stack.inject("payments", "service_kill", 10).await,
        reqwest::StatusCode::NOT_FOUND
    );
    assert_eq!(stack.services().await, before);

    stack.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_starts_with_current_snapshot() {
    let stack = Stack::start().await;
    let expected = stack
        .client
        .get(stack.url("/api/services"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let url = format!("ws://{}/ws", stack.server.addr());
    let (mut socket, _response) = connect_async(&url).await.unwrap();
    let first = timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match first {
        Message::Text(text) => assert_eq!(text, expected),
        other => panic!("expected text frame, got {other:?}"),
    }

    assert!(stack.inject("auth-service", "memory_leak", 60).await.is_success());
    let update = timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let update: Value = match update {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    };
    assert_eq!(update["auth-service"]["active_chaos"]["type"], "memory_leak");
    assert_eq!(update["user-service"]["status"], "healthy");

    drop(socket);
    stack.stop().await;
}
