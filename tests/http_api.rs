//! HTTP API tests against a standalone single-node coordinator

use minits::cluster::{ExecuteRequest, RaftNode};
use minits::common::{Config, GroupConfig, MetricsRegistry, NodeConfig};
use minits::coordinator::http::{create_router, CoordState};
use minits::coordinator::standalone_context;
use minits::plan::{InsertRowPlan, Plan, Value};
use minits::{Coordinator, Status, StatusCode};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

fn single_node_config() -> Config {
    let node = NodeConfig {
        id: 1,
        ..Default::default()
    };
    Config {
        node: node.clone(),
        groups: vec![GroupConfig {
            raft_id: 0,
            members: vec![node],
        }],
        ..Default::default()
    }
}

async fn start(config: Config) -> SocketAddr {
    let coordinator = Coordinator::new(
        standalone_context(&config),
        config.coordinator.clone(),
        Arc::new(MetricsRegistry::new()),
    );
    let router = create_router(CoordState { coordinator }, config.server.max_body_bytes);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_insert_row_auto_creates_schema() {
    let addr = start(single_node_config()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/plans", addr))
        .json(&json!({
            "type": "insert_row",
            "device": "root.sg1.d1",
            "time": 1,
            "measurements": ["s1"],
            "values": [1]
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
    let status: Status = response.json().await.unwrap();
    assert_eq!(status, Status::ok());

    let metrics = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("minits_operation_calls_total"));
    assert!(metrics.contains("execute_non_query"));
}

#[tokio::test]
async fn test_plan_without_schema_when_auto_create_disabled() {
    let mut config = single_node_config();
    config.coordinator.enable_auto_create_schema = false;
    let addr = start(config).await;

    let plan = Plan::InsertRow(InsertRowPlan::new(
        "root.sg1.d1",
        1,
        vec!["s1".into()],
        vec![Value::Double(1.5)],
    ));
    let status: Status = reqwest::Client::new()
        .post(format!("http://{}/plans", addr))
        .json(&plan)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(status.is(StatusCode::StorageGroupNotExist));
}

#[tokio::test]
async fn test_batch_with_stray_results_is_rejected() {
    let addr = start(single_node_config()).await;

    let status: Status = reqwest::Client::new()
        .post(format!("http://{}/plans", addr))
        .json(&json!({
            "type": "insert_rows",
            "rows": [
                {"device": "root.sg1.d1", "time": 1, "measurements": ["s1"], "values": [1]},
                {"device": "root.sg1.d2", "time": 1, "measurements": ["s1"], "values": [1]}
            ],
            "results": {
                "0": {"code": 602, "message": "denied"},
                "7": {"code": 602, "message": "denied"}
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(status.is(StatusCode::ExecuteStatementError));
    assert!(status.sub_status.is_none());
}

#[tokio::test]
async fn test_health() {
    let addr = start(single_node_config()).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["groups"], json!([0]));

    let ready: serde_json::Value = client
        .get(format!("http://{}/health/ready", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ready["ready"], true);
    assert_eq!(ready["data_groups"], 1);
}

#[tokio::test]
async fn test_not_ready_without_groups() {
    let config = Config {
        groups: Vec::new(),
        ..single_node_config()
    };
    let addr = start(config).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/health/ready", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_internal_execute_checks_header() {
    let addr = start(single_node_config()).await;
    let client = reqwest::Client::new();
    let header = RaftNode {
        node: (&single_node_config().node).into(),
        raft_id: 0,
    };
    let request = ExecuteRequest {
        header,
        plan: Plan::Flush(Default::default()),
    };

    let response = client
        .post(format!("http://{}/internal/groups/5/execute", addr))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let status: Status = client
        .post(format!("http://{}/internal/groups/0/execute", addr))
        .json(&request)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status, Status::ok());
}
