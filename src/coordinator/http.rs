//! HTTP API for the coordinator
//!
//! - `POST /plans`: client entry point, a JSON plan in, a JSON status out
//! - `POST /internal/groups/:raft_id/execute`: sub-plans forwarded by peers
//! - `POST /membership`: propagate a committed membership change
//! - `GET /health`, `GET /health/ready`, `GET /metrics`

use crate::cluster::ExecuteRequest;
use crate::common::tracing_middleware::request_id_middleware;
use crate::common::{timestamp_now, Status, StatusCode as TsStatusCode};
use crate::coordinator::Coordinator;
use crate::plan::{MembershipChangeLog, Plan};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct CoordState {
    pub coordinator: Coordinator,
}

pub fn create_router(state: CoordState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/plans", post(execute_plan))
        .route("/internal/groups/:raft_id/execute", post(execute_in_group))
        .route("/membership", post(change_membership))
        .route("/health", get(health))
        .route("/health/ready", get(health_ready))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Execute a client plan. The outcome, including failures, travels in the
/// returned status; the HTTP status only reflects transport problems.
async fn execute_plan(State(state): State<CoordState>, Json(plan): Json<Plan>) -> Json<Status> {
    debug!(plan = %plan, "Received plan");
    Json(state.coordinator.execute_non_query_plan(&plan).await)
}

async fn execute_in_group(
    State(state): State<CoordState>,
    Path(raft_id): Path<i32>,
    Json(request): Json<ExecuteRequest>,
) -> impl IntoResponse {
    if request.header.raft_id != raft_id {
        return (
            StatusCode::BAD_REQUEST,
            Json(Status::new(
                TsStatusCode::ExecuteStatementError,
                format!(
                    "header {} does not match group {}",
                    request.header, raft_id
                ),
            )),
        );
    }

    let member = &state.coordinator.context().member;
    let serves_group = member
        .partition_table()
        .and_then(|table| table.group(raft_id).map(|group| group.contains(member.this_node())))
        .unwrap_or(false);
    if !serves_group {
        warn!(raft_id, node = %member.this_node(), "Received a plan for a group this node is not in");
        return (
            StatusCode::OK,
            Json(Status::new(
                TsStatusCode::PartitionNotReady,
                format!("{} is not a member of group {}", member.this_node(), raft_id),
            )),
        );
    }

    let status = member
        .execute_in_local_group(&request.header, &request.plan)
        .await;
    (StatusCode::OK, Json(status))
}

async fn change_membership(
    State(state): State<CoordState>,
    Json(log): Json<MembershipChangeLog>,
) -> impl IntoResponse {
    match state.coordinator.propagate_membership_change_log(&log).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok", "log": log.to_string() }))),
        Err(e) => (
            e.to_http_status(),
            Json(json!({ "status": "error", "error": e.to_string() })),
        ),
    }
}

/// Liveness and identity of this node
async fn health(State(state): State<CoordState>) -> impl IntoResponse {
    let member = &state.coordinator.context().member;
    let groups: Vec<i32> = member
        .partition_table()
        .map(|table| {
            table
                .groups_of(member.this_node())
                .iter()
                .map(|group| group.raft_id)
                .collect()
        })
        .unwrap_or_default();
    Json(json!({
        "status": "healthy",
        "node": member.this_node().to_string(),
        "groups": groups,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": timestamp_now(),
    }))
}

/// Ready once a partition table is known and a leader is reachable
async fn health_ready(State(state): State<CoordState>) -> impl IntoResponse {
    let member = &state.coordinator.context().member;
    let groups = member.partition_table().map(|table| table.global_groups().len());
    let leader = member.leader();

    match (groups, &leader) {
        (Some(groups), Some(leader)) => (
            StatusCode::OK,
            Json(json!({
                "ready": true,
                "data_groups": groups,
                "leader": leader.to_string(),
            })),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ready": false,
                "reason": if groups.is_none() { "Partition table is not ready" } else { "No leader" },
            })),
        ),
    }
}

pub async fn metrics(State(state): State<CoordState>) -> impl IntoResponse {
    (StatusCode::OK, state.coordinator.metrics().to_prometheus())
}
