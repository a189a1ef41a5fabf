//! Control API handlers.
//!
//! Request bodies are read as raw bytes and parsed here, so malformed JSON
//! and a missing content type get the same `{"error": ...}` 400 as any
//! other invalid input.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use fleetgrid_dispatch::PoolStats;
use fleetgrid_state::WorkerStatus;

use crate::ApiState;
use crate::error::ApiError;

const DEFAULT_TARGET_COUNT: u32 = 1;

fn parse_json(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("malformed JSON: {e}")))
}

/// Read `target_count` and `image_name` from an `update_containers` body.
///
/// `target_count` may be a JSON integer or a numeric string and defaults
/// to 1 when absent.
pub fn parse_scale_request(body: &Value) -> Result<(u32, String), ApiError> {
    let bad = |msg: &str| ApiError::BadRequest(msg.to_string());
    let Some(obj) = body.as_object() else {
        return Err(bad("request body must be a JSON object"));
    };

    let count: i64 = match obj.get("target_count") {
        None => i64::from(DEFAULT_TARGET_COUNT),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| bad("target_count must be an integer"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| bad("target_count must be an integer"))?,
        Some(_) => return Err(bad("target_count must be an integer")),
    };
    if count < 0 {
        return Err(bad("target_count must not be negative"));
    }
    let count = u32::try_from(count).map_err(|_| bad("target_count is too large"))?;

    let image = obj
        .get("image_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad("Image name is required."))?;

    Ok((count, image.to_string()))
}

// ── Tasks ──────────────────────────────────────────────────────

/// POST /add_task
pub async fn add_task(State(state): State<ApiState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let value = parse_json(&body)?;
    let accepted = state.router.route_and_dispatch(value).map_err(|e| {
        warn!(error = %e, "task rejected");
        ApiError::from(e)
    })?;

    info!(worker = %accepted.worker, dispatch_id = accepted.dispatch_id, "task accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Task accepted",
            "container_ip": accepted.address,
            "container_name": accepted.worker,
        })),
    ))
}

/// GET /get_tasks_status
pub async fn get_tasks_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({ "task_counts": state.fleet.task_counts() }))
}

// ── Fleet ──────────────────────────────────────────────────────

/// POST /update_containers
pub async fn update_containers(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let value = parse_json(&body)?;
    let (count, image) = parse_scale_request(&value)?;

    info!(target = count, %image, "replica target update requested");
    let addresses = state.manager.reconcile(count, &image).await.map_err(|e| {
        error!(error = %e, "reconciliation failed");
        ApiError::from(e)
    })?;

    Ok(Json(json!({
        "message": "Container count updated successfully.",
        "container_ips": addresses,
    })))
}

#[derive(Serialize)]
struct WorkerView {
    name: String,
    address: String,
    status: WorkerStatus,
    inflight: u32,
}

#[derive(Serialize)]
struct FleetView {
    image: String,
    target_count: Option<u32>,
    workers: Vec<WorkerView>,
    dispatch: PoolStats,
}

/// GET /workers
pub async fn list_workers(State(state): State<ApiState>) -> impl IntoResponse {
    let target = state.fleet.target();
    let workers = state
        .fleet
        .snapshot()
        .into_iter()
        .map(|w| WorkerView {
            name: w.name,
            address: w.address,
            status: w.status,
            inflight: w.inflight,
        })
        .collect();

    Json(FleetView {
        image: target
            .as_ref()
            .map(|t| t.image.clone())
            .unwrap_or_else(|| state.default_image.clone()),
        target_count: target.map(|t| t.count),
        workers,
        dispatch: state.router.pool().stats(),
    })
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
