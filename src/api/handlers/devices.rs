//! Device API handlers
//!
//! Registry CRUD, manual refresh, device commands and session replay.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::AppState;
use crate::dispatch::CommandOutcome;
use crate::error::AppError;
use crate::models::{
    DeviceConfig, SessionMeta, StatusSnapshot, MAX_MOTOR_INTERVAL_MS, MIN_MOTOR_INTERVAL_MS,
};
use crate::poll::{DeviceLiveState, RefreshOutcome};

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Deserialize)]
pub struct AddDeviceRequest {
    pub url: String,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetIntervalRequest {
    pub motor_interval_ms: u64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct SessionQuery {
    pub id: String,
}

/// Session row with the duration the dashboard shows
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub meta: SessionMeta,
    pub effective_duration_ms: Option<u64>,
}

impl From<SessionMeta> for SessionView {
    fn from(meta: SessionMeta) -> Self {
        let effective_duration_ms = meta.effective_duration_ms();
        Self {
            meta,
            effective_duration_ms,
        }
    }
}

/// Device config merged with its live state
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    #[serde(flatten)]
    pub config: DeviceConfig,
    pub status: Option<StatusSnapshot>,
    pub sessions: Vec<SessionView>,
    pub error: Option<String>,
    pub busy_flags: BTreeMap<String, bool>,
}

impl DeviceView {
    fn new(config: DeviceConfig, state: DeviceLiveState) -> Self {
        Self {
            config,
            status: state.status,
            sessions: state.sessions.into_iter().map(SessionView::from).collect(),
            error: state.error,
            busy_flags: state.busy_flags,
        }
    }
}

/// Dashboard controls accept any number; the device only takes this range
pub fn clamp_interval_ms(ms: u64) -> u64 {
    ms.clamp(MIN_MOTOR_INTERVAL_MS, MAX_MOTOR_INTERVAL_MS)
}

fn command_response(outcome: CommandOutcome) -> Json<Value> {
    let ok = outcome == CommandOutcome::Completed;
    let mut body = serde_json::to_value(&outcome).unwrap_or_else(|_| serde_json::json!({}));
    if let Value::Object(map) = &mut body {
        map.insert("ok".to_string(), Value::Bool(ok));
    }
    Json(body)
}

fn refresh_outcome_name(outcome: RefreshOutcome) -> &'static str {
    match outcome {
        RefreshOutcome::Applied => "applied",
        RefreshOutcome::Dropped => "dropped",
        RefreshOutcome::UnknownDevice => "unknown_device",
    }
}

// ============================================================================
// Registry
// ============================================================================

/// GET /api/devices
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    let devices: Vec<DeviceView> = state
        .coordinator
        .snapshot_all()
        .await
        .into_iter()
        .map(|(config, state)| DeviceView::new(config, state))
        .collect();
    let total = devices.len();

    Json(serde_json::json!({
        "ok": true,
        "devices": devices,
        "total": total,
    }))
}

/// POST /api/devices
pub async fn add_device(
    State(state): State<AppState>,
    Json(req): Json<AddDeviceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device = state
        .coordinator
        .add_device(&req.url, req.name.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "ok": true,
            "device": device,
        })),
    ))
}

/// GET /api/devices/:id
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let config = state
        .coordinator
        .device(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Device {} not found", id)))?;
    let live = state.coordinator.snapshot(&id).await.unwrap_or_default();

    Ok(Json(serde_json::json!({
        "ok": true,
        "device": DeviceView::new(config, live),
    })))
}

/// PATCH /api/devices/:id
pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device = state
        .coordinator
        .update_device(&id, req.name.as_deref(), req.url.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device {} not found", id)))?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "device": device,
    })))
}

/// DELETE /api/devices/:id
pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let removed = state.coordinator.remove_device(&id).await;
    Json(serde_json::json!({
        "ok": true,
        "removed": removed,
    }))
}

// ============================================================================
// Polling
// ============================================================================

/// POST /api/devices/:id/refresh
pub async fn refresh_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.refresh(&id).await {
        Ok(outcome) => Json(serde_json::json!({
            "ok": outcome != RefreshOutcome::UnknownDevice,
            "outcome": refresh_outcome_name(outcome),
        })),
        Err(e) => Json(serde_json::json!({
            "ok": false,
            "outcome": "failed",
            "error": e.to_string(),
        })),
    }
}

/// POST /api/devices/refresh
pub async fn refresh_all(State(state): State<AppState>) -> impl IntoResponse {
    let results: Vec<Value> = state
        .coordinator
        .refresh_all()
        .await
        .into_iter()
        .map(|(id, result)| match result {
            Ok(outcome) => serde_json::json!({
                "id": id,
                "outcome": refresh_outcome_name(outcome),
            }),
            Err(e) => serde_json::json!({
                "id": id,
                "outcome": "failed",
                "error": e.to_string(),
            }),
        })
        .collect();

    Json(serde_json::json!({
        "ok": true,
        "results": results,
    }))
}

/// GET /api/devices/:id/session?id=
pub async fn get_session(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<impl IntoResponse, AppError> {
    let frames = state
        .coordinator
        .fetch_session(&device_id, &query.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device {} not found", device_id)))?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "frames": frames,
    })))
}

// ============================================================================
// Commands
// ============================================================================

/// POST /api/devices/:id/interval
pub async fn set_interval(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetIntervalRequest>,
) -> impl IntoResponse {
    let ms = clamp_interval_ms(req.motor_interval_ms);
    command_response(state.dispatcher.set_interval(&id, ms).await)
}

/// POST /api/devices/:id/session/start
pub async fn start_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Option<Json<StartSessionRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    command_response(state.dispatcher.start_session(&id, req.session_id).await)
}

/// POST /api/devices/:id/session/stop
pub async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    command_response(state.dispatcher.stop_session(&id).await)
}

/// POST /api/devices/:id/motor/trigger
pub async fn trigger_motor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    command_response(state.dispatcher.trigger_motor(&id).await)
}
