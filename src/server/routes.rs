// ABOUTME: REST handlers for pairing, session reads and control, and device management

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::audit::{AuditResult, AuditTrigger};
use crate::auth::token::{generate_device_id, generate_token};
use crate::auth::{PairingStatus, Principal};
use crate::models::{Device, DeviceSummary, DiffStat, Session};
use crate::monitor::MonitorError;
use crate::tmux::NewSession;

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub device_name: String,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub token: String,
    pub device_id: String,
    pub device_name: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub pane: Option<usize>,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub pane: usize,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub name: String,
}

/// Unwrap a JSON body, reporting malformed input in the API error shape.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin token required"))
    }
}

fn trigger(principal: &Principal) -> AuditTrigger {
    AuditTrigger::Api(principal.label())
}

pub async fn health_check() -> &'static str {
    "ok"
}

// ==================== Pairing ====================

pub async fn pair_initiate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<InitiateRequest>, JsonRejection>,
) -> ApiResult<InitiateResponse> {
    require_admin(&principal)?;
    let request = body(payload)?;

    let device_name = request.device_name.trim();
    if device_name.is_empty() {
        return Err(ApiError::BadRequest("device_name must not be empty".to_string()));
    }

    let ticket = state.pairing.initiate(device_name);
    state.audit.pairing_initiated(trigger(&principal), device_name);

    Ok(Json(InitiateResponse {
        code: ticket.code,
        expires_at: ticket.expires_at,
    }))
}

pub async fn pair_complete(
    State(state): State<AppState>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> ApiResult<CompleteResponse> {
    let request = body(payload)?;

    let pairing = Arc::clone(&state.pairing);
    let devices = Arc::clone(&state.devices);
    let completed = tokio::task::spawn_blocking(move || {
        pairing.complete_with(&request.code, |device_name| {
            let device = Device::new(generate_device_id(), device_name.to_string(), generate_token(), Utc::now());
            let response = CompleteResponse {
                token: device.token.clone(),
                device_id: device.id.clone(),
                device_name: device.name.clone(),
            };
            devices.add(device)?;
            Ok::<_, ApiError>(response)
        })
    })
    .await?;

    let response = completed.inspect_err(|e| {
        if let ApiError::Pairing(reason) = e {
            state.audit.pairing_failed(&reason.to_string());
        }
    })?;

    state.audit.pairing_completed(&response.device_id, &response.device_name);
    Ok(Json(response))
}

pub async fn pair_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Json<PairingStatus> {
    Json(state.pairing.status(&query.code))
}

// ==================== Sessions ====================

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<Session>> {
    Json(state.monitor.snapshot())
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Session> {
    state
        .monitor
        .find_by_name(&name)
        .map(Json)
        .ok_or_else(|| MonitorError::SessionNotFound(name).into())
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<NewSession>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let spec = body(payload)?
        .validated()
        .map_err(MonitorError::from)?;

    let result = state.monitor.create_session(&spec).await;
    state
        .audit
        .session_created(trigger(&principal), &spec.name, &spec.dir, AuditResult::from(&result));
    result?;

    info!(session = %spec.name, by = %principal.label(), "Session created");
    Ok((StatusCode::CREATED, Json(CreatedSession { name: spec.name })))
}

pub async fn kill_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let result = state.monitor.kill_session(&name).await;
    state
        .audit
        .session_killed(trigger(&principal), &name, AuditResult::from(&result));
    result?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_text(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(name): Path<String>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<SendResponse> {
    let request = body(payload)?;
    if request.text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let result = state
        .monitor
        .send_text(&name, request.pane, &request.text)
        .await;
    state.audit.text_sent(
        trigger(&principal),
        &name,
        request.pane,
        request.text.len(),
        AuditResult::from(&result.as_ref().map(|_| ())),
    );

    Ok(Json(SendResponse { pane: result? }))
}

pub async fn refresh_diff(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<DiffStat> {
    Ok(Json(state.monitor.refresh_diff(&name).await?))
}

// ==================== Devices ====================

pub async fn list_devices(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Vec<DeviceSummary>> {
    require_admin(&principal)?;

    let devices = Arc::clone(&state.devices);
    let listed = tokio::task::spawn_blocking(move || devices.list()).await?;
    Ok(Json(listed.iter().map(Device::summary).collect()))
}

pub async fn revoke_device(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_admin(&principal)?;

    let devices = Arc::clone(&state.devices);
    let device_id = id.clone();
    let result = tokio::task::spawn_blocking(move || devices.remove(&device_id)).await?;

    state.audit.device_revoked(
        trigger(&principal),
        &id,
        AuditResult::from(&result.as_ref().map(|_| ())),
    );
    result?;

    Ok(StatusCode::NO_CONTENT)
}
