//! Handlers that drive the manager: process a turn, answer a prompt,
//! review/apply pending changes, cancel, and toggle yolo mode.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kory_domain::change::ChangeSummary;
use kory_ledger::ApplyChangesRequest;
use kory_prompts::PromptAnswer;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub text: String,
    #[serde(default)]
    pub preferred_model: Option<String>,
    #[serde(default)]
    pub reasoning_level: Option<String>,
}

pub async fn process(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ProcessRequest>,
) -> StatusCode {
    state.manager.process(session_id, req.text, req.preferred_model, req.reasoning_level);
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub text: String,
}

pub async fn input(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<InputRequest>,
) -> StatusCode {
    state.manager.handle_user_input(session_id, req.text);
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub selection: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

pub async fn respond(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> StatusCode {
    let resolved = state.manager.handle_session_response(
        &session_id,
        req.request_id,
        PromptAnswer { selection: req.selection, text: req.text },
    );
    if resolved {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn get_changes(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Vec<ChangeSummary>> {
    Json(state.manager.get_session_changes(&session_id))
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplyChangesBody {
    #[serde(default)]
    pub accept_all: bool,
    #[serde(default)]
    pub reject_all: bool,
    #[serde(default)]
    pub accept_paths: Vec<String>,
    #[serde(default)]
    pub reject_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyChangesResponse {
    pub restored: Vec<String>,
    pub remaining: Vec<ChangeSummary>,
}

pub async fn apply_changes(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ApplyChangesBody>,
) -> Result<Json<ApplyChangesResponse>, (StatusCode, String)> {
    let req = ApplyChangesRequest {
        accept_all: body.accept_all,
        reject_all: body.reject_all,
        accept_paths: body.accept_paths,
        reject_paths: body.reject_paths,
    };
    let outcome = state
        .manager
        .apply_session_changes(&session_id, req)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(ApplyChangesResponse { restored: outcome.to_restore, remaining: outcome.remaining }))
}

pub async fn cancel(State(state): State<AppState>) -> StatusCode {
    state.manager.cancel();
    StatusCode::OK
}

pub async fn cancel_session_workers(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.manager.cancel_session_workers(&session_id);
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct YoloRequest {
    pub enabled: bool,
}

pub async fn set_yolo(State(state): State<AppState>, Json(req): Json<YoloRequest>) -> StatusCode {
    state.manager.set_yolo_mode(req.enabled);
    StatusCode::OK
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.manager.get_status())
}
