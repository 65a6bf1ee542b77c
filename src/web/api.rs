//! Axum handlers for `/api/*` routes.
//!
//! Every handler returns JSON. Errors use `{ "error": code, "message": … }`
//! with the status from [`status_for`]; runs exceeding the request timeout
//! answer 504.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{AppState, status_for};
use crate::agents::AgentKind;
use crate::error::AppError;
use crate::report::PatientInput;

#[derive(Deserialize)]
pub(super) struct FollowupRequest {
    agent: String,
    question: String,
}

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

fn error_code(e: &AppError) -> &'static str {
    match e {
        AppError::Validation(_) => "invalid_request",
        AppError::NotFound(_) => "not_found",
        AppError::Llm(_) => "provider",
        _ => "internal",
    }
}

fn error_response(e: AppError) -> Response {
    (status_for(&e), json_error(error_code(&e), &e)).into_response()
}

fn timeout_response(what: &str) -> Response {
    (StatusCode::GATEWAY_TIMEOUT, json_error("timeout", format!("{what} timed out"))).into_response()
}

/// GET /api/health
pub(super) async fn health(State(state): State<AppState>) -> Response {
    let provider = state.orchestrator.provider();
    Json(json!({
        "status": "ok",
        "provider": provider.name(),
        "model": provider.model(),
        "api_key_present": provider.has_credentials(),
    }))
    .into_response()
}

/// POST /api/analyze: run the full workflow for one patient.
pub(super) async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<PatientInput>, JsonRejection>,
) -> Response {
    let input = match body {
        Ok(Json(input)) => input,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, json_error("invalid_request", rejection.body_text()))
                .into_response();
        }
    };
    let report_text = match input.report_text() {
        Ok(text) => text,
        Err(e) => return error_response(e),
    };

    match tokio::time::timeout(
        state.request_timeout,
        state.orchestrator.run_full_workflow(&report_text),
    )
    .await
    {
        Ok(Ok(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(Err(e)) => {
            warn!("analysis failed: {e}");
            error_response(e)
        }
        Err(_) => {
            warn!(timeout_secs = state.request_timeout.as_secs(), "analysis timed out");
            timeout_response("analysis")
        }
    }
}

/// POST /api/sessions/{session_id}/followup
pub(super) async fn followup(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<FollowupRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, json_error("invalid_request", rejection.body_text()))
                .into_response();
        }
    };
    let Some(agent) = AgentKind::from_key(req.agent.trim()) else {
        return (
            StatusCode::BAD_REQUEST,
            json_error("invalid_request", format!("unknown agent: {}", req.agent)),
        )
            .into_response();
    };

    match tokio::time::timeout(
        state.request_timeout,
        state.orchestrator.ask_followup(&session_id, agent, &req.question),
    )
    .await
    {
        Ok(Ok(followup)) => (StatusCode::OK, Json(followup)).into_response(),
        Ok(Err(e)) => {
            warn!(%session_id, "follow-up failed: {e}");
            error_response(e)
        }
        Err(_) => timeout_response("follow-up"),
    }
}

/// GET /api/sessions
pub(super) async fn sessions(State(state): State<AppState>) -> Response {
    let store = state.orchestrator.store().clone();
    match tokio::task::spawn_blocking(move || store.list()).await {
        Ok(Ok(list)) => Json(json!({ "sessions": list })).into_response(),
        Ok(Err(e)) => {
            warn!("session listing failed: {e}");
            error_response(e)
        }
        Err(e) => error_response(AppError::Store(format!("session listing panicked: {e}"))),
    }
}

/// GET /api/sessions/{session_id}
pub(super) async fn session_detail(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.orchestrator.load(&session_id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => error_response(e),
    }
}
