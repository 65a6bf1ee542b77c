//! Web channel: HTML pages for the intake form and a JSON API under `/api/`.
//!
//! The channel implements [`Component`]; `run()` drives the axum server and
//! the shared [`CancellationToken`] is wired to axum's graceful shutdown.
//!
//! ## URL layout
//!
//! ```text
//! GET  /                              → Report & Analyze page
//! POST /analyze                       → run the agents, show results
//! GET  /followup, POST /followup      → ask one agent about the last result
//! GET  /download                      → download page for the last result
//! GET  /logs                          → this browser's recent sessions
//! GET  /sessions/{id}/{txt|json|pdf}  → file download
//! GET  /api/health
//! POST /api/analyze
//! GET  /api/sessions
//! GET  /api/sessions/{id}
//! POST /api/sessions/{id}/followup
//! GET  /favicon.ico                   → 204
//! ```

mod api;
pub mod session;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agents::orchestrator::Orchestrator;
use crate::config::WebConfig;
use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};
use session::BrowserSessions;

/// Router state injected into every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<BrowserSessions>,
    /// Upper bound on one full analysis or follow-up.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &WebConfig) -> Self {
        Self {
            orchestrator,
            sessions: Arc::new(BrowserSessions::new(config.recent_sessions_cap)),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }
}

pub struct WebChannel {
    channel_id: String,
    bind_addr: String,
    state: AppState,
}

impl WebChannel {
    pub fn new(channel_id: impl Into<String>, bind_addr: impl Into<String>, state: AppState) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            state,
        }
    }
}

impl Component for WebChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(serve(self.channel_id, self.bind_addr, self.state, shutdown))
    }
}

async fn serve(
    channel_id: String,
    bind_addr: String,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Web(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "web channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Web(format!("server error: {e}")))?;

    info!(%channel_id, "web channel shut down");
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // API routes
        .route("/api/health",                       get(api::health))
        .route("/api/analyze",                      post(api::analyze))
        .route("/api/sessions",                     get(api::sessions))
        .route("/api/sessions/{session_id}",        get(api::session_detail))
        .route("/api/sessions/{session_id}/followup", post(api::followup))
        // UI routes
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .route("/",            get(ui::index))
        .route("/analyze",     post(ui::analyze))
        .route("/followup",    get(ui::followup_page).post(ui::followup_submit))
        .route("/download",    get(ui::download))
        .route("/logs",        get(ui::logs))
        .route("/sessions/{session_id}/{artifact}", get(ui::artifact))
        .with_state(state)
}

/// HTTP status for an error surfaced by a handler.
pub(crate) fn status_for(e: &AppError) -> StatusCode {
    match e {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Llm(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderError;

    #[test]
    fn error_statuses() {
        assert_eq!(status_for(&AppError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&AppError::Llm(ProviderError::EmptyResponse)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_for(&AppError::Store("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
