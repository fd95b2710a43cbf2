//! HTTP request handlers

use crate::api::server::AppContext;
use crate::session::SessionState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub clients: usize,
    pub session: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "pv-vision".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        clients: ctx.hub.client_count().await,
        session: ctx.controller.state().await,
        exercise: ctx
            .controller
            .active_exercise()
            .await
            .map(|kind| kind.wire_name().to_string()),
    })
}
