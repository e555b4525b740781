use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use flowrun_core::types::FlowId;

use crate::connection;
use crate::state::AppState;

// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn parse_flow_id(raw: &str) -> Result<FlowId, Response> {
    raw.parse::<FlowId>()
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, format!("invalid flow id: {}", raw)))
}

// GET /api/flows/:id/status
pub async fn flow_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let flow_id = match parse_flow_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.query.status(flow_id).await {
        Ok(status) => Json(status).into_response(),
        Err(e) if e.is_not_found() => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => {
            error!(flow_id = %flow_id, error = %e, "Status query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// POST /api/flows/:id/execute
pub async fn execute_flow(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let flow_id = match parse_flow_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    info!(flow_id = %flow_id, "Flow execution requested");
    let engine = state.engine.clone();
    tokio::spawn(async move {
        match engine.execute_flow(flow_id).await {
            Ok(summary) => info!(
                flow_id = %flow_id,
                nodes = summary.nodes.len(),
                execution_time_ms = summary.execution_time_ms,
                "Background flow finished"
            ),
            Err(e) => error!(flow_id = %flow_id, error = %e, "Background flow failed"),
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "flowId": flow_id }))).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct FlowFilter {
    #[serde(default)]
    pub flow_id: Option<i64>,
}

// GET /ws?flow_id=N
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(filter): Query<FlowFilter>,
) -> impl IntoResponse {
    let filter = filter.flow_id.map(FlowId);
    ws.on_upgrade(move |socket| handle_ws(socket, state, filter))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>, filter: Option<FlowId>) {
    info!(filter = ?filter, "WebSocket observer connected");
    connection::handle_connection(socket, state.hub.clone(), filter).await;
    debug!("WebSocket observer disconnected");
}
