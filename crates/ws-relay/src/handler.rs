//! HTTP and WebSocket handlers for the relay

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::gateway::{Gateway, GatewayConfig};
use crate::registry::Registry;
use crate::router::Router;

/// Shared state for handlers
#[derive(Clone)]
pub struct RelayState {
    pub registry: Registry,
    pub router: Router,
    pub gateway_config: GatewayConfig,
    /// WebSocket path prefix, shown on the status page
    pub endpoint: String,
}

/// WebSocket endpoint: `/{endpoint}/{user_id}`
pub async fn ws_connect(
    State(state): State<RelayState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    tracing::debug!(user_id = %user_id, client_ip = ?client_ip, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| async move {
        let (connection, receiver) = Connection::with_metadata(
            user_id.clone(),
            state.gateway_config.send_queue_capacity,
            client_ip,
            user_agent,
        );
        Gateway::new(user_id, state.registry, state.router, state.gateway_config)
            .run(socket, connection, receiver)
            .await;
    })
}

#[derive(Debug, Deserialize)]
pub struct PushParams {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PushResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Push endpoint: `/push/{to_user_id}?message=...`
///
/// An offline recipient is a normal outcome, reported with `success: false`.
pub async fn push(
    State(state): State<RelayState>,
    Path(to_user_id): Path<String>,
    Query(params): Query<PushParams>,
) -> Json<PushResponse> {
    match state.registry.push(&to_user_id, &params.message) {
        Ok(()) => Json(PushResponse {
            success: true,
            error: None,
        }),
        Err(e) => Json(PushResponse {
            success: false,
            error: Some(e.to_string()),
        }),
    }
}

// Stats endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub online_count: usize,
    pub users: Vec<UserStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub connection_id: String,
    pub connected_at: String,
    pub is_alive: bool,
}

pub async fn get_stats(State(state): State<RelayState>) -> Json<StatsResponse> {
    let mut users: Vec<UserStats> = state
        .registry
        .list_connections()
        .into_iter()
        .map(|c| UserStats {
            is_alive: c.is_alive(),
            connected_at: c.metadata.connected_at.to_rfc3339(),
            connection_id: c.id,
            user_id: c.user_id,
        })
        .collect();
    users.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    Json(StatsResponse {
        online_count: state.registry.online_count(),
        users,
    })
}

// Status page
pub async fn status_page(State(state): State<RelayState>) -> impl IntoResponse {
    Html(include_str!("status.html").replace("{{endpoint}}", &state.endpoint))
}
