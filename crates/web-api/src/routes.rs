use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use domain::{Message, PresenceEntry, SessionId};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/room/users", get(active_users))
        .route("/room/history", get(history))
        .route("/room/sessions/{session_id}", get(session_presence))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn active_users(State(state): State<AppState>) -> Json<Vec<PresenceEntry>> {
    Json(state.coordinator.active_users().await)
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = match query.limit {
        Some(0) => return Err(ApiError::bad_request("limit must be greater than 0")),
        Some(limit) => state.coordinator.recent_history(limit).await,
        None => state.coordinator.history().await,
    };
    Ok(Json(messages))
}

async fn session_presence(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PresenceEntry>, ApiError> {
    let session = state.coordinator.session(SessionId::from(session_id)).await?;
    Ok(Json(session.presence()))
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Some(connection) = WebSocketConnection::new(socket, state).await {
            connection.run().await;
        }
    })
}
