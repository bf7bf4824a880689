use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::ApplicationError;
use domain::{Message, RoomId};

use crate::auth::bearer_token;
use crate::ws_connection::WebSocketConnection;
use crate::{error::ApiError, state::AppState};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new().route("/rooms/{room_id}/messages", get(get_history))
}

async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let room_id = RoomId::from(room_id);

    let room = state
        .rooms
        .find_room(room_id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("Room not found"))?;
    if !room.is_member(user_id) {
        return Err(ApplicationError::forbidden("Not a member of this room").into());
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let messages = state.messages.recent_messages(room_id, limit).await?;
    Ok(Json(messages))
}

/// 握手：凭证来自 `?token=` 或 `Authorization: Bearer`，认证失败直接返回 401，不升级
async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let credential = query
        .token
        .or_else(|| bearer_token(&headers).map(str::to_owned));

    let user = state
        .controller
        .authenticate(credential.as_deref())
        .await
        .map_err(|err| {
            tracing::info!(error = %err, "websocket handshake rejected");
            ApiError::from(err)
        })?;

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, user).run()))
}
