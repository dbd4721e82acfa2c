//! Request handlers.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures::StreamExt;
use murmur_core::ConnectionId;
use murmur_protocol::{
    ErrorResponse, LoginForm, MessageResponse, RegisterRequest, TokenResponse, TOKEN_QUERY_PARAM,
};
use tracing::{debug, error};

use super::AppState;
use crate::auth::AccountError;
use crate::connection::Connection;
use crate::session::{ConnectionSession, Credentials};

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/ws", get(ws_upgrade))
        .route("/ws/{client_id}", get(ws_upgrade_with_id))
        .with_state(state)
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse::new("Hello"))
}

async fn register(
    State(state): State<AppState>,
    request: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AccountError> {
    let Json(request) = request.map_err(|e| AccountError::MalformedRequest(e.body_text()))?;
    state.accounts.register(request).await?;
    Ok(Json(MessageResponse::new("User registered successfully")))
}

async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<TokenResponse>, AccountError> {
    let Form(form) = form.map_err(|e| AccountError::MalformedRequest(e.body_text()))?;
    Ok(Json(state.accounts.login(form).await?))
}

/// GET /ws[?token=JWT]
///
/// Always upgrades; the session authenticates afterwards so that a
/// rejection reaches the client as a close frame. The server assigns the
/// connection id.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, None, &query, &headers, ws)
}

/// GET /ws/{client_id}[?token=JWT]
///
/// Same as `/ws`, but the client picks its connection id. A second socket
/// claiming a live id is closed with 1008.
async fn ws_upgrade_with_id(
    State(state): State<AppState>,
    Path(client_id): Path<u64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, Some(ConnectionId::new(client_id)), &query, &headers, ws)
}

fn upgrade(
    state: AppState,
    id: Option<ConnectionId>,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credentials = Credentials {
        query_token: query.get(TOKEN_QUERY_PARAM).cloned(),
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
    };
    let id = id.unwrap_or_else(|| {
        ConnectionId::new(state.connection_counter.fetch_add(1, Ordering::Relaxed))
    });

    let tasks = state.tasks.clone();
    ws.on_upgrade(move |socket| tasks.track_future(run_socket(socket, id, state, credentials)))
}

async fn run_socket(socket: WebSocket, id: ConnectionId, state: AppState, credentials: Credentials) {
    let (sink, source) = socket.split();
    let connection = Arc::new(Connection::new(id, Box::new(sink)));
    debug!(connection = %id, "WebSocket upgraded");

    let outcome = ConnectionSession::new(connection, state.sessions.clone())
        .run(source, credentials)
        .await;
    debug!(connection = %id, outcome = ?outcome, "Session finished");
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = match &self {
            AccountError::EmailTaken
            | AccountError::Invalid(_)
            | AccountError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            AccountError::InvalidCredentials => StatusCode::FORBIDDEN,
            AccountError::Internal(e) => {
                error!(error = %e, "Account operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let detail = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error".to_string(),
            _ => self.to_string(),
        };
        (status, Json(ErrorResponse::new(detail))).into_response()
    }
}
