//! Connection Gateway (C7) and the two read loops (C4).
//!
//! Promotes an authenticated HTTP request into a websocket and installs it
//! into a [`Session`] in one of two roles: Agent attach (`/connect/{key}`)
//! or Operator attach (`/access/{key}`). Admission is a single atomic
//! critical section inside [`crate::registry::SessionRegistry`]/[`Session`];
//! the pre-upgrade checks below exist only to reject the common case with a
//! proper HTTP status before paying for a websocket handshake — a race
//! that slips past them is caught by the atomic insert/attach itself,
//! after which there is no HTTP status left to send, so the loser's
//! socket is simply closed.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde_json::Value;

use crate::permissions::Permissions;
use crate::protocol::{
    parse_command_frame, rebuild_command_object, CommandError, CommandErrorCode, InfoFrame,
    RawFrame,
};
use crate::sanitize::sanitize_args;
use crate::session::{OperatorHandle, Session};
use crate::state::AppState;
use crate::store::STORE_DEADLINE;

fn credential_headers(headers: &HeaderMap) -> Option<(String, String)> {
    let username = headers.get("X-Username")?.to_str().ok()?.to_string();
    let password = headers.get("X-Password")?.to_str().ok()?.to_string();
    Some((username, password))
}

// ─── Agent attach (`/connect/{key}`) ────────────────────────────────────

pub async fn connect_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some((username, password)) = credential_headers(&headers) else {
        return StatusCode::FORBIDDEN.into_response();
    };

    let authenticated = tokio::time::timeout(
        STORE_DEADLINE,
        state.store.authenticate_agent(&username, &password, &key),
    )
    .await
    .unwrap_or(false);

    if !authenticated {
        return StatusCode::FORBIDDEN.into_response();
    }

    if state.registry.lookup(&key).is_some() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    ws.on_upgrade(move |socket| handle_agent_connection(socket, state, key))
}

async fn handle_agent_connection(socket: WebSocket, state: AppState, key: String) {
    let (sink, mut stream) = socket.split();
    let session = Session::new(key.clone(), Box::pin(sink));

    let session = match state.registry.admit_agent(key.clone(), session) {
        Ok(session) => session,
        Err(()) => {
            // Lost an admission race the pre-upgrade check missed; the
            // HTTP response already committed to 101, so there is no
            // status left to send. Just drop this redundant connection.
            tracing::warn!(%key, "agent key admitted concurrently, dropping duplicate connection");
            return;
        }
    };

    tracing::info!(%key, "agent attached");
    agent_read_loop(&mut stream, &session).await;
    tracing::info!(%key, "agent read loop exited");
    state.registry.request_disconnect(key);
}

/// While the Agent connection is open: forward every frame verbatim to the
/// Operator, if one is attached; drop it otherwise. Exits on any read
/// error or close, including a normal close.
async fn agent_read_loop(stream: &mut SplitStream<WebSocket>, session: &Arc<Session>) {
    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(%err, "agent read error, closing");
                break;
            }
        };

        if matches!(msg, Message::Close(_)) {
            break;
        }

        if let Some(operator) = session.operator().await {
            operator.forward(msg).await;
        }
    }
}

// ─── Operator attach (`/access/{key}`) ──────────────────────────────────

pub async fn access_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some((username, password)) = credential_headers(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let Some(session) = state.registry.lookup(&key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if session.operator().await.is_some() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let operator_record = tokio::time::timeout(
        STORE_DEADLINE,
        state.store.lookup_operator(&username, &password, &key),
    )
    .await
    .ok()
    .flatten();

    let Some(operator_record) = operator_record else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| {
        handle_operator_connection(socket, session, username, operator_record.permissions)
    })
}

async fn handle_operator_connection(
    socket: WebSocket,
    session: Arc<Session>,
    username: String,
    permissions: Permissions,
) {
    let (sink, mut stream) = socket.split();
    let handle = Arc::new(OperatorHandle::new(
        username.clone(),
        permissions,
        Box::pin(sink),
    ));

    if !session.try_attach_operator(handle.clone()).await {
        // Lost the single-operator race after already upgrading; there is
        // no HTTP status left to send, so close this socket directly.
        tracing::warn!(key = %session.key, "operator attach race lost, closing duplicate connection");
        handle.forward(Message::Close(None)).await;
        return;
    }

    tracing::info!(key = %session.key, %username, "operator attached");
    session
        .notify_agent(InfoFrame::user_connected(&username))
        .await;

    operator_read_loop(&mut stream, &session, &handle).await;

    tracing::info!(key = %session.key, %username, "operator read loop exited");
    session.disconnect_operator().await;
}

/// While the Operator connection is open: binary frames relay unchanged;
/// text frames are decoded, and `{type:"command"}` frames go through
/// sanitization and the Permission Evaluator before reaching the Agent.
/// Every other text frame (no `type`, or a non-command `type`) forwards
/// as-is.
async fn operator_read_loop(
    stream: &mut SplitStream<WebSocket>,
    session: &Arc<Session>,
    handle: &Arc<OperatorHandle>,
) {
    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(%err, "operator read error, closing");
                break;
            }
        };

        match msg {
            Message::Close(_) => break,
            Message::Binary(data) => {
                session.forward_to_agent(Message::Binary(data)).await;
            }
            Message::Text(text) => {
                handle_operator_text_frame(&text, session, handle).await;
            }
            _ => {}
        }
    }
}

async fn handle_operator_text_frame(
    text: &str,
    session: &Arc<Session>,
    handle: &Arc<OperatorHandle>,
) {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(%err, "failed to decode operator frame, dropping");
            return;
        }
    };

    if raw.kind.as_deref() != Some("command") {
        session
            .forward_to_agent(Message::Text(text.to_string().into()))
            .await;
        return;
    }

    let Some(command) = parse_command_frame(&raw.fields) else {
        let cmd = raw.fields.get("cmd").and_then(Value::as_str).unwrap_or("");
        send_command_error(handle, cmd, CommandErrorCode::InvalidArguments).await;
        return;
    };

    let sanitized = sanitize_args(command.args);

    let allow = crate::permissions::evaluate(&handle.cached_permissions, &command.cmd, &sanitized);
    tracing::debug!(cmd = %command.cmd, allow, "permission decision");
    if !allow {
        send_command_error(handle, &command.cmd, CommandErrorCode::PermissionDenied).await;
        return;
    }

    let rebuilt = rebuild_command_object(&raw.fields, &command.cmd, sanitized);
    let Ok(text) = serde_json::to_string(&rebuilt) else {
        send_command_error(handle, &command.cmd, CommandErrorCode::InternalError).await;
        return;
    };
    session.forward_to_agent(Message::Text(text.into())).await;
}

async fn send_command_error(handle: &Arc<OperatorHandle>, cmd: &str, code: CommandErrorCode) {
    let error = CommandError::new(cmd, code);
    if let Ok(text) = serde_json::to_string(&error) {
        handle.forward(Message::Text(text.into())).await;
    }
}
