//! Session (C4): the in-memory pairing of one Agent connection with at
//! most one Operator connection, plus the actions that mutate that pairing.
//!
//! A [`Session`] is owned by its Agent read loop (see [`crate::handlers`]);
//! the Operator attachment's lifetime is a strict sub-interval of the
//! Session's. The `operator` slot is guarded by a `tokio::sync::Mutex` so
//! that set-if-absent (attach) and clear (detach) are atomic with respect
//! to each other, per the design spec's concurrency model.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use futures::{Sink, SinkExt};
use tokio::sync::Mutex;

use crate::permissions::Permissions;
use crate::protocol::InfoFrame;

/// Boxed so the write half of a real `axum` websocket and a plain channel
/// (used by tests) can both satisfy this type without making `Session`
/// generic over the socket implementation.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// An attached Operator: its own socket writer, its username (for the
/// `user_connected` info frame), and the permissions snapshot taken at
/// attach time.
pub struct OperatorHandle {
    pub username: String,
    pub cached_permissions: Permissions,
    sink: Mutex<WsSink>,
}

impl OperatorHandle {
    pub fn new(username: String, permissions: Permissions, sink: WsSink) -> Self {
        Self {
            username,
            cached_permissions: permissions,
            sink: Mutex::new(sink),
        }
    }

    /// Forward a frame verbatim to the Operator. Write errors are logged
    /// and otherwise ignored — the Operator may have just disconnected.
    pub async fn forward(&self, msg: Message) {
        if let Err(err) = self.sink.lock().await.send(msg).await {
            tracing::debug!(%err, "write to operator failed, ignoring");
        }
    }

    async fn send_close(&self) {
        let deadline = Duration::from_secs(10);
        let close = Message::Close(Some(CloseFrame {
            code: 1000,
            reason: "session closed".into(),
        }));
        match tokio::time::timeout(deadline, self.sink.lock().await.send(close)).await {
            Ok(Err(err)) => tracing::debug!(%err, "close frame write failed"),
            Err(_) => tracing::warn!("close frame write exceeded 10s deadline"),
            Ok(Ok(())) => {}
        }
    }
}

pub struct Session {
    pub key: String,
    agent_sink: Mutex<WsSink>,
    operator: Mutex<Option<Arc<OperatorHandle>>>,
}

impl Session {
    pub fn new(key: String, agent_sink: WsSink) -> Self {
        Self {
            key,
            agent_sink: Mutex::new(agent_sink),
            operator: Mutex::new(None),
        }
    }

    /// Forward a frame verbatim to the Agent. Write errors are logged and
    /// otherwise ignored (best-effort relay).
    pub async fn forward_to_agent(&self, msg: Message) {
        if let Err(err) = self.agent_sink.lock().await.send(msg).await {
            tracing::debug!(%err, "write to agent failed, ignoring");
        }
    }

    /// Sends a structured info frame to the Agent (e.g. "operator
    /// connected", "operator disconnected").
    pub async fn notify_agent(&self, frame: InfoFrame) {
        let Ok(text) = serde_json::to_string(&frame) else {
            return;
        };
        self.forward_to_agent(Message::Text(text.into())).await;
    }

    /// Snapshot read of the current Operator attachment, if any.
    pub async fn operator(&self) -> Option<Arc<OperatorHandle>> {
        self.operator.lock().await.clone()
    }

    /// Atomically attach `handle` iff no Operator is currently attached.
    /// Returns `false` on conflict (an Operator is already attached).
    pub async fn try_attach_operator(&self, handle: Arc<OperatorHandle>) -> bool {
        let mut slot = self.operator.lock().await;
        if slot.is_some() {
            return false;
        }
        *slot = Some(handle);
        true
    }

    /// The Operator disconnect action: send a CLOSE frame to the Operator
    /// (best-effort, 10s deadline), clear the attachment slot, and notify
    /// the Agent. Idempotent — a second call when no Operator is attached
    /// is a no-op.
    pub async fn disconnect_operator(&self) {
        let handle = {
            let mut slot = self.operator.lock().await;
            slot.take()
        };

        let Some(handle) = handle else {
            return;
        };

        handle.send_close().await;
        self.notify_agent(InfoFrame::user_disconnected()).await;
    }
}
