//! # Relay Broker
//!
//! Pairs a remote-controlled Agent with a remote Operator over two
//! persistent websocket connections, authenticated against a credential
//! store, and enforces per-Operator command/path authorization on every
//! command relayed from Operator to Agent.
//!
//! ## Architecture
//!
//! ```text
//! Operator ──WS──► Relay Broker ──WS──► Agent
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]    — websocket control-object schemas
//! - [`permissions`] — the Permission Evaluator (C2)
//! - [`sanitize`]    — the Argument Sanitizer (C3)
//! - [`session`]     — a single Agent/Operator pairing (C4)
//! - [`registry`]    — the Session Registry & Disconnect Coordinator (C5/C6)
//! - [`store`]       — the Credential Store Adapter (C1)
//! - [`handlers`]    — the Connection Gateway and read loops (C7)
//! - [`api`]         — admin-gated REST provisioning endpoints
//! - [`config`]      — environment-driven startup configuration
//! - [`error`]       — the crate-wide error taxonomy

pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod permissions;
pub mod protocol;
pub mod registry;
pub mod sanitize;
pub mod session;
pub mod state;
pub mod store;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Assembles the full route table over a given [`AppState`]. Split out of
/// `main` so integration tests can build the same router against a test
/// store without going through the process entry point.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/create_pc/{key}", post(api::create_pc))
        .route("/connect/{key}", get(handlers::connect_ws_handler))
        .route("/access/{key}", get(handlers::access_ws_handler))
        .route("/create_user/{key}", post(api::create_user))
        .route(
            "/set_user_permissions/{key}",
            post(api::set_user_permissions),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
