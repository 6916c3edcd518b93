//! # Admin REST Endpoints
//!
//! Provisioning endpoints gated on the admin credentials configured at
//! startup (`X-Username`/`X-Password` headers, compared against the
//! SHA-256-hashed admin pair). Admin access grants create/update
//! capabilities only — it never grants websocket attach.

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::BrokerError;
use crate::permissions::Permissions;
use crate::state::AppState;
use crate::store::{AgentRecord, STORE_DEADLINE};

/// Extractor that authenticates the admin pair from request headers.
/// Both missing headers and a mismatched pair are reported identically
/// (403) — the admin endpoints do not distinguish "who are you" from
/// "you're not allowed", unlike the Operator-facing `/access` route.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = BrokerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get("X-Username")
            .and_then(|v| v.to_str().ok());
        let password = parts
            .headers
            .get("X-Password")
            .and_then(|v| v.to_str().ok());

        match (username, password) {
            (Some(username), Some(password)) if state.config.check_admin(username, password) => {
                Ok(AdminAuth)
            }
            _ => Err(BrokerError::CredentialRejected),
        }
    }
}

async fn with_deadline<T>(
    fut: impl std::future::Future<Output = Result<T, BrokerError>>,
) -> Result<T, BrokerError> {
    tokio::time::timeout(STORE_DEADLINE, fut)
        .await
        .unwrap_or(Err(BrokerError::StoreTimeout))
}

#[derive(Deserialize)]
pub struct CreatePcBody {
    pub username: String,
    pub password: String,
    pub key: String,
}

/// `POST /create_pc/{key}` — registers a new Agent record.
pub async fn create_pc(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(key): Path<String>,
    Json(body): Json<CreatePcBody>,
) -> Result<StatusCode, BrokerError> {
    if body.key != key {
        return Err(BrokerError::Validation(
            "key in body must match key in path".to_string(),
        ));
    }

    with_deadline(state.store.create_agent(AgentRecord {
        username: body.username,
        password: body.password,
        key: body.key,
    }))
    .await?;

    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
pub struct CreateUserBody {
    pub username: String,
    pub password: String,
}

/// `POST /create_user/{key}` — registers a new Operator record scoped to
/// the Agent identified by `key` (the `pc_key`).
pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(pc_key): Path<String>,
    Json(body): Json<CreateUserBody>,
) -> Result<StatusCode, BrokerError> {
    with_deadline(
        state
            .store
            .create_operator(body.username, body.password, pc_key),
    )
    .await?;

    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
pub struct SetPermissionsBody {
    pub username: String,
    pub permissions: Permissions,
}

/// `POST /set_user_permissions/{key}` — replaces an Operator's permissions
/// document. The in-memory store resolves `username` to the Operator
/// record directly, as in the design spec's `C1` interface; the `{key}`
/// path segment follows the same URL shape as the other admin routes but
/// carries no additional constraint here.
pub async fn set_user_permissions(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(_pc_key): Path<String>,
    Json(body): Json<SetPermissionsBody>,
) -> Result<StatusCode, BrokerError> {
    with_deadline(
        state
            .store
            .set_operator_permissions(&body.username, body.permissions),
    )
    .await?;

    Ok(StatusCode::OK)
}
