//! Crate-wide error taxonomy and its mapping onto HTTP status codes.
//!
//! Every fallible operation in the business layer (store access, admission,
//! credential checks) returns a [`BrokerError`]. Handlers propagate it with
//! `?` and axum turns it into a response via [`IntoResponse`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("credentials rejected")]
    CredentialRejected,

    #[error("missing authentication headers")]
    MissingCredentials,

    #[error("key already in use")]
    KeyTaken,

    #[error("operator already attached")]
    AlreadyAttached,

    #[error("no session for key")]
    NoSession,

    #[error("malformed request body: {0}")]
    Validation(String),

    #[error("pc key {0} does not exist")]
    UnknownPcKey(String),

    #[error("agent key already registered")]
    PcConflict,

    #[error("operator already exists for this pc")]
    OperatorConflict,

    #[error("store operation failed: {0}")]
    Store(String),

    #[error("store operation timed out")]
    StoreTimeout,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = match &self {
            BrokerError::CredentialRejected => StatusCode::FORBIDDEN,
            BrokerError::MissingCredentials => StatusCode::UNAUTHORIZED,
            BrokerError::KeyTaken => StatusCode::INTERNAL_SERVER_ERROR,
            BrokerError::AlreadyAttached => StatusCode::BAD_REQUEST,
            BrokerError::NoSession => StatusCode::NOT_FOUND,
            BrokerError::Validation(_) => StatusCode::BAD_REQUEST,
            BrokerError::UnknownPcKey(_) => StatusCode::NOT_FOUND,
            BrokerError::PcConflict => StatusCode::FORBIDDEN,
            BrokerError::OperatorConflict => StatusCode::BAD_REQUEST,
            BrokerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BrokerError::StoreTimeout => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
