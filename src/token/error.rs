use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Which tier of the token chain a credential belongs to
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CredentialKind {
    Session,
    Delivery,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Session => f.write_str("session"),
            CredentialKind::Delivery => f.write_str("delivery token"),
        }
    }
}

/// Gate errors with API status codes
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum GateError {
    #[error("missing credential")]
    MissingCredential,

    #[error("{0} not found")]
    CredentialNotFound(CredentialKind),

    #[error("{kind} expired ({ttl_secs}s limit reached)")]
    CredentialExpired { kind: CredentialKind, ttl_secs: u64 },

    #[error("invalid username or password")]
    InvalidLogin,

    #[error("segment not found upstream")]
    UpstreamNotFound,

    #[error("upstream request failed: {0}")]
    UpstreamTransport(String),

    #[error("invalid request body: {0}")]
    InvalidRequestBody(String),
}

impl GateError {
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            GateError::MissingCredential | GateError::InvalidLogin => StatusCode::UNAUTHORIZED,
            GateError::CredentialNotFound(_) | GateError::CredentialExpired { .. } => {
                StatusCode::FORBIDDEN
            }
            GateError::UpstreamNotFound => StatusCode::NOT_FOUND,
            GateError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            GateError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, GateError::CredentialExpired { .. })
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.to_status_code();
        let body = json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
