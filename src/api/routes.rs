use crate::AppState;
use crate::clock;
use crate::events::redact;
use crate::license as license_catalog;
use crate::manifest::{self, DASH_CONTENT_TYPE, ManifestRequest};
use crate::token::GateError;
use axum::body::Body;
use axum::extract::{ConnectInfo, Extension, Path as AxumPath, Query};
use axum::http::{HeaderMap, HeaderValue, Method, Response, StatusCode, header};
use axum::response::{IntoResponse, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

pub const SESSION_REMAINING_HEADER: &str = "x-session-remaining";
pub const UPSTREAM_NODE_HEADER: &str = "x-upstream-node";
pub const TOKEN_REMAINING_HEADER: &str = "x-token-remaining";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default, alias = "identity")]
    pub username: Option<String>,
    #[serde(default, alias = "secret")]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub credential: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GateQuery {
    pub credential: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub delivery_tokens: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub identity: String,
    pub origin: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub expired: bool,
    pub seconds_remaining: u64,
}

/// Client address, preferring the first `X-Forwarded-For` hop
fn client_origin(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Scheme and host the client used to reach us
fn request_origin(headers: &HeaderMap) -> (String, String) {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .filter(|value| matches!(*value, "http" | "https"))
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");

    (scheme.to_string(), host.to_string())
}

pub async fn login(
    Extension(state): Extension<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LoginResponse>, GateError> {
    let request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|error| GateError::InvalidRequestBody(error.to_string()))?;

    let (Some(username), Some(password)) = (request.username, request.password) else {
        return Err(GateError::InvalidRequestBody(
            "username and password are required".into(),
        ));
    };
    if username.is_empty() || password.is_empty() {
        return Err(GateError::InvalidRequestBody(
            "username and password are required".into(),
        ));
    }

    if !state.authenticate(&username, &password) {
        warn!(%username, "Login rejected");
        return Err(GateError::InvalidLogin);
    }

    let origin = client_origin(&headers, peer);
    let (credential, record) = state.sessions.issue(&username, &origin);
    info!(%username, %origin, "Login succeeded");

    Ok(Json(LoginResponse {
        success: true,
        credential,
        expires_in_seconds: clock::seconds_remaining(record.expires_at, record.created_at),
    }))
}

/// Always succeeds, whether or not the credential existed
pub async fn logout(Extension(state): Extension<AppState>, body: Bytes) -> impl IntoResponse {
    let request = serde_json::from_slice::<LogoutRequest>(&body).unwrap_or_default();
    if let Some(credential) = request.credential
        && state.sessions.revoke(&credential)
    {
        info!(credential = %redact(&credential), "Logged out");
    }

    Json(json!({ "success": true }))
}

/// Exchange a session credential for a delivery credential and redirect to the manifest
pub async fn gate(
    Extension(state): Extension<AppState>,
    AxumPath(content_id): AxumPath<String>,
    Query(query): Query<GateQuery>,
) -> Result<impl IntoResponse, GateError> {
    let session = query
        .credential
        .filter(|credential| !credential.is_empty())
        .ok_or(GateError::MissingCredential)?;

    let now = clock::now();
    let record = state
        .sessions
        .validate_at(&session, now)
        .inspect_err(|error| {
            if error.is_expired() {
                info!(%content_id, "Session expired at the gate");
            }
        })?;

    // network origin of the caller is deliberately not compared with record.origin
    let node_id = state.nodes.select().to_string();
    let (delivery, _) = state.deliveries.issue_at(&session, &node_id, &content_id, now);
    info!(identity = %record.identity, %content_id, %node_id, "Delivery token issued");

    let location = format!("/delivery/{}/manifest", urlencoding::encode(&delivery));
    let session_remaining = clock::seconds_remaining(record.expires_at, now);

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION.as_str(), location),
            (SESSION_REMAINING_HEADER, session_remaining.to_string()),
            (UPSTREAM_NODE_HEADER, node_id),
            (header::CACHE_CONTROL.as_str(), "no-store".to_string()),
        ],
    ))
}

pub async fn serve_manifest(
    Extension(state): Extension<AppState>,
    AxumPath(credential): AxumPath<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GateError> {
    let now = clock::now();
    let valid = state.deliveries.validate_at(&credential, now)?;
    let (scheme, host) = request_origin(&headers);

    let mpd = manifest::generate(&ManifestRequest {
        scheme: &scheme,
        host: &host,
        credential: &credential,
        binding: &valid.record,
        generated_at: now,
    });
    debug!(
        content_id = %valid.record.content_id,
        node_id = %valid.record.node_id,
        seconds_remaining = valid.seconds_remaining,
        "Manifest generated"
    );

    Ok((
        [
            (header::CONTENT_TYPE.as_str(), DASH_CONTENT_TYPE.to_string()),
            (TOKEN_REMAINING_HEADER, valid.seconds_remaining.to_string()),
            (header::CACHE_CONTROL.as_str(), "no-store".to_string()),
        ],
        mpd,
    ))
}

/// Re-validate the delivery credential and stream the segment from upstream
pub async fn serve_segment(
    Extension(state): Extension<AppState>,
    AxumPath((credential, segment_path)): AxumPath<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response<Body>, GateError> {
    let valid = state
        .deliveries
        .validate(&credential)
        .inspect_err(|error| {
            if error.is_expired() {
                info!(%segment_path, "Delivery token expired mid-playback");
            }
        })?;

    let range = headers.get(header::RANGE).cloned();
    let mut response = state
        .upstream
        .fetch(method, &valid.record, &segment_path, range)
        .await?;

    response.headers_mut().insert(
        TOKEN_REMAINING_HEADER,
        HeaderValue::from(valid.seconds_remaining),
    );
    Ok(response)
}

pub async fn license(body: Bytes) -> impl IntoResponse {
    let response = license_catalog::respond(&body);
    debug!(keys = response.keys.len(), "License issued");
    Json(response)
}

pub async fn health(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        sessions: state.sessions.len(),
        delivery_tokens: state.deliveries.len(),
        uptime_secs: state.uptime().as_secs(),
    })
}

pub async fn log(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(json!({ "events": state.events.snapshot() }))
}

/// Read-only view of a session record, never deletes it
pub async fn session_info(
    Extension(state): Extension<AppState>,
    AxumPath(credential): AxumPath<String>,
) -> impl IntoResponse {
    let Some(record) = state.sessions.peek(&credential) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "session not found", "status": 404 })),
        )
            .into_response();
    };

    let now = clock::now();
    Json(SessionInfo {
        expired: clock::is_expired(record.expires_at, now),
        seconds_remaining: clock::seconds_remaining(record.expires_at, now),
        identity: record.identity,
        origin: record.origin,
        created_at: record.created_at,
        expires_at: record.expires_at,
    })
    .into_response()
}
