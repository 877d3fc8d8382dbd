//! JSON endpoint handlers.
//!
//! Request bodies are parsed leniently: an empty or malformed body behaves
//! like one with every field absent.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;
use shellbridge_protocol::{
    api::{
        HealthResponse, HeartbeatRequest, HeartbeatResponse, PresetList, ProvisionRequest,
        ProvisionResponse, RunRequest, RunResponse,
    },
    is_valid_session_id,
};

use super::error::ApiError;
use super::AppState;

/// Parses a JSON body, treating an empty or malformed one as all defaults.
fn lenient_body<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    if body.is_empty() {
        return T::default();
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Ignoring malformed request body");
        T::default()
    })
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `/terminal-view?sid=<id>`
pub(super) fn terminal_url(session_id: &str) -> String {
    format!("/terminal-view?sid={}", encode(session_id))
}

/// `ws[s]://<host>/terminal-socket?sid=<id>`, derived from the request
/// headers with a loopback fallback for the host.
pub(super) fn transport_url(headers: &HeaderMap, port: u16, session_id: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("127.0.0.1:{port}"));

    let secure = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|proto| proto.starts_with("https"));
    let scheme = if secure { "wss" } else { "ws" };

    format!("{scheme}://{host}/terminal-socket?sid={}", encode(session_id))
}

pub(super) async fn provision(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProvisionResponse>, ApiError> {
    let request: ProvisionRequest = lenient_body(&body);
    let session = state
        .registry
        .get_or_create(request.session_id.as_deref())?;
    let id = session.id().as_str();

    Ok(Json(ProvisionResponse {
        session_id: id.to_string(),
        terminal_url: terminal_url(id),
        transport_url: transport_url(&headers, state.port, id),
    }))
}

pub(super) async fn heartbeat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let request: HeartbeatRequest = lenient_body(&body);
    let id = request.session_id.as_deref().map(str::trim).unwrap_or_default();
    if !is_valid_session_id(id) {
        return Err(ApiError::InvalidSessionId);
    }

    let session = state.registry.touch(id).ok_or(ApiError::SessionNotFound)?;
    Ok(Json(HeartbeatResponse {
        ok: true,
        session_id: session.id().to_string(),
        ttl_ms: state.registry.ttl().as_millis() as u64,
    }))
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        now: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        active_terminal_sessions: state.registry.count(),
    })
}

pub(super) async fn presets(State(state): State<AppState>) -> Json<PresetList> {
    Json(PresetList {
        presets: state.exec.presets().to_vec(),
        allow_custom: state.exec.allow_custom(),
    })
}

pub(super) async fn run(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RunResponse>, ApiError> {
    let request: RunRequest = lenient_body(&body);
    let response = state.exec.execute(&request).await?;
    Ok(Json(response))
}
