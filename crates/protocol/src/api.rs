//! JSON bodies of the HTTP API.
//!
//! Field names follow the camelCase convention of the browser client.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/terminal/session`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    /// A session id remembered by the client, if any.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response of `POST /api/terminal/session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub session_id: String,
    /// Relative URL of the terminal page for this session.
    pub terminal_url: String,
    /// Absolute WebSocket URL to attach to this session.
    pub transport_url: String,
}

/// Body of `POST /api/terminal/session/heartbeat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response of `POST /api/terminal/session/heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub ok: bool,
    pub session_id: String,
    /// Idle TTL of sessions, in milliseconds.
    pub ttl_ms: u64,
}

/// Response of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    /// Server time as an RFC 3339 timestamp.
    pub now: String,
    pub active_terminal_sessions: usize,
}

/// A named one-shot command offered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub title: String,
    pub command: String,
    pub category: String,
}

/// Response of `GET /api/presets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetList {
    pub presets: Vec<Preset>,
    pub allow_custom: bool,
}

/// Body of `POST /api/run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub preset_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Response of `POST /api/run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    /// The preset id, or `"custom"`.
    pub source: String,
    pub command: String,
    pub duration_ms: u64,
    pub ok: bool,
    /// Exit code, `-1` on timeout or spawn failure, `None` if killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Error body returned with every non-2xx API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
