//! Transport message definitions for shellbridge.
//!
//! Every WebSocket text frame carries one JSON object tagged by `type`.
//! Clients send [`ClientMessage`]s, the server sends [`ServerMessage`]s.
//! Inbound frames are interpreted leniently through [`ClientFrame::parse`]:
//! anything that is not JSON is treated as raw keyboard input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// WebSocket close codes used by the broker.
pub mod close_code {
    /// The server is shutting down.
    pub const GOING_AWAY: u16 = 1001;
    /// The connection did not reference a live session.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// The session's shell process exited or was reaped.
    pub const SESSION_ENDED: u16 = 1011;
}

/// Close reason sent with [`close_code::POLICY_VIOLATION`].
pub const REASON_INVALID_SESSION: &str = "Invalid terminal session";

/// Close reason sent with [`close_code::SESSION_ENDED`].
pub const REASON_SESSION_ENDED: &str = "Session ended";

/// Close reason sent with [`close_code::GOING_AWAY`].
pub const REASON_SERVER_SHUTDOWN: &str = "Server shutting down";

/// Messages sent from a browser client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Keyboard input to write verbatim to the shell.
    Input {
        #[serde(default)]
        data: String,
    },
    /// Terminal geometry change.
    Resize { cols: i64, rows: i64 },
    /// Application-level keepalive; answered with [`ServerMessage::Pong`].
    Ping {},
}

/// Messages sent from the server to a browser client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Sent once, first, when a connection attaches to a session.
    Ready {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Raw shell output.
    Output { data: String },
    /// Reply to a client ping.
    Pong,
    /// Periodic liveness probe carrying the server time in epoch milliseconds.
    Ping { data: u64 },
}

impl ServerMessage {
    /// Serializes the message to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a server message from its JSON wire form.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ClientMessage {
    /// Serializes the message to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An inbound frame after lenient interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Structured input.
    Input(String),
    /// A validated, positive terminal geometry.
    Resize { cols: u16, rows: u16 },
    /// Client keepalive.
    Ping,
    /// Unstructured text to write straight to the shell.
    Raw(String),
    /// A structured frame that carries nothing actionable.
    Ignored,
}

impl ClientFrame {
    /// Interprets one inbound text frame.
    ///
    /// Never fails: text that is not JSON becomes [`ClientFrame::Raw`],
    /// non-object JSON values become raw text of their value, and objects with
    /// an unknown `type` or invalid fields become [`ClientFrame::Ignored`].
    pub fn parse(text: &str) -> Self {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(_) => return ClientFrame::Raw(text.to_string()),
        };

        match value {
            Value::Object(_) => match serde_json::from_value::<ClientMessage>(value) {
                Ok(ClientMessage::Input { data }) => ClientFrame::Input(data),
                Ok(ClientMessage::Resize { cols, rows }) => {
                    match (dimension(cols), dimension(rows)) {
                        (Some(cols), Some(rows)) => ClientFrame::Resize { cols, rows },
                        _ => ClientFrame::Ignored,
                    }
                }
                Ok(ClientMessage::Ping {}) => ClientFrame::Ping,
                Err(_) => ClientFrame::Ignored,
            },
            Value::String(s) => ClientFrame::Raw(s),
            Value::Null => ClientFrame::Raw(String::new()),
            other => ClientFrame::Raw(other.to_string()),
        }
    }
}

fn dimension(value: i64) -> Option<u16> {
    u16::try_from(value).ok().filter(|v| *v > 0)
}
