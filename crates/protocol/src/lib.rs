//! # shellbridge Protocol Library
//!
//! Shared vocabulary between the shellbridge daemon and its browser clients.
//!
//! ## Overview
//!
//! - **Session identifiers**: generation and the strict syntactic check applied
//!   to client-supplied ids
//! - **Transport messages**: the JSON frames exchanged over the terminal
//!   WebSocket, plus lenient parsing of inbound frames
//! - **API bodies**: request/response types of the HTTP endpoints
//!
//! ## Example Usage
//!
//! ```rust
//! use shellbridge_protocol::{ClientFrame, ServerMessage, SessionId};
//!
//! let id = SessionId::generate();
//! let ready = ServerMessage::Ready { session_id: id.to_string() };
//! let json = ready.to_json().unwrap();
//! assert!(json.contains("\"type\":\"ready\""));
//!
//! // Non-JSON frames are raw keyboard input.
//! assert_eq!(ClientFrame::parse("ls\r"), ClientFrame::Raw("ls\r".to_string()));
//! ```
//!
//! ## Modules
//!
//! - [`session_id`]: Session identifier type and validation
//! - [`messages`]: Transport message definitions and close codes
//! - [`api`]: HTTP API bodies
//! - [`error`]: Error types

pub mod api;
pub mod error;
pub mod messages;
pub mod session_id;

pub use error::{ProtocolError, Result};
pub use messages::{
    close_code, ClientFrame, ClientMessage, ServerMessage, REASON_INVALID_SESSION,
    REASON_SERVER_SHUTDOWN, REASON_SESSION_ENDED,
};
pub use session_id::{is_valid_session_id, SessionId, MIN_SESSION_ID_LEN};
