//! Session identifiers.
//!
//! A session id is a pure lookup key. Server-generated ids are UUID v4
//! strings; ids supplied by clients are accepted only if they consist of
//! hexadecimal digits and hyphens and are at least [`MIN_SESSION_ID_LEN`]
//! characters long.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Minimum length of a client-supplied session id.
pub const MIN_SESSION_ID_LEN: usize = 8;

/// Unique identifier for a terminal session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parses a candidate id, rejecting anything outside `[0-9a-fA-F-]{8,}`.
    pub fn parse(candidate: &str) -> Result<Self, ProtocolError> {
        if is_valid_session_id(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(ProtocolError::InvalidSessionId(candidate.to_string()))
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returns true if `candidate` passes the syntactic session id check.
pub fn is_valid_session_id(candidate: &str) -> bool {
    candidate.len() >= MIN_SESSION_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_hexdigit() || b == b'-')
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_session_id(&value) {
            Ok(Self(value))
        } else {
            Err(ProtocolError::InvalidSessionId(value))
        }
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
