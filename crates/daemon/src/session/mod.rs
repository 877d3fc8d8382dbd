//! Session management module.
//!
//! This module provides PTY spawning, the session registry and output
//! fan-out. Sessions are provisioned, attached to, detached from, resized,
//! and reaped when idle.

pub mod lifecycle;
pub mod multiplexer;
pub mod pty;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use lifecycle::{spawn_maintenance, MaintenanceConfig};
pub use multiplexer::{ClientHandle, ClientId, ClientSet, ClientStats, Outbound, Utf8Decoder};
pub use pty::{
    ProcessSpawner, ProcessStatus, PtyEvent, PtyEvents, PtyProcess, PtySpawner, SessionError,
    ShellCommand, TerminalProcess, TerminalSize,
};
pub use registry::{now_millis, Attachment, Session, SessionRegistry};
