//! # shellbridge Daemon Library
//!
//! This crate provides the server side of shellbridge: persistent shell
//! sessions that a browser can attach to, detach from and reattach to over
//! WebSocket, plus a small preset-driven command runner.
//!
//! ## Overview
//!
//! - **PTY Sessions**: one shell process per session, kept alive across page
//!   reloads and reaped only after sitting unattached past an idle TTL
//! - **Fan-out**: process output is delivered in order to every attached
//!   connection
//! - **Command Execution**: one-shot preset or custom commands with a timeout
//!   and bounded output
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Daemon Orchestrator                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │  HTTP server: provisioning, heartbeat, exec, static   │  │
//! │  │  WebSocket transport: /terminal-socket?sid=<id>       │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │  ┌──────────────────┐  ┌────────────────────────────────┐   │
//! │  │ Session Registry │  │ Maintenance: sweep + heartbeat │   │
//! │  └──────────────────┘  └────────────────────────────────┘   │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │            PTY process adapter (portable-pty)         │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shellbridge::{Config, DaemonOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::resolve(None)?;
//!
//!     let mut orchestrator = DaemonOrchestrator::new(config)?;
//!     orchestrator.start().await?;
//!
//!     // Wait for shutdown signal...
//!
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, environment overrides and validation
//! - [`session`]: PTY spawning, session registry, fan-out and maintenance
//! - [`exec`]: One-shot command execution
//! - [`server`]: HTTP routes and the WebSocket transport
//! - [`orchestrator`]: Main daemon coordinator

pub mod config;
pub mod exec;
pub mod orchestrator;
pub mod server;
pub mod session;

// Re-export protocol for convenience
pub use shellbridge_protocol as protocol;

pub use config::{Config, ConfigError};
pub use exec::{CommandOutcome, CommandRunner, ExecError, ExecGateway};
pub use orchestrator::{DaemonOrchestrator, OrchestratorEvent, OrchestratorState};
pub use server::{router, ApiError, AppState};
pub use session::{
    ProcessSpawner, PtySpawner, Session, SessionError, SessionRegistry, ShellCommand,
    TerminalProcess, TerminalSize,
};
