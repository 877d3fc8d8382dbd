//! HTTP and WebSocket surface.
//!
//! Routes:
//! - `POST /api/terminal/session` provisions or reuses a session
//! - `POST /api/terminal/session/heartbeat` refreshes a session
//! - `GET /terminal-socket?sid=` attaches a WebSocket to a session
//! - `GET /api/health`, `GET /api/presets`, `POST /api/run`
//! - `GET /terminal-view` and other static files when a static directory is
//!   configured

mod error;
mod handlers;
mod socket;

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::exec::ExecGateway;
use crate::session::SessionRegistry;

pub use error::ApiError;

/// Maximum accepted request body.
pub const BODY_LIMIT_BYTES: usize = 32 * 1024;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub exec: Arc<ExecGateway>,
    /// Port used in transport URLs when a request carries no `Host`.
    pub port: u16,
}

/// Builds the application router.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/presets", get(handlers::presets))
        .route("/api/run", post(handlers::run))
        .route("/api/terminal/session", post(handlers::provision))
        .route("/api/terminal/session/heartbeat", post(handlers::heartbeat))
        .route("/terminal-socket", get(socket::terminal_socket));

    if let Some(dir) = static_dir {
        app = app
            .route_service("/terminal-view", ServeFile::new(dir.join("terminal-view.html")))
            .fallback_service(ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
