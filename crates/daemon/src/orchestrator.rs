//! Daemon orchestrator for wiring together all components.
//!
//! This module provides the `DaemonOrchestrator` that owns the session
//! registry, the maintenance loops and the HTTP server, and tears all of
//! them down on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::exec::ExecGateway;
use crate::server::{self, AppState};
use crate::session::{
    spawn_maintenance, ProcessSpawner, PtySpawner, SessionRegistry, ShellCommand,
};

/// How long `stop` waits for background tasks before aborting them.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Daemon orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial state, not started.
    Stopped,
    /// Starting up, initializing components.
    Starting,
    /// Running and accepting connections.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Orchestrator state changed.
    StateChanged(OrchestratorState),
    /// The HTTP listener is bound.
    Listening { addr: SocketAddr },
    /// Live sessions were killed during shutdown.
    SessionsTerminated { count: usize },
    /// Error occurred.
    Error { message: String },
}

/// Daemon orchestrator that manages all subsystems.
pub struct DaemonOrchestrator {
    /// Configuration.
    config: Config,
    /// Current state.
    state: Arc<RwLock<OrchestratorState>>,
    /// Registry of live terminal sessions.
    registry: Arc<SessionRegistry>,
    /// Preset and custom command execution.
    exec: Arc<ExecGateway>,
    /// Address the HTTP server is bound to while running.
    local_addr: RwLock<Option<SocketAddr>>,
    /// Server and maintenance tasks.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
    /// Event sender.
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

impl DaemonOrchestrator {
    /// Creates a new daemon orchestrator spawning real shells under a PTY.
    pub fn new(config: Config) -> Result<Self> {
        let command = ShellCommand::platform_default(config.session.shell.clone());
        info!(shell = %command.program, "Using shell");
        Self::with_spawner(config, Arc::new(PtySpawner::new(command)))
    }

    /// Creates a new daemon orchestrator with a custom process spawner.
    pub fn with_spawner(config: Config, spawner: Arc<dyn ProcessSpawner>) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let registry = Arc::new(SessionRegistry::new(
            spawner,
            config.session.default_size(),
            config.session.ttl(),
        ));
        let exec = Arc::new(ExecGateway::from_config(&config.exec));

        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            registry,
            exec,
            local_addr: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
            shutdown_token: CancellationToken::new(),
            event_tx,
        })
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Returns a receiver for orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Starts the daemon orchestrator.
    ///
    /// Binds the listener, then starts the HTTP server and the maintenance
    /// loops. Returns once the server is accepting connections.
    pub async fn start(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Orchestrator is already running");
            }
            *state = OrchestratorState::Starting;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting daemon orchestrator...");

        match self.start_components().await {
            Ok(addr) => {
                *self.state.write().await = OrchestratorState::Running;
                self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Running));
                info!(%addr, "Daemon orchestrator started successfully");
                Ok(())
            }
            Err(e) => {
                error!("Failed to start daemon orchestrator: {:#}", e);
                self.emit_event(OrchestratorEvent::Error {
                    message: format!("{e:#}"),
                });
                *self.state.write().await = OrchestratorState::Stopped;
                self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));
                Err(e)
            }
        }
    }

    async fn start_components(&mut self) -> Result<SocketAddr> {
        // A token cancelled by a previous stop cannot be reused.
        self.shutdown_token = CancellationToken::new();
        self.registry.reopen();

        let bind_addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind {bind_addr}"))?;
        let addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        let app = server::router(
            AppState {
                registry: Arc::clone(&self.registry),
                exec: Arc::clone(&self.exec),
                port: addr.port(),
            },
            self.config.server.static_dir.as_deref(),
        );

        let mut tasks = self.tasks.lock().await;

        let shutdown = self.shutdown_token.clone();
        let event_tx = self.event_tx.clone();
        tasks.push(tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
                let _ = event_tx.send(OrchestratorEvent::Error {
                    message: e.to_string(),
                });
            }
            debug!("HTTP server stopped");
        }));

        tasks.extend(spawn_maintenance(
            Arc::clone(&self.registry),
            self.config.session.maintenance(),
            self.shutdown_token.clone(),
        ));
        debug!("Started session maintenance tasks");

        *self.local_addr.write().await = Some(addr);
        self.emit_event(OrchestratorEvent::Listening { addr });
        info!("shellbridge listening on http://{}", addr);

        Ok(addr)
    }

    /// Stops the daemon orchestrator gracefully.
    ///
    /// Every live session is killed and its connections are closed with
    /// code 1001 before the listener stops. Provisioning requests that are
    /// still in flight are refused.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Stopped {
                return Ok(());
            }
            if *state == OrchestratorState::ShuttingDown {
                anyhow::bail!("Orchestrator is already shutting down");
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.emit_event(OrchestratorEvent::StateChanged(
            OrchestratorState::ShuttingDown,
        ));

        info!("Stopping daemon orchestrator...");

        // Kill sessions first so socket tasks deliver their close frames.
        let count = self.registry.shutdown();
        self.emit_event(OrchestratorEvent::SessionsTerminated { count });

        // Signal shutdown to all tasks
        self.shutdown_token.cancel();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for mut task in tasks {
            match tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Background task failed: {}", e),
                Err(_) => {
                    warn!("Background task did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        *self.local_addr.write().await = None;

        {
            let mut state = self.state.write().await;
            *state = OrchestratorState::Stopped;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));

        info!("Daemon orchestrator stopped");
        Ok(())
    }

    /// Emits an orchestrator event.
    fn emit_event(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Returns the bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Returns the shutdown token for external tasks to observe shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::FakeSpawner;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config
    }

    fn orchestrator() -> (DaemonOrchestrator, Arc<FakeSpawner>) {
        let spawner = FakeSpawner::new();
        let orchestrator = DaemonOrchestrator::with_spawner(
            test_config(),
            Arc::clone(&spawner) as Arc<dyn ProcessSpawner>,
        )
        .unwrap();
        (orchestrator, spawner)
    }

    #[tokio::test]
    async fn test_orchestrator_creation() {
        let (orchestrator, _) = orchestrator();
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
        assert_eq!(orchestrator.local_addr().await, None);
        assert_eq!(orchestrator.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = test_config();
        config.session.ttl_ms = 0;
        let result =
            DaemonOrchestrator::with_spawner(config, FakeSpawner::new() as Arc<dyn ProcessSpawner>);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (mut orchestrator, _) = orchestrator();
        let mut events = orchestrator.subscribe();

        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Running);
        let addr = orchestrator.local_addr().await.unwrap();
        assert_ne!(addr.port(), 0);

        let health: serde_json::Value = reqwest::get(format!("http://{addr}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["ok"], true);

        // A second start is refused while running.
        assert!(orchestrator.start().await.is_err());

        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
        assert!(orchestrator.shutdown_token().is_cancelled());

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let OrchestratorEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                OrchestratorState::Starting,
                OrchestratorState::Running,
                OrchestratorState::ShuttingDown,
                OrchestratorState::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_kills_sessions() {
        let (mut orchestrator, spawner) = orchestrator();
        orchestrator.start().await.unwrap();

        orchestrator.registry().get_or_create(None).unwrap();
        orchestrator.registry().get_or_create(None).unwrap();

        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.registry().count(), 0);
        assert_eq!(spawner.process(0).kill_count(), 1);
        assert_eq!(spawner.process(1).kill_count(), 1);
    }

    #[tokio::test]
    async fn test_provisioning_after_stop_spawns_nothing() {
        let (mut orchestrator, spawner) = orchestrator();
        orchestrator.start().await.unwrap();
        let addr = orchestrator.local_addr().await.unwrap();
        orchestrator.registry().get_or_create(None).unwrap();

        orchestrator.stop().await.unwrap();
        assert!(matches!(
            orchestrator.registry().get_or_create(None),
            Err(crate::session::SessionError::ShuttingDown)
        ));
        assert_eq!(spawner.spawn_count(), 1);
        assert_eq!(spawner.process(0).kill_count(), 1);
        assert!(reqwest::get(format!("http://{addr}/api/health")).await.is_err());

        // A restart accepts sessions again.
        orchestrator.start().await.unwrap();
        orchestrator.registry().get_or_create(None).unwrap();
        assert_eq!(orchestrator.registry().count(), 1);
        orchestrator.stop().await.unwrap();
        assert_eq!(spawner.process(1).kill_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let (orchestrator, _) = orchestrator();
        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (mut orchestrator, _) = orchestrator();
        orchestrator.start().await.unwrap();
        orchestrator.stop().await.unwrap();

        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Running);
        assert!(!orchestrator.shutdown_token().is_cancelled());
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_returns_to_stopped() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config();
        config.server.port = occupied.local_addr().unwrap().port();

        let mut orchestrator =
            DaemonOrchestrator::with_spawner(config, FakeSpawner::new() as Arc<dyn ProcessSpawner>)
                .unwrap();
        assert!(orchestrator.start().await.is_err());
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
    }
}
