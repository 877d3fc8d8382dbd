//! Pseudo-terminal process adapter.
//!
//! This module spawns a shell under a PTY and exposes it through the
//! [`TerminalProcess`] handle plus an ordered stream of [`PtyEvent`]s. The
//! broker only talks to the [`ProcessSpawner`] and [`TerminalProcess`] traits,
//! so tests can substitute a scripted process for a real shell.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session was not found or is no longer live.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Failed to spawn the PTY.
    #[error("failed to spawn PTY: {0}")]
    SpawnFailed(String),

    /// The registry is shutting down and refuses new sessions.
    #[error("server is shutting down")]
    ShuttingDown,

    /// Failed to kill the session.
    #[error("failed to kill session: {0}")]
    KillFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a shell process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process exited with a code.
    Exited(u32),
    /// The exit status could not be collected.
    Unknown,
}

/// Events produced by a running process, in production order.
///
/// Zero or more `Output` events are always followed by exactly one `Exited`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    /// Raw bytes written by the process to its terminal.
    Output(Vec<u8>),
    /// The process is gone.
    Exited(ProcessStatus),
}

/// Receiving end of a process's event stream.
pub type PtyEvents = mpsc::UnboundedReceiver<PtyEvent>;

/// Terminal geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl From<TerminalSize> for PtySize {
    fn from(size: TerminalSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// Handle to one live shell process.
///
/// `write` and `resize` never fail from the caller's point of view: once the
/// process is gone they become no-ops.
pub trait TerminalProcess: Send + Sync {
    /// Operating system process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Queues bytes for the process's stdin. Order is preserved.
    fn write(&self, data: &[u8]);

    /// Best-effort terminal resize.
    fn resize(&self, size: TerminalSize);

    /// Terminates the process. Killing an exited process succeeds.
    fn kill(&self) -> Result<(), SessionError>;

    /// Whether the process is still believed to be running.
    fn is_running(&self) -> bool;
}

/// Factory for shell processes.
pub trait ProcessSpawner: Send + Sync {
    /// Starts a new process with the given terminal size.
    fn spawn(&self, size: TerminalSize) -> Result<(Box<dyn TerminalProcess>, PtyEvents), SessionError>;
}

/// Buffer size for reading from PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Capacity of the reader-to-pump channel.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// How long output still in flight is drained after the process exits.
const EXIT_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// How often the waiter thread polls the child for an exit status.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Terminal type advertised to spawned shells.
pub const TERM: &str = "xterm-256color";

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    /// A command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The interactive shell for this platform.
    ///
    /// On Unix the shell is started with `-i` so it stays up without a
    /// controlling script. On Windows PowerShell is kept open with `-NoExit`
    /// and its console encodings are switched to UTF-8.
    pub fn platform_default(shell: Option<String>) -> Self {
        if cfg!(windows) {
            let program = shell.unwrap_or_else(|| "powershell.exe".to_string());
            Self::new(program).with_args([
                "-NoProfile",
                "-NoLogo",
                "-NoExit",
                "-Command",
                "chcp 65001 > $null; \
                 $OutputEncoding = New-Object System.Text.UTF8Encoding($false); \
                 [Console]::OutputEncoding = New-Object System.Text.UTF8Encoding($false); \
                 [Console]::InputEncoding = New-Object System.Text.UTF8Encoding($false);",
            ])
        } else {
            Self::new(detect_shell(shell)).with_args(["-i"])
        }
    }
}

/// Detects the shell to use.
///
/// Returns the shell in this order of preference:
/// 1. The provided shell if Some
/// 2. The $SHELL environment variable
/// 3. bash as fallback
fn detect_shell(shell: Option<String>) -> String {
    if let Some(s) = shell.filter(|s| !s.is_empty()) {
        return s;
    }

    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "bash".to_string())
}

/// Environment overrides applied on top of the inherited environment.
///
/// Locale and encoding variables default to UTF-8 when unset, and the
/// terminal type is always forced to [`TERM`].
pub fn shell_environment() -> Vec<(String, String)> {
    let inherit_or = |key: &str, default: &str| {
        let value = std::env::var(key)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string());
        (key.to_string(), value)
    };

    vec![
        inherit_or("LANG", "en_US.UTF-8"),
        inherit_or("LC_ALL", "en_US.UTF-8"),
        inherit_or("PYTHONIOENCODING", "utf-8"),
        ("TERM".to_string(), TERM.to_string()),
    ]
}

/// Spawns real shells under the native PTY system.
#[derive(Debug, Clone)]
pub struct PtySpawner {
    command: ShellCommand,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl PtySpawner {
    /// A spawner for `command` with the UTF-8 shell environment and the
    /// daemon's working directory.
    pub fn new(command: ShellCommand) -> Self {
        Self {
            command,
            env: shell_environment(),
            cwd: std::env::current_dir().ok(),
        }
    }

    /// Adds one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl ProcessSpawner for PtySpawner {
    fn spawn(&self, size: TerminalSize) -> Result<(Box<dyn TerminalProcess>, PtyEvents), SessionError> {
        let (process, events) = PtyProcess::spawn(&self.command, size, &self.env, self.cwd.as_ref())?;
        Ok((Box::new(process), events))
    }
}

/// A shell process running under a pseudo-terminal.
///
/// Three helper threads serve the process: a reader feeding output into the
/// event pump, a writer draining the ordered input queue, and a waiter that
/// collects the exit status.
pub struct PtyProcess {
    /// The PTY master handle, kept for resizes.
    master: Mutex<Box<dyn MasterPty + Send>>,

    /// Input queue drained by the writer thread.
    input_tx: mpsc::UnboundedSender<Vec<u8>>,

    /// The child, shared with the waiter thread that polls it for exit.
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,

    /// Set by the waiter once the exit status has been collected.
    reaped: Arc<AtomicBool>,

    /// Cleared once the exit event has been emitted.
    running: Arc<AtomicBool>,

    /// Process ID.
    pid: Option<u32>,
}

impl PtyProcess {
    /// Spawns `command` under a new PTY.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        command: &ShellCommand,
        size: TerminalSize,
        env: &[(String, String)],
        cwd: Option<&PathBuf>,
    ) -> Result<(Self, PtyEvents), SessionError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(size.into())
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        // The slave must be closed on our side so the reader sees EOF once
        // the shell goes away.
        drop(pair.slave);

        let pid = child.process_id();
        let child = Arc::new(Mutex::new(child));
        let reaped = Arc::new(AtomicBool::new(false));

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        spawn_thread("pty-reader", move || read_loop(reader, chunk_tx))?;
        spawn_thread("pty-writer", move || write_loop(writer, input_rx))?;
        let waited = Arc::clone(&child);
        let waiter_reaped = Arc::clone(&reaped);
        spawn_thread("pty-waiter", move || {
            let status = wait_loop(&waited, &waiter_reaped);
            let _ = exit_tx.send(status);
        })?;

        tokio::spawn(pump_events(chunk_rx, exit_rx, event_tx, Arc::clone(&running), pid));

        tracing::debug!(
            pid = ?pid,
            program = %command.program,
            cols = size.cols,
            rows = size.rows,
            "Spawned PTY process"
        );

        let process = PtyProcess {
            master: Mutex::new(pair.master),
            input_tx,
            child,
            reaped,
            running,
            pid,
        };

        Ok((process, event_rx))
    }
}

impl TerminalProcess for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn write(&self, data: &[u8]) {
        if !self.is_running() || self.input_tx.send(data.to_vec()).is_err() {
            tracing::trace!(pid = ?self.pid, "Dropping input for exited process");
        }
    }

    fn resize(&self, size: TerminalSize) {
        if !self.is_running() {
            return;
        }
        let result = match self.master.lock() {
            Ok(master) => master.resize(size.into()).map_err(|e| e.to_string()),
            Err(_) => Err("master lock poisoned".to_string()),
        };
        if let Err(e) = result {
            tracing::trace!(pid = ?self.pid, error = %e, "Ignoring failed PTY resize");
        }
    }

    fn kill(&self) -> Result<(), SessionError> {
        let mut child = self
            .child
            .lock()
            .map_err(|_| SessionError::KillFailed("child lock poisoned".to_string()))?;
        // The waiter sets this under the same lock, so a reaped pid is never
        // signalled.
        if self.reaped.load(Ordering::SeqCst) {
            return Ok(());
        }
        // An earlier kill may already have reaped it while waiting out the
        // grace period.
        if let Ok(Some(_)) = child.try_wait() {
            self.reaped.store(true, Ordering::SeqCst);
            return Ok(());
        }

        // SIGHUP first, then SIGKILL if the child is still there shortly after.
        child
            .kill()
            .map_err(|e| SessionError::KillFailed(e.to_string()))?;

        tracing::debug!(pid = ?self.pid, "Killed PTY process");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Polls the child until it exits, releasing the lock between polls so
/// `kill` can reach it.
fn wait_loop(child: &Mutex<Box<dyn Child + Send + Sync>>, reaped: &AtomicBool) -> ProcessStatus {
    loop {
        let polled = match child.lock() {
            Ok(mut child) => match child.try_wait() {
                Ok(Some(status)) => {
                    reaped.store(true, Ordering::SeqCst);
                    Some(ProcessStatus::Exited(status.exit_code()))
                }
                Ok(None) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to collect shell exit status");
                    reaped.store(true, Ordering::SeqCst);
                    Some(ProcessStatus::Unknown)
                }
            },
            Err(_) => Some(ProcessStatus::Unknown),
        };
        match polled {
            Some(status) => return status,
            None => thread::sleep(WAIT_POLL_INTERVAL),
        }
    }
}

fn spawn_thread<F>(name: &str, f: F) -> Result<(), SessionError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map(|_| ())
        .map_err(|e| SessionError::SpawnFailed(e.to_string()))
}

fn read_loop(mut reader: Box<dyn Read + Send>, chunk_tx: mpsc::Sender<Vec<u8>>) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break, // EOF
            Ok(n) => {
                if chunk_tx.blocking_send(buffer[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is how Linux reports a closed PTY.
                tracing::trace!(error = %e, "PTY read ended");
                break;
            }
        }
    }
}

fn write_loop(mut writer: Box<dyn Write + Send>, mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = input_rx.blocking_recv() {
        if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
            tracing::trace!(error = %e, "PTY write failed, stopping writer");
            break;
        }
    }
}

/// Forwards output chunks as events and emits the single exit event.
async fn pump_events(
    mut chunks: mpsc::Receiver<Vec<u8>>,
    mut exit_rx: oneshot::Receiver<ProcessStatus>,
    events: mpsc::UnboundedSender<PtyEvent>,
    running: Arc<AtomicBool>,
    pid: Option<u32>,
) {
    enum Ended {
        ReaderClosed,
        Exited(ProcessStatus),
    }

    let ended = loop {
        tokio::select! {
            biased;
            chunk = chunks.recv() => match chunk {
                Some(data) => {
                    let _ = events.send(PtyEvent::Output(data));
                }
                None => break Ended::ReaderClosed,
            },
            status = &mut exit_rx => {
                break Ended::Exited(status.unwrap_or(ProcessStatus::Unknown));
            }
        }
    };

    let status = match ended {
        Ended::ReaderClosed => exit_rx.await.unwrap_or(ProcessStatus::Unknown),
        Ended::Exited(status) => {
            // Background jobs can keep the PTY open after the shell exits;
            // forward what is already buffered and stop there.
            while let Ok(Some(data)) = tokio::time::timeout(EXIT_DRAIN_TIMEOUT, chunks.recv()).await {
                let _ = events.send(PtyEvent::Output(data));
            }
            status
        }
    };

    running.store(false, Ordering::SeqCst);
    tracing::info!(pid = ?pid, status = ?status, "PTY process exited");
    let _ = events.send(PtyEvent::Exited(status));
}
