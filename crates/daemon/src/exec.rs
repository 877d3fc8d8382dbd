//! One-shot command execution.
//!
//! Commands are either configured presets or, when enabled, free-form text.
//! Each run goes through the platform shell with a timeout; stdout and stderr
//! are captured incrementally so a timed-out run still reports what it
//! printed, and both are truncated to a configured number of characters.

use std::process::Stdio;
use std::time::{Duration, Instant};

use shellbridge_protocol::api::{Preset, RunRequest, RunResponse};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::config::ExecConfig;

/// Marker appended to truncated output.
pub const TRUNCATION_MARKER: &str = "\n\n[truncated]";

/// `source` reported for free-form commands.
pub const CUSTOM_SOURCE: &str = "custom";

const TIMEOUT_MESSAGE: &str = "Command timed out.";

#[cfg(windows)]
const POWERSHELL_PRELUDE: &str = "$ProgressPreference = 'SilentlyContinue'; \
    $OutputEncoding = [System.Text.UTF8Encoding]::new(); \
    [Console]::OutputEncoding = [System.Text.UTF8Encoding]::new(); \
    [Console]::InputEncoding = [System.Text.UTF8Encoding]::new(); ";

/// Reasons a run request is refused before anything is spawned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("Unknown presetId.")]
    UnknownPreset(String),

    #[error("Custom command is disabled.")]
    CustomDisabled,

    #[error("Command is required.")]
    CommandRequired,
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub ok: bool,
    /// Exit code; `None` if the process was ended by a signal, `-1` on
    /// timeout or spawn failure.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    fn failed(stdout: String, stderr: String) -> Self {
        Self {
            ok: false,
            code: Some(-1),
            stdout,
            stderr,
        }
    }
}

/// Cuts `text` to `max_chars` characters, appending [`TRUNCATION_MARKER`].
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Builds the platform shell invocation for `command`.
fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("powershell.exe");
        cmd.args(["-NoProfile", "-Command"])
            .arg(format!("{POWERSHELL_PRELUDE}{command}"));
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Reads `reader` to the end, appending to `buf` as data arrives.
///
/// Uses chunked reads so the bytes already read stay in `buf` if the future
/// is dropped.
async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, buf: &mut Vec<u8>) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading command output");
                break;
            }
        }
    }
}

/// Runs single commands with a timeout and bounded output.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    max_output_chars: usize,
}

impl CommandRunner {
    pub fn new(timeout: Duration, max_output_chars: usize) -> Self {
        Self {
            timeout,
            max_output_chars,
        }
    }

    fn truncate(&self, bytes: &[u8]) -> String {
        truncate_output(&String::from_utf8_lossy(bytes), self.max_output_chars)
    }

    /// Runs `command` through the platform shell.
    ///
    /// Never fails: spawn errors and timeouts are reported in the outcome.
    pub async fn run(&self, command: &str) -> CommandOutcome {
        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn command");
                return CommandOutcome::failed(String::new(), e.to_string());
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut out = Vec::new();
        let mut err = Vec::new();

        let finished = tokio::time::timeout(self.timeout, async {
            tokio::join!(drain(stdout, &mut out), drain(stderr, &mut err));
            child.wait().await
        })
        .await;

        match finished {
            Ok(Ok(status)) => CommandOutcome {
                ok: status.success(),
                code: status.code(),
                stdout: self.truncate(&out),
                stderr: self.truncate(&err),
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to wait for command");
                CommandOutcome::failed(self.truncate(&out), e.to_string())
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill timed out command");
                }
                tracing::info!(timeout_ms = self.timeout.as_millis() as u64, "Command timed out");
                CommandOutcome::failed(self.truncate(&out), TIMEOUT_MESSAGE.to_string())
            }
        }
    }
}

/// Preset lookup plus the custom-command policy in front of a
/// [`CommandRunner`].
#[derive(Debug, Clone)]
pub struct ExecGateway {
    presets: Vec<Preset>,
    allow_custom: bool,
    runner: CommandRunner,
}

impl ExecGateway {
    pub fn new(presets: Vec<Preset>, allow_custom: bool, runner: CommandRunner) -> Self {
        Self {
            presets,
            allow_custom,
            runner,
        }
    }

    pub fn from_config(config: &ExecConfig) -> Self {
        Self::new(
            config.presets.clone(),
            config.allow_custom,
            CommandRunner::new(config.timeout(), config.max_output_chars),
        )
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn allow_custom(&self) -> bool {
        self.allow_custom
    }

    /// Decides what a request runs, returning `(source, command)`.
    pub fn resolve(&self, request: &RunRequest) -> Result<(String, String), ExecError> {
        let preset_id = request.preset_id.as_deref().filter(|id| !id.is_empty());

        let selected = match preset_id {
            Some(id) => Some(
                self.presets
                    .iter()
                    .find(|preset| preset.id == id)
                    .ok_or_else(|| ExecError::UnknownPreset(id.to_string()))?,
            ),
            None => None,
        };

        match selected {
            Some(preset) if preset.command.trim().is_empty() => Err(ExecError::CommandRequired),
            Some(preset) => Ok((preset.id.clone(), preset.command.clone())),
            None if !self.allow_custom => Err(ExecError::CustomDisabled),
            None => {
                let command = request.command.as_deref().unwrap_or_default().trim();
                if command.is_empty() {
                    Err(ExecError::CommandRequired)
                } else {
                    Ok((CUSTOM_SOURCE.to_string(), command.to_string()))
                }
            }
        }
    }

    /// Resolves and runs a request.
    pub async fn execute(&self, request: &RunRequest) -> Result<RunResponse, ExecError> {
        let (source, command) = self.resolve(request)?;

        tracing::info!(source = %source, "Running command");
        let started = Instant::now();
        let outcome = self.runner.run(&command).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(source = %source, duration_ms, ok = outcome.ok, code = ?outcome.code, "Command finished");

        Ok(RunResponse {
            source,
            command,
            duration_ms,
            ok: outcome.ok,
            code: outcome.code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(id: &str, command: &str) -> Preset {
        Preset {
            id: id.to_string(),
            title: id.to_string(),
            command: command.to_string(),
            category: "Test".to_string(),
        }
    }

    fn request(preset_id: Option<&str>, command: Option<&str>) -> RunRequest {
        RunRequest {
            preset_id: preset_id.map(str::to_string),
            command: command.map(str::to_string),
        }
    }

    fn gateway(allow_custom: bool) -> ExecGateway {
        ExecGateway::new(
            vec![preset("hello", "echo hello")],
            allow_custom,
            CommandRunner::new(Duration::from_secs(5), 100),
        )
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short", 10), "short");
        assert_eq!(truncate_output("exactly", 7), "exactly");
        assert_eq!(truncate_output("abcdef", 3), "abc\n\n[truncated]");
        assert_eq!(truncate_output("", 3), "");
    }

    #[test]
    fn test_truncate_output_counts_characters() {
        assert_eq!(truncate_output("héllo", 2), "hé\n\n[truncated]");
        assert_eq!(truncate_output("✓✓✓", 3), "✓✓✓");
    }

    #[test]
    fn test_resolve_preset() {
        let gw = gateway(false);
        assert_eq!(
            gw.resolve(&request(Some("hello"), None)),
            Ok(("hello".to_string(), "echo hello".to_string()))
        );
        // A preset wins over a free-form command.
        assert_eq!(
            gw.resolve(&request(Some("hello"), Some("rm -rf /"))),
            Ok(("hello".to_string(), "echo hello".to_string()))
        );
    }

    #[test]
    fn test_resolve_unknown_preset() {
        let gw = gateway(true);
        assert_eq!(
            gw.resolve(&request(Some("nope"), Some("ls"))),
            Err(ExecError::UnknownPreset("nope".to_string()))
        );
    }

    #[test]
    fn test_resolve_custom_disabled() {
        let gw = gateway(false);
        assert_eq!(
            gw.resolve(&request(None, Some("ls"))),
            Err(ExecError::CustomDisabled)
        );
        // An empty preset id counts as absent.
        assert_eq!(
            gw.resolve(&request(Some(""), Some("ls"))),
            Err(ExecError::CustomDisabled)
        );
    }

    #[test]
    fn test_resolve_custom_command() {
        let gw = gateway(true);
        assert_eq!(
            gw.resolve(&request(None, Some("  ls -la  "))),
            Ok(("custom".to_string(), "ls -la".to_string()))
        );
        assert_eq!(
            gw.resolve(&request(None, Some("   "))),
            Err(ExecError::CommandRequired)
        );
        assert_eq!(gw.resolve(&request(None, None)), Err(ExecError::CommandRequired));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ExecError::UnknownPreset("x".into()).to_string(), "Unknown presetId.");
        assert_eq!(ExecError::CustomDisabled.to_string(), "Custom command is disabled.");
        assert_eq!(ExecError::CommandRequired.to_string(), "Command is required.");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success() {
        let runner = CommandRunner::new(Duration::from_secs(5), 100);
        let outcome = runner.run("echo hello; echo oops >&2").await;

        assert!(outcome.ok);
        assert_eq!(outcome.code, Some(0));
        assert_eq!(outcome.stdout, "hello\n");
        assert_eq!(outcome.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let runner = CommandRunner::new(Duration::from_secs(5), 100);
        let outcome = runner.run("exit 3").await;

        assert!(!outcome.ok);
        assert_eq!(outcome.code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_timeout_keeps_partial_stdout() {
        let runner = CommandRunner::new(Duration::from_millis(500), 100);
        let started = Instant::now();
        let outcome = runner.run("echo started; sleep 10").await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!outcome.ok);
        assert_eq!(outcome.code, Some(-1));
        assert_eq!(outcome.stdout, "started\n");
        assert_eq!(outcome.stderr, "Command timed out.");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_truncates_output() {
        let runner = CommandRunner::new(Duration::from_secs(5), 5);
        let outcome = runner.run("printf 0123456789").await;

        assert_eq!(outcome.stdout, "01234\n\n[truncated]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_reports_source_and_duration() {
        let gw = gateway(true);
        let response = gw.execute(&request(Some("hello"), None)).await.unwrap();

        assert_eq!(response.source, "hello");
        assert_eq!(response.command, "echo hello");
        assert!(response.ok);
        assert_eq!(response.code, Some(0));
        assert_eq!(response.stdout, "hello\n");

        let response = gw.execute(&request(None, Some("echo custom"))).await.unwrap();
        assert_eq!(response.source, "custom");
        assert_eq!(response.stdout, "custom\n");
    }

    #[tokio::test]
    async fn test_execute_refuses_before_spawning() {
        let gw = gateway(false);
        assert_eq!(
            gw.execute(&request(None, Some("echo hi"))).await,
            Err(ExecError::CustomDisabled)
        );
    }
}
