//! Configuration management for the shellbridge daemon.
//!
//! This module provides TOML-based configuration file loading and saving,
//! environment variable overrides and validation. The default configuration
//! path is `~/.config/shellbridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shellbridge_protocol::api::Preset;
use thiserror::Error;

use crate::session::{MaintenanceConfig, TerminalSize};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("heartbeat_interval_ms ({heartbeat_ms}) must be at most a tenth of ttl_ms ({ttl_ms})")]
    HeartbeatTooSlow { heartbeat_ms: u64, ttl_ms: u64 },

    #[error("cleanup_interval_ms ({cleanup_ms}) must not exceed ttl_ms ({ttl_ms})")]
    CleanupTooSlow { cleanup_ms: u64, ttl_ms: u64 },

    #[error("shell does not exist: {0}")]
    InvalidShellPath(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("preset id {0:?} is empty or duplicated")]
    InvalidPresetId(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the shellbridge daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// Terminal session configuration.
    pub session: SessionConfig,

    /// One-shot command execution configuration.
    pub exec: ExecConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,

    /// Port to bind. 0 picks a free port.
    pub port: u16,

    /// Directory holding `terminal-view.html` and other static assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

/// Terminal session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell to start for new sessions. Unset means the platform default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// How long a session may sit with no attached connection.
    pub ttl_ms: u64,

    /// Period of the idle sweep.
    pub cleanup_interval_ms: u64,

    /// Period of the connection heartbeat.
    pub heartbeat_interval_ms: u64,

    /// Initial terminal width.
    pub default_cols: u16,

    /// Initial terminal height.
    pub default_rows: u16,
}

/// One-shot command execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecConfig {
    /// Maximum run time of one command.
    pub timeout_ms: u64,

    /// Characters of stdout/stderr kept before truncation.
    pub max_output_chars: usize,

    /// Whether `/api/run` accepts free-form commands.
    pub allow_custom: bool,

    /// Commands offered by `/api/presets`.
    pub presets: Vec<Preset>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7680,
            static_dir: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: None,
            ttl_ms: 12 * 60 * 60 * 1000, // 12 hours
            cleanup_interval_ms: 20_000,
            heartbeat_interval_ms: 15_000,
            default_cols: 120,
            default_rows: 36,
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_output_chars: 12_000,
            allow_custom: false,
            presets: default_presets(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn default_size(&self) -> TerminalSize {
        TerminalSize::new(self.default_cols, self.default_rows)
    }

    pub fn maintenance(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            cleanup_interval: Duration::from_millis(self.cleanup_interval_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn preset(id: &str, title: &str, command: &str, category: &str) -> Preset {
    Preset {
        id: id.to_string(),
        title: title.to_string(),
        command: command.to_string(),
        category: category.to_string(),
    }
}

/// Returns the built-in presets for the current platform.
pub fn default_presets() -> Vec<Preset> {
    let mut presets = vec![
        preset("node-ver", "Node Version", "node -v", "Tooling"),
        preset("git-status", "Git Status", "git status --short", "Git"),
        preset("git-branch", "Git Branch", "git branch --show-current", "Git"),
        preset("git-log", "Git Last 8", "git log --oneline -n 8", "Git"),
    ];

    if cfg!(windows) {
        presets.extend([
            preset("cwd", "Current Path", "Get-Location", "Project"),
            preset(
                "files",
                "Top Files",
                "Get-ChildItem -Force | Select-Object -First 20",
                "Project",
            ),
            preset(
                "find-todo",
                "Find TODO",
                "Get-ChildItem -Recurse -File | Select-String -Pattern 'TODO' | Select-Object -First 30",
                "Project",
            ),
        ]);
    } else {
        presets.extend([
            preset("cwd", "Current Path", "pwd", "Project"),
            preset("files", "Top Files", "ls -la | head -n 20", "Project"),
            preset(
                "find-todo",
                "Find TODO",
                "grep -rn TODO . 2>/dev/null | head -n 30",
                "Project",
            ),
        ]);
    }

    presets
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shellbridge")
        .join("config.toml")
}

/// Reads a non-empty environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Reads and parses an environment variable, warning when it cannot be parsed.
fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = env_value(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

fn override_from_env<T: FromStr + std::fmt::Debug>(name: &str, target: &mut T) {
    if let Some(value) = env_parsed(name) {
        tracing::info!(variable = name, value = ?value, "Overriding from environment");
        *target = value;
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Empty values are ignored; unparsable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        override_from_env("SHELLBRIDGE_HOST", &mut self.server.host);
        override_from_env("SHELLBRIDGE_PORT", &mut self.server.port);
        override_from_env("SHELLBRIDGE_LOG_LEVEL", &mut self.daemon.log_level);

        if let Some(shell) = env_value("SHELLBRIDGE_SHELL") {
            tracing::info!(shell = %shell, "Overriding shell from environment");
            self.session.shell = Some(shell);
        }

        override_from_env("SHELLBRIDGE_SESSION_TTL_MS", &mut self.session.ttl_ms);
        override_from_env(
            "SHELLBRIDGE_CLEANUP_INTERVAL_MS",
            &mut self.session.cleanup_interval_ms,
        );
        override_from_env(
            "SHELLBRIDGE_HEARTBEAT_INTERVAL_MS",
            &mut self.session.heartbeat_interval_ms,
        );
        override_from_env("SHELLBRIDGE_DEFAULT_COLS", &mut self.session.default_cols);
        override_from_env("SHELLBRIDGE_DEFAULT_ROWS", &mut self.session.default_rows);
        override_from_env("SHELLBRIDGE_RUN_TIMEOUT_MS", &mut self.exec.timeout_ms);
        override_from_env("SHELLBRIDGE_MAX_OUTPUT_CHARS", &mut self.exec.max_output_chars);
        override_from_env("SHELLBRIDGE_ALLOW_CUSTOM", &mut self.exec.allow_custom);
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        let nonzero = [
            ("ttl_ms", session.ttl_ms),
            ("cleanup_interval_ms", session.cleanup_interval_ms),
            ("heartbeat_interval_ms", session.heartbeat_interval_ms),
            ("default_cols", u64::from(session.default_cols)),
            ("default_rows", u64::from(session.default_rows)),
            ("timeout_ms", self.exec.timeout_ms),
            ("max_output_chars", self.exec.max_output_chars as u64),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(name));
        }

        if session.heartbeat_interval_ms.saturating_mul(10) > session.ttl_ms {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat_ms: session.heartbeat_interval_ms,
                ttl_ms: session.ttl_ms,
            });
        }

        if session.cleanup_interval_ms > session.ttl_ms {
            return Err(ConfigError::CleanupTooSlow {
                cleanup_ms: session.cleanup_interval_ms,
                ttl_ms: session.ttl_ms,
            });
        }

        // An explicit shell must exist, either as a path or on PATH.
        if let Some(shell) = &session.shell {
            let shell_path = Path::new(shell);
            let found = if shell_path.is_absolute() {
                shell_path.exists()
            } else {
                which::which(shell).is_ok()
            };
            if !found {
                return Err(ConfigError::InvalidShellPath(shell.clone()));
            }
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        let mut seen = std::collections::HashSet::new();
        for preset in &self.exec.presets {
            if preset.id.trim().is_empty() || !seen.insert(preset.id.as_str()) {
                return Err(ConfigError::InvalidPresetId(preset.id.clone()));
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Loads a file, applies environment overrides and validates the result.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::load_default()?,
        };
        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "SHELLBRIDGE_HOST",
        "SHELLBRIDGE_PORT",
        "SHELLBRIDGE_LOG_LEVEL",
        "SHELLBRIDGE_SHELL",
        "SHELLBRIDGE_SESSION_TTL_MS",
        "SHELLBRIDGE_CLEANUP_INTERVAL_MS",
        "SHELLBRIDGE_HEARTBEAT_INTERVAL_MS",
        "SHELLBRIDGE_DEFAULT_COLS",
        "SHELLBRIDGE_DEFAULT_ROWS",
        "SHELLBRIDGE_RUN_TIMEOUT_MS",
        "SHELLBRIDGE_MAX_OUTPUT_CHARS",
        "SHELLBRIDGE_ALLOW_CUSTOM",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 7680);
        assert_eq!(config.server.static_dir, None);
        assert_eq!(config.session.shell, None);
        assert_eq!(config.session.ttl_ms, 43_200_000);
        assert_eq!(config.session.cleanup_interval_ms, 20_000);
        assert_eq!(config.session.heartbeat_interval_ms, 15_000);
        assert_eq!(config.session.default_size(), TerminalSize::new(120, 36));
        assert_eq!(config.exec.timeout_ms, 15_000);
        assert_eq!(config.exec.max_output_chars, 12_000);
        assert!(!config.exec.allow_custom);
        assert!(!config.exec.presets.is_empty());
    }

    #[test]
    fn test_default_presets_have_unique_ids() {
        let presets = default_presets();
        let mut ids: Vec<_> = presets.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), presets.len());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[daemon]
log_level = "debug"

[session]
ttl_ms = 60000
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.session.ttl_ms, 60_000);
        assert_eq!(config.session.default_cols, 120);
        assert_eq!(config.server.port, 7680);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "trace"

[server]
host = "127.0.0.1"
port = 9000
static_dir = "/srv/shellbridge"

[session]
shell = "/bin/sh"
ttl_ms = 600000
cleanup_interval_ms = 5000
heartbeat_interval_ms = 1000
default_cols = 80
default_rows = 24

[exec]
timeout_ms = 2000
max_output_chars = 100
allow_custom = true

[[exec.presets]]
id = "uptime"
title = "Uptime"
command = "uptime"
category = "System"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "trace");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.server.static_dir,
            Some(PathBuf::from("/srv/shellbridge"))
        );
        assert_eq!(config.session.shell.as_deref(), Some("/bin/sh"));
        assert_eq!(config.session.ttl(), Duration::from_secs(600));
        assert_eq!(
            config.session.maintenance(),
            MaintenanceConfig {
                cleanup_interval: Duration::from_secs(5),
                heartbeat_interval: Duration::from_secs(1),
            }
        );
        assert_eq!(config.session.default_size(), TerminalSize::new(80, 24));
        assert_eq!(config.exec.timeout(), Duration::from_secs(2));
        assert_eq!(config.exec.max_output_chars, 100);
        assert!(config.exec.allow_custom);
        assert_eq!(config.exec.presets.len(), 1);
        assert_eq!(config.exec.presets[0].id, "uptime");
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[daemon\nlog_level = \"debug\"");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[session]
ttl_ms = "not a number"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.daemon.log_level = "warn".to_string();
        original.server.static_dir = Some(PathBuf::from("/tmp/assets"));
        original.session.shell = Some("/bin/sh".to_string());
        original.exec.allow_custom = true;

        let toml = original.to_toml().unwrap();
        assert!(toml.contains("[session]"));
        assert!(toml.contains("[[exec.presets]]"));

        let loaded = Config::from_toml(&toml).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.session.ttl_ms = 120_000;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("shellbridge"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("SHELLBRIDGE_HOST", "127.0.0.1");
        std::env::set_var("SHELLBRIDGE_PORT", "8123");
        std::env::set_var("SHELLBRIDGE_SESSION_TTL_MS", "300000");
        std::env::set_var("SHELLBRIDGE_DEFAULT_COLS", "100");
        std::env::set_var("SHELLBRIDGE_ALLOW_CUSTOM", "true");
        std::env::set_var("SHELLBRIDGE_SHELL", "/bin/sh");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.session.ttl_ms, 300_000);
        assert_eq!(config.session.default_cols, 100);
        assert!(config.exec.allow_custom);
        assert_eq!(config.session.shell.as_deref(), Some("/bin/sh"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_or_invalid_is_ignored() {
        clear_env();
        std::env::set_var("SHELLBRIDGE_PORT", "");
        std::env::set_var("SHELLBRIDGE_SESSION_TTL_MS", "soon");
        std::env::set_var("SHELLBRIDGE_DEFAULT_ROWS", "-4");
        std::env::set_var("SHELLBRIDGE_LOG_LEVEL", "  ");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_resolve_applies_env_and_validates() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[session]\nttl_ms = 600000\n").unwrap();

        std::env::set_var("SHELLBRIDGE_HEARTBEAT_INTERVAL_MS", "1000");
        let config = Config::resolve(Some(&config_path)).unwrap();
        assert_eq!(config.session.ttl_ms, 600_000);
        assert_eq!(config.session.heartbeat_interval_ms, 1000);

        std::env::set_var("SHELLBRIDGE_HEARTBEAT_INTERVAL_MS", "60001");
        assert!(Config::resolve(Some(&config_path)).is_err());

        clear_env();
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = Config::default();
        config.session.default_rows = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("default_rows")));

        let mut config = Config::default();
        config.exec.max_output_chars = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("max_output_chars")));
    }

    #[test]
    fn test_validate_heartbeat_against_ttl() {
        let mut config = Config::default();
        config.session.ttl_ms = 100_000;
        config.session.cleanup_interval_ms = 1_000;

        config.session.heartbeat_interval_ms = 10_000;
        assert!(config.validate().is_ok());

        config.session.heartbeat_interval_ms = 10_001;
        assert_eq!(
            config.validate(),
            Err(ConfigError::HeartbeatTooSlow {
                heartbeat_ms: 10_001,
                ttl_ms: 100_000
            })
        );
    }

    #[test]
    fn test_validate_cleanup_against_ttl() {
        let mut config = Config::default();
        config.session.ttl_ms = 200_000;
        config.session.heartbeat_interval_ms = 1_000;
        config.session.cleanup_interval_ms = 200_001;
        assert_eq!(
            config.validate(),
            Err(ConfigError::CleanupTooSlow {
                cleanup_ms: 200_001,
                ttl_ms: 200_000
            })
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_shell() {
        let mut config = Config::default();
        config.session.shell = Some("/bin/sh".to_string());
        assert!(config.validate().is_ok());

        config.session.shell = Some("sh".to_string());
        assert!(config.validate().is_ok());

        config.session.shell = Some("/nonexistent/path/to/shell".to_string());
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShellPath(
                "/nonexistent/path/to/shell".to_string()
            ))
        );

        config.session.shell = Some("nonexistent_shell_xyz".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        for level in ["trace", "debug", "info", "warn", "error", "DEBUG"] {
            config.daemon.log_level = level.to_string();
            assert!(config.validate().is_ok(), "{level} should be accepted");
        }

        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_validate_duplicate_preset() {
        let mut config = Config::default();
        let first = config.exec.presets[0].clone();
        config.exec.presets.push(first.clone());
        assert_eq!(config.validate(), Err(ConfigError::InvalidPresetId(first.id)));
    }
}
