//! chaosbernie daemon configuration
//!
//! Settings come from an optional TOML file and are then overridden by
//! command-line flags. Every field has a default, so an empty or missing file
//! is valid.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::{BernieError, Result};

pub const CONFIG_ENV_VAR: &str = "CHAOSBERNIE_CONFIG";

/// What a destructive command does to the cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    #[default]
    Deallocate,
    Delete,
}

impl ActionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionMode::Deallocate => "deallocate",
            ActionMode::Delete => "delete",
        }
    }

    /// Resources that will only be deallocated can come back, so they are
    /// shown as daemons.
    pub fn marks_daemon(self) -> bool {
        self != ActionMode::Delete
    }
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command-line flags for `chaosbernied`
#[derive(Debug, Parser)]
#[command(name = "chaosbernied", version, about = "Expose cloud resources as a fake process table")]
pub struct Cli {
    /// JSON file with resources
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: PathBuf,

    /// Action performed on killed resources
    #[arg(long, value_enum)]
    pub action: Option<ActionMode>,

    /// Unix domain socket to create, defaults to ~/.chaosbernie.sock
    #[arg(long = "socket", value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Optional TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH", env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Don't perform any actions on cloud resources
    #[arg(long)]
    pub dry_run: bool,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BernieConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            read_timeout_ms: default_read_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionsConfig {
    #[serde(default)]
    pub mode: ActionMode,
    #[serde(default = "default_cli_binary")]
    pub cli_binary: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_dry_run_delay")]
    pub dry_run_delay_seconds: u64,
    /// Upper bound on one external invocation; 0 waits forever
    #[serde(default = "default_action_timeout")]
    pub timeout_seconds: u64,
    /// Extra action names that behave like `kill`
    #[serde(default)]
    pub extra_actions: Vec<String>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            mode: ActionMode::default(),
            cli_binary: default_cli_binary(),
            dry_run: false,
            dry_run_delay_seconds: default_dry_run_delay(),
            timeout_seconds: default_action_timeout(),
            extra_actions: Vec::new(),
        }
    }
}

impl ActionsConfig {
    pub fn dry_run_delay(&self) -> Duration {
        Duration::from_secs(self.dry_run_delay_seconds)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_graph_path")]
    pub output: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output: default_graph_path(),
        }
    }
}

fn default_read_timeout_ms() -> u64 { 2000 }
fn default_log_level() -> String { "info".into() }
fn default_cli_binary() -> String { "az".into() }
fn default_dry_run_delay() -> u64 { 10 }
fn default_action_timeout() -> u64 { 900 }
fn default_true() -> bool { true }
fn default_graph_path() -> PathBuf { PathBuf::from("resources.gv") }

impl BernieConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BernieError::Config(e.to_string()))
    }

    /// Load `path` if given, defaults otherwise. An explicitly named file
    /// that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    BernieError::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides on top of file values
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(mode) = cli.action {
            self.actions.mode = mode;
        }
        if let Some(socket) = &cli.socket {
            self.server.socket_path = Some(socket.clone());
        }
        if cli.debug {
            self.server.log_level = "debug".into();
        }
        if cli.dry_run {
            self.actions.dry_run = true;
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.server
            .socket_path
            .clone()
            .unwrap_or_else(chaosbernie_protocol::default_socket_path)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.server.read_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.read_timeout_ms == 0 {
            return Err(BernieError::Config("read_timeout_ms must be positive".into()));
        }
        if self.actions.cli_binary.trim().is_empty() {
            return Err(BernieError::Config("cli_binary must not be empty".into()));
        }
        for name in &self.actions.extra_actions {
            if matches!(name.as_str(), "ps" | "kill" | "renice") {
                return Err(BernieError::Config(format!(
                    "extra action {name:?} shadows a built-in action"
                )));
            }
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(BernieError::Config(format!("invalid extra action {name:?}")));
            }
        }
        Ok(())
    }
}
