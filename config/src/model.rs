use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to watch config: {0}")]
    Watch(String),
}

/// Complete Anvil configuration.
///
/// Every field has a working default so an empty (or absent) file yields a
/// usable sandbox rooted at the current directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnvilConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Sandbox root. Empty means the process working directory.
    #[serde(default)]
    pub root_dir: String,
    /// Optional prefixes narrowing the sandbox further. Empty = whole root.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    /// File extensions rejected for read/write regardless of location.
    #[serde(default = "default_blocked_extensions")]
    pub blocked_extensions: Vec<String>,
    /// Read cap for whole-file reads.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root_dir: String::new(),
            allowed_paths: Vec::new(),
            blocked_extensions: default_blocked_extensions(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecConfig {
    /// Command-prefix whitelist. A command must match an entry exactly or at
    /// a word boundary ("cargo" authorizes "cargo build", not "cargofmt").
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    /// Default timeout when the caller doesn't supply one.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-stream output truncation bound for secure_exec.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The server shuts itself down after this long without a tool call.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_blocked_extensions() -> Vec<String> {
    [
        ".env", ".key", ".pem", ".crt", ".cer", ".p12", ".pfx", ".jks", ".keystore",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_allowed_commands() -> Vec<String> {
    ["cargo", "cargo build", "cargo test", "cargo run"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_output_bytes() -> usize {
    2000
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AnvilConfig {
    /// Load configuration from the first candidate file that exists, apply
    /// environment overrides, and validate.
    ///
    /// Returns the config and the path it was loaded from (`None` when no
    /// file was found and defaults were used).
    pub fn load() -> Result<(Self, Option<PathBuf>), ConfigError> {
        let mut config = Self::default();
        let mut source = None;

        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                config = Self::parse_file(&candidate)?;
                source = Some(candidate);
                break;
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok((config, source))
    }

    /// Parse one specific file, without env overrides or validation.
    pub fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Candidate config locations, checked in order.
    #[must_use]
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from("anvil.toml")];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".anvil").join("config.toml"));
        }
        candidates
    }

    /// Apply `ANVIL_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = env::var("ANVIL_ROOT_DIR")
            && !root.is_empty()
        {
            self.workspace.root_dir = root;
        }
        if let Ok(level) = env::var("ANVIL_LOG_LEVEL")
            && !level.is_empty()
        {
            self.log.level = level;
        }
        if let Some(bytes) = env_u64("ANVIL_MAX_FILE_BYTES") {
            self.workspace.max_file_bytes = bytes;
        }
        if let Some(secs) = env_u64("ANVIL_COMMAND_TIMEOUT_SECS") {
            self.exec.timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace.max_file_bytes == 0 {
            return Err(ConfigError::Invalid(
                "workspace.max_file_bytes must be positive".to_string(),
            ));
        }
        if self.exec.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "exec.timeout_secs must be positive".to_string(),
            ));
        }
        if self.exec.allowed_commands.is_empty() {
            return Err(ConfigError::Invalid(
                "exec.allowed_commands cannot be empty".to_string(),
            ));
        }
        if self.server.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.idle_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok()?.parse().ok().filter(|v| *v > 0)
}
