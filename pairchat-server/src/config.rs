//! Configuration system for the `PairChat` server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/pairchat/config.toml`)
//! 4. Compiled defaults
//!
//! The config file additionally carries the `[[users]]` table seeding the
//! token and profile directories — a stand-in for the external account
//! system on a single-node deployment.

use std::path::PathBuf;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    users: Vec<UserEntry>,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_message_len: Option<usize>,
    max_history_limit: Option<i64>,
    store_timeout_ms: Option<u64>,
}

/// One `[[users]]` entry: a known account with its bearer token.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UserEntry {
    /// Stable user id.
    pub id: String,
    /// Bearer token presented on the WebSocket upgrade.
    pub token: String,
    /// Display name shown to conversation partners; defaults to the id.
    pub display_name: Option<String>,
    /// Avatar reference, if any.
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the chat server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "PairChat server")]
pub struct CliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "PAIRCHAT_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/pairchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum message body length in characters.
    #[arg(long)]
    pub max_message_len: Option<usize>,

    /// Maximum history page size.
    #[arg(long)]
    pub max_history_limit: Option<i64>,

    /// Store call timeout in milliseconds.
    #[arg(long)]
    pub store_timeout_ms: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PAIRCHAT_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9600`).
    pub bind_addr: String,
    /// Maximum message body length in characters.
    pub max_message_len: usize,
    /// Maximum history page size.
    pub max_history_limit: i64,
    /// Store call timeout in milliseconds.
    pub store_timeout_ms: u64,
    /// Log level filter string.
    pub log_level: String,
    /// Known accounts with tokens and profile data.
    pub users: Vec<UserEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9600".to_string(),
            max_message_len: 4000,
            max_history_limit: 100,
            store_timeout_ms: 5000,
            log_level: "info".to_string(),
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, file))
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_message_len: cli
                .max_message_len
                .or(file.server.max_message_len)
                .unwrap_or(defaults.max_message_len),
            max_history_limit: cli
                .max_history_limit
                .or(file.server.max_history_limit)
                .unwrap_or(defaults.max_history_limit),
            store_timeout_ms: cli
                .store_timeout_ms
                .or(file.server.store_timeout_ms)
                .unwrap_or(defaults.store_timeout_ms),
            log_level: cli.log_level.clone(),
            users: file.users,
        }
    }

    /// Returns the router limits implied by this configuration.
    #[must_use]
    pub const fn router_limits(&self) -> crate::router::RouterLimits {
        crate::router::RouterLimits {
            max_message_len: self.max_message_len,
            max_history_limit: self.max_history_limit,
            store_timeout: std::time::Duration::from_millis(self.store_timeout_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("pairchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
