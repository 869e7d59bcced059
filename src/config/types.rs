use serde::{Deserialize, Serialize};

use super::defaults;

/// Maximum advisory upload chunk size accepted from configuration.
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Root configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface the platform listener binds.
    pub host: String,
    /// TCP port of the platform listener.
    pub port: u16,
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            server: ServerConfig::default(),
            runtime: RuntimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be non-zero");
        }
        if self.server.chunk_size == 0 || self.server.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "server.chunk_size must be in 1..={MAX_CHUNK_SIZE}, got {}",
                self.server.chunk_size
            );
        }
        if self.server.base_game_port <= self.port {
            anyhow::bail!(
                "server.base_game_port ({}) must be above the platform port ({})",
                self.server.base_game_port,
                self.port
            );
        }
        if !(2..=8).contains(&self.server.max_room_players) {
            anyhow::bail!(
                "server.max_room_players must be in 2..=8, got {}",
                self.server.max_room_players
            );
        }
        if self.runtime.interpreter.trim().is_empty() {
            anyhow::bail!("runtime.interpreter must not be empty");
        }
        if self.runtime.entry_suffix.trim().is_empty() {
            anyhow::bail!("runtime.entry_suffix must not be empty");
        }
        Ok(())
    }
}

/// Catalog, storage, and transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding the persisted catalog documents.
    pub db_dir: String,
    /// Directory holding uploaded bundle archives.
    pub storage_dir: String,
    /// Advisory chunk size handed to uploading clients and used when
    /// streaming downloads.
    pub chunk_size: usize,
    /// First port handed out by the game-port allocator.
    pub base_game_port: u16,
    /// Upper bound accepted for a game's `max_players` at upload time.
    pub max_room_players: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_dir: defaults::db_dir(),
            storage_dir: defaults::storage_dir(),
            chunk_size: defaults::chunk_size(),
            base_game_port: defaults::base_game_port(),
            max_room_players: defaults::max_room_players(),
        }
    }
}

/// Game-server subprocess settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interpreter used to run a bundle's server entry.
    pub interpreter: String,
    /// Filename suffix a server entry must carry when discovered by the
    /// name heuristic.
    pub entry_suffix: String,
    /// How long a freshly spawned child gets to bind its port before an
    /// early exit is treated as a start failure.
    pub readiness_window_secs: u64,
    /// How long `stop` waits for a child to go away before reporting it.
    pub stop_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interpreter: defaults::interpreter(),
            entry_suffix: defaults::entry_suffix(),
            readiness_window_secs: defaults::readiness_window_secs(),
            stop_grace_secs: defaults::stop_grace_secs(),
        }
    }
}

/// Log verbosity, from config rather than `RUST_LOG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration: console always, rolling file optionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit level; falls back to `RUST_LOG`, then "info".
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    pub enable_file_logging: bool,
    pub dir: String,
    pub filename: String,
    /// "daily", "hourly", or "never".
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: LogFormat::default(),
            enable_file_logging: false,
            dir: defaults::log_dir(),
            filename: defaults::log_filename(),
            rotation: defaults::log_rotation(),
        }
    }
}
