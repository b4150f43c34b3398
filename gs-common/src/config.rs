//! Configuration loading and config file resolution
//!
//! The server reads one TOML file. Every key has a compiled default, so a
//! missing file (or a missing key) never prevents startup; only a file that
//! exists but cannot be parsed is an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "GS_CONFIG";

/// Config file looked up relative to the working directory
pub const LOCAL_CONFIG_PATH: &str = "conf/greenscout.toml";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Event key of the current competition (e.g. "2024gaalb")
    pub event_key: String,

    /// Merge observations from several scouters of the same robot
    pub multi_scouting: bool,

    /// Target spreadsheet
    pub spreadsheet_id: String,

    /// OAuth bearer token for the spreadsheet API
    pub sheets_token: Option<String>,

    pub sheets_api_base: String,

    /// Root of the stage directories (Incoming, Written, ...)
    pub json_root: PathBuf,

    /// Directory holding one team list file per event key
    pub team_lists_dir: PathBuf,

    /// SQLite database for users, scores and certificates
    pub database_path: PathBuf,

    pub bind_address: String,

    /// Seconds between ingestion ticks
    pub poll_interval_secs: u64,

    /// Failed terminal moves before a file is dead-lettered
    pub max_move_attempts: u32,

    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            event_key: String::new(),
            multi_scouting: false,
            spreadsheet_id: String::new(),
            sheets_token: None,
            sheets_api_base: "https://sheets.googleapis.com/v4".to_string(),
            json_root: PathBuf::from("InputtedJson"),
            team_lists_dir: PathBuf::from("TeamLists"),
            database_path: PathBuf::from("GreenScout-Databases/users.db"),
            bind_address: "0.0.0.0:8080".to_string(),
            poll_interval_secs: 5,
            max_move_attempts: 3,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log every HTTP request
    pub http: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            http: false,
        }
    }
}

impl ServerConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load from `path`, or compiled defaults when there is no file
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            warn!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file {} not found, using built-in defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write as TOML, replacing any existing file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = path.with_extension("toml.tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    /// Check values the server cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.event_key.trim().is_empty() {
            return Err(Error::Config("event_key is not set".to_string()));
        }
        if self.event_key.contains('_') {
            return Err(Error::Config(format!(
                "event_key '{}' must not contain '_' (used as the file name separator)",
                self.event_key
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be at least 1".to_string()));
        }
        if self.max_move_attempts == 0 {
            return Err(Error::Config("max_move_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Team list file for the configured event
    pub fn team_list_path(&self) -> PathBuf {
        self.team_lists_dir.join(&self.event_key)
    }
}

/// Resolve which config file to read
///
/// Priority order:
/// 1. Command-line argument
/// 2. `GS_CONFIG` environment variable
/// 3. `conf/greenscout.toml` in the working directory
/// 4. `greenscout/greenscout.toml` in the user config directory
///
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_PATH);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|d| d.join("greenscout").join("greenscout.toml"))
        .filter(|p| p.exists())
}
