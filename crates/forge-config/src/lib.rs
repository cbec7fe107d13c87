//! Layered TOML configuration for mcp-forge.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use forge_mcp::ProxyTimeouts;
use forge_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable that relocates the mcp-forge home directory.
pub const HOME_ENV: &str = "MCP_FORGE_HOME";

/// Config file name inside the home directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Holds `config.toml`, `registry.json` and `audit.log`.
    pub home: PathBuf,
    pub timeouts: ProxyTimeouts,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

/// `[timeouts]` section; every value is in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutSettings {
    pub handshake_ms: Option<u64>,
    pub response_ms: Option<u64>,
    pub remote_ms: Option<u64>,
    pub grace_ms: Option<u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub home: Option<PathBuf>,
}

impl ForgeConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. `MCP_FORGE_HOME`
    /// 3. `<home>/config.toml`
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::from_sources(overrides, std::env::var_os(HOME_ENV))
    }

    fn from_sources(overrides: CliOverrides, env_home: Option<OsString>) -> Result<Self, ConfigError> {
        let home = overrides
            .home
            .or_else(|| env_home.filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(default_home);

        let settings = load_settings_file(&home.join(CONFIG_FILE));
        let timeouts = settings.timeouts.resolve()?;

        Ok(ForgeConfig { home, timeouts })
    }
}

impl TimeoutSettings {
    /// Fill unset values from the defaults and reject zero durations.
    pub fn resolve(&self) -> Result<ProxyTimeouts, ConfigError> {
        let defaults = ProxyTimeouts::default();
        Ok(ProxyTimeouts {
            handshake_ms: nonzero("timeouts.handshake_ms", self.handshake_ms, defaults.handshake_ms)?,
            response_ms: nonzero("timeouts.response_ms", self.response_ms, defaults.response_ms)?,
            remote_ms: nonzero("timeouts.remote_ms", self.remote_ms, defaults.remote_ms)?,
            grace_ms: nonzero("timeouts.grace_ms", self.grace_ms, defaults.grace_ms)?,
        })
    }
}

fn nonzero(key: &str, value: Option<u64>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Some(ms) => Ok(ms),
        None => Ok(default),
    }
}

/// Get the default home directory (~/.mcp-forge/).
pub fn default_home() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-forge")
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_settings(path, &content).unwrap_or_else(|e| {
            tracing::warn!("{e}; using defaults");
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

fn parse_settings(path: &Path, content: &str) -> Result<SettingsFile, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.message().to_string(),
    })
}
