//! Service configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file)
//! yields a working configuration. Durations are whole seconds.
//!
//! ```toml
//! [server]
//! endpoint = "wss://cloud.example.com/apps/spreed/ws"
//! connect_timeout_secs = 15
//!
//! [auth]
//! hash_key = "..."
//! block_key = "..."
//! backend = "https://cloud.example.com"
//! secret = "..."
//!
//! [reconnect]
//! unit_delay_secs = 5
//! max_delay_secs = 30
//!
//! [dedup]
//! recent_window_secs = 5
//! max_age_secs = 3600
//! cleanup_interval_secs = 3600
//!
//! [polling]
//! enabled = true
//! interval_secs = 30
//!
//! [user]
//! id = 1
//! user_id = "alice"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use talkpush_core::User;
use talkpush_protocol::AuthParams;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "TALKPUSH_CONFIG";

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8080/ws";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub endpoint: String,
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_secs: 15,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Hello-frame credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub hash_key: String,
    pub block_key: String,
    pub backend: String,
    pub secret: String,
}

impl From<&AuthConfig> for AuthParams {
    fn from(auth: &AuthConfig) -> Self {
        AuthParams {
            hash_key: auth.hash_key.clone(),
            block_key: auth.block_key.clone(),
            backend: auth.backend.clone(),
            secret: auth.secret.clone(),
        }
    }
}

/// Linear-capped reconnect backoff: `min(max, attempt * unit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub unit_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            unit_delay_secs: 5,
            max_delay_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Events younger than this are accepted even if not newer
    pub recent_window_secs: u64,
    /// Entries idle longer than this are swept
    pub max_age_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            recent_window_secs: 5,
            max_age_secs: 3600,
            cleanup_interval_secs: 3600,
        }
    }
}

impl DedupConfig {
    pub fn recent_window(&self) -> Duration {
        Duration::from_secs(self.recent_window_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Local user for the runner binary. Embedders supply their own provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub id: i64,
    pub user_id: String,
    pub display_name: Option<String>,
}

impl UserConfig {
    /// `None` when no user id is configured.
    pub fn to_user(&self) -> Option<User> {
        if self.user_id.is_empty() {
            return None;
        }
        Some(User {
            id: self.id,
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
        })
    }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub reconnect: ReconnectConfig,
    pub dedup: DedupConfig,
    pub polling: PollingConfig,
    pub user: UserConfig,
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    /// Loads from the first source that exists: `explicit`, then
    /// `$TALKPUSH_CONFIG`, then the user config directory. Falls back to
    /// defaults when none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        match default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("server.endpoint is empty".into()));
        }
        if self.reconnect.unit_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.unit_delay_secs must be positive".into(),
            ));
        }
        if self.reconnect.max_delay_secs < self.reconnect.unit_delay_secs {
            return Err(ConfigError::Invalid(format!(
                "reconnect.max_delay_secs ({}) is below unit_delay_secs ({})",
                self.reconnect.max_delay_secs, self.reconnect.unit_delay_secs
            )));
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.interval_secs must be positive".into(),
            ));
        }
        if self.dedup.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "dedup.cleanup_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/talkpush/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("talkpush").join("config.toml"))
}
