//! Daemon configuration.
//!
//! Values are resolved in order: built-in defaults, the TOML file,
//! environment variables, then command-line flags (applied by the binary).
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:8000"
//! max_connections = 1024
//! send_timeout_ms = 5000
//! idle_timeout_secs = 0       # 0 disables; otherwise pings every half window
//! max_message_bytes = 65536
//! echo_to_sender = false
//!
//! [auth]
//! secret_key = "change-me"
//! algorithm = "HS256"
//! access_token_expire_minutes = 30
//! bcrypt_cost = 12
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::registry::DEFAULT_MAX_CONNECTIONS;
use crate::session::{SessionSettings, DEFAULT_MAX_MESSAGE_BYTES};

/// Environment variable overriding `server.listen`.
pub const ENV_LISTEN: &str = "MURMUR_LISTEN";

/// Environment variable overriding `auth.secret_key`.
pub const ENV_SECRET_KEY: &str = "MURMUR_SECRET_KEY";

/// The only supported signing algorithm.
pub const SUPPORTED_ALGORITHM: &str = "HS256";

/// Length of a generated secret.
const GENERATED_SECRET_LEN: usize = 64;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("failed to parse config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub auth: AuthSettings,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    pub max_connections: usize,
    pub send_timeout_ms: u64,

    /// Zero disables the idle timeout and keepalive pings
    pub idle_timeout_secs: u64,
    pub max_message_bytes: usize,
    pub echo_to_sender: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8000)),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            send_timeout_ms: 5000,
            idle_timeout_secs: 0,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            echo_to_sender: false,
        }
    }
}

/// `[auth]` section.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub secret_key: Option<String>,
    pub algorithm: String,
    pub access_token_expire_minutes: u64,
    pub bcrypt_cost: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret_key: None,
            algorithm: SUPPORTED_ALGORITHM.to_string(),
            access_token_expire_minutes: 30,
            bcrypt_cost: crate::auth::DEFAULT_BCRYPT_COST,
        }
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("algorithm", &self.algorithm)
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl Config {
    /// Default config file location (`<config dir>/murmur/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("murmur").join("config.toml"))
    }

    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present, else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Applies `MURMUR_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Applies overrides from an arbitrary lookup.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_LISTEN) {
            self.server.listen = value.parse().map_err(|_| ConfigError::Env {
                var: ENV_LISTEN,
                value,
            })?;
        }

        if let Some(value) = lookup(ENV_SECRET_KEY).filter(|v| !v.is_empty()) {
            self.auth.secret_key = Some(value);
        }

        Ok(())
    }

    /// Checks ranges and supported values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_connections == 0 {
            return Err(invalid("server.max_connections", "must be at least 1"));
        }
        if self.server.send_timeout_ms == 0 {
            return Err(invalid("server.send_timeout_ms", "must be at least 1"));
        }
        if self.server.max_message_bytes == 0 {
            return Err(invalid("server.max_message_bytes", "must be at least 1"));
        }
        if self.auth.algorithm != SUPPORTED_ALGORITHM {
            return Err(invalid(
                "auth.algorithm",
                format!(
                    "'{}' is not supported (only {SUPPORTED_ALGORITHM})",
                    self.auth.algorithm
                ),
            ));
        }
        if self.auth.access_token_expire_minutes == 0 {
            return Err(invalid(
                "auth.access_token_expire_minutes",
                "must be at least 1",
            ));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(invalid("auth.bcrypt_cost", "must be between 4 and 31"));
        }
        if self
            .auth
            .secret_key
            .as_deref()
            .is_some_and(|key| key.trim().is_empty())
        {
            return Err(invalid("auth.secret_key", "must not be blank"));
        }
        Ok(())
    }

    /// Returns the signing secret, generating one if none is configured.
    ///
    /// A generated secret only lives as long as the process, so tokens do
    /// not survive a restart.
    pub fn ensure_secret(&mut self) -> &str {
        self.auth
            .secret_key
            .get_or_insert_with(|| {
                warn!(
                    "No auth.secret_key configured; generated a random key. \
                     Issued tokens will not survive a restart"
                );
                Alphanumeric.sample_string(&mut rand::rng(), GENERATED_SECRET_LEN)
            })
            .as_str()
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.server.send_timeout_ms)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.access_token_expire_minutes.saturating_mul(60))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            idle_timeout: match self.server.idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_message_bytes: self.server.max_message_bytes,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
