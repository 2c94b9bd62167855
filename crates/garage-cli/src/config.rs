//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `garage.toml` in the working directory unless another file is
//! given. Every field has a default, so the file is optional. Environment
//! variables take precedence over file values.

use garage_controller::{BackendSelection, ControllerConfig};
use garage_server::AuthConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "garage.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Door wiring and timing.
    pub controller: ControllerConfig,
    /// API authentication.
    pub auth: AuthConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `path` (or `garage.toml`) then apply
    /// environment-variable overrides.
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an environment
    /// override is malformed, or the result does not validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path, true)?,
            None => Self::from_file(Path::new(DEFAULT_CONFIG_FILE), false)?,
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path, required: bool) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Apply overrides from `lookup` (the process environment in production).
    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let first = |names: &[&'static str]| {
            names
                .iter()
                .find_map(|name| lookup(name).map(|value| (*name, value)))
        };

        if let Some((_, host)) = first(&["GARAGE_HOST", "HOST"]) {
            self.server.host = host;
        }
        if let Some((name, port)) = first(&["GARAGE_PORT", "PORT"]) {
            self.server.port = parse_env(name, &port)?;
        }
        if let Some((name, backend)) = first(&["GARAGE_BACKEND"]) {
            self.controller.backend = parse_env::<BackendSelection>(name, &backend)?;
        }
        if let Some((name, enabled)) = first(&["ENABLE_AUTH"]) {
            self.auth.enabled = parse_flag(name, &enabled)?;
        }
        if let Some((_, key)) = first(&["API_KEY"]) {
            self.auth.api_key = Some(key).filter(|key| !key.is_empty());
        }
        if let Some((name, minutes)) = first(&["TOKEN_EXPIRE_MINUTES"]) {
            self.auth.token_ttl_minutes = parse_env(name, &minutes)?;
        }
        if let Some((_, filter)) = first(&["GARAGE_LOG", "RUST_LOG"]) {
            self.logging.filter = filter;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        self.controller
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        self.auth
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env {
            name,
            value: value.to_string(),
        }),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Environment override that does not parse.
    #[error("invalid value {value:?} for {name}")]
    Env { name: &'static str, value: String },
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
