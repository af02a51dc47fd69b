//! TOML and environment configuration.
//!
//! Supports a config file (quarry.toml) with environment variable expansion,
//! plus direct environment ingestion for the executor knobs.
//!
//! Example configuration:
//! ```toml
//! [connection]
//! connection_string = "host=localhost user=${DB_USER} password=${DB_PASSWORD} dbname=analytics"
//!
//! [executor]
//! max_rows = 10000
//! timeout_seconds = 30
//! target_schema = "tenant_7"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Datastore connection.
    pub connection: Option<ConnectionSettings>,

    /// Executor limits.
    pub executor: ExecutorSettings,
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// libpq-style connection string (supports `${ENV_VAR}` expansion).
    pub connection_string: String,
}

impl ConnectionSettings {
    /// The connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }
}

/// Executor configuration section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Maximum rows a single execution may return.
    pub max_rows: u64,

    /// Wall-clock execution budget in seconds.
    pub timeout_seconds: u64,

    /// Schema/namespace to qualify emitted table references with.
    pub target_schema: Option<String>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            timeout_seconds: 30,
            target_schema: None,
        }
    }
}

/// Resolved executor options consumed by the query executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    pub max_rows: u64,
    pub timeout: Duration,
    pub target_schema: Option<String>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        ExecutorSettings::default().into()
    }
}

impl From<ExecutorSettings> for ExecutorOptions {
    fn from(settings: ExecutorSettings) -> Self {
        Self {
            max_rows: settings.max_rows,
            timeout: Duration::from_secs(settings.timeout_seconds),
            target_schema: settings.target_schema,
        }
    }
}

impl ExecutorOptions {
    /// Read options from `QUARRY_MAX_ROWS`, `QUARRY_TIMEOUT_SECONDS`, and
    /// `QUARRY_TARGET_SCHEMA`, falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut options = Self::default();

        if let Ok(raw) = env::var("QUARRY_MAX_ROWS") {
            options.max_rows = raw.parse().map_err(|_| {
                SettingsError::InvalidConfig(format!("QUARRY_MAX_ROWS: '{}' is not a number", raw))
            })?;
        }
        if let Ok(raw) = env::var("QUARRY_TIMEOUT_SECONDS") {
            let seconds: u64 = raw.parse().map_err(|_| {
                SettingsError::InvalidConfig(format!(
                    "QUARRY_TIMEOUT_SECONDS: '{}' is not a number",
                    raw
                ))
            })?;
            options.timeout = Duration::from_secs(seconds);
        }
        if let Ok(schema) = env::var("QUARRY_TARGET_SCHEMA") {
            if !schema.is_empty() {
                options.target_schema = Some(schema);
            }
        }

        Ok(options)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `~/.config/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Executor options from this configuration.
    pub fn executor_options(&self) -> ExecutorOptions {
        self.executor.clone().into()
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.peek() == Some(&'{') {
                chars.next();
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '}' {
                        chars.next();
                        break;
                    }
                    var_name.push(ch);
                    chars.next();
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
