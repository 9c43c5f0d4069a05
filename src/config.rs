//! Application configuration
//!
//! Loaded from `config/{env}.yaml`, then overridden by command-line flags
//! (`-a`, `-d`, `-r`) and finally by environment variables
//! (`RUN_ADDRESS`, `DATABASE_URI`, `ACCRUAL_SYSTEM_ADDRESS`, `JWT_SECRET`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use thiserror::Error;

pub const DEFAULT_JWT_SECRET: &str = "change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing value for flag {0}")]
    MissingValue(String),

    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub accrual: AccrualConfig,
    pub reconciler: ReconcilerConfig,
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "loyalty_mart.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            accrual: AccrualConfig::default(),
            reconciler: ReconcilerConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub run_address: String,
    /// Bound on ledger calls made by HTTP handlers
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            run_address: "localhost:8080".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; without one the ledger lives in memory
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            acquire_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AccrualConfig {
    /// Accrual system base address; without one no reconciler runs
    pub address: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            address: None,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub rate_limit_cooldown_ms: u64,
    pub operation_timeout_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            error_backoff_ms: 1_000,
            rate_limit_cooldown_ms: 60_000,
            operation_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`; a missing file yields the defaults
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        match fs::read_to_string(&config_path) {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: config_path,
                source,
            }),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment overrides; `lookup` is normally `std::env::var(..).ok()`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = non_empty("RUN_ADDRESS") {
            self.server.run_address = addr;
        }
        if let Some(url) = non_empty("DATABASE_URI") {
            self.database.url = Some(url);
        }
        if let Some(addr) = non_empty("ACCRUAL_SYSTEM_ADDRESS") {
            self.accrual.address = Some(addr);
        }
        if let Some(secret) = non_empty("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.run_address.trim().is_empty() {
            return Err(ConfigError::Invalid("server.run_address is empty".into()));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret is empty".into()));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid("auth.token_ttl_hours must be positive".into()));
        }
        let r = &self.reconciler;
        if r.operation_timeout_ms == 0 || self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if r.poll_interval_ms == 0 || r.error_backoff_ms == 0 || r.rate_limit_cooldown_ms == 0 {
            return Err(ConfigError::Invalid("reconciler pauses must be positive".into()));
        }
        Ok(())
    }
}

/// Command-line flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOverrides {
    pub env: String,
    pub run_address: Option<String>,
    pub database_uri: Option<String>,
    pub accrual_address: Option<String>,
}

impl Default for CliOverrides {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            run_address: None,
            database_uri: None,
            accrual_address: None,
        }
    }
}

impl CliOverrides {
    /// Parse flags (program name already stripped)
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut overrides = Self::default();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            if !matches!(flag.as_str(), "-e" | "--env" | "-a" | "-d" | "-r") {
                return Err(ConfigError::UnknownFlag(flag));
            }
            let value = args
                .next()
                .ok_or_else(|| ConfigError::MissingValue(flag.clone()))?;

            match flag.as_str() {
                "-a" => overrides.run_address = Some(value),
                "-d" => overrides.database_uri = Some(value),
                "-r" => overrides.accrual_address = Some(value),
                _ => overrides.env = value,
            }
        }

        Ok(overrides)
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(addr) = &self.run_address {
            config.server.run_address = addr.clone();
        }
        if let Some(url) = &self.database_uri {
            config.database.url = Some(url.clone());
        }
        if let Some(addr) = &self.accrual_address {
            config.accrual.address = Some(addr.clone());
        }
    }
}
