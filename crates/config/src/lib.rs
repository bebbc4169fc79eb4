//! Configuration schema and loader for the versioned storage service.
//!
//! Settings come from a YAML file; every field can be overridden by an
//! environment variable of the matching `VSS_*` name, and overrides win
//! over file values.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Hard ceiling on the configurable request-body limit.
const MAX_BODY_BYTES_CEILING: usize = 1024 * 1024 * 1024;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen address for the VSS HTTP endpoints.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Which record store backs the engine.
    #[serde(default)]
    pub backend: Backend,

    /// HTTP limits.
    #[serde(default)]
    pub http: HttpConfig,

    /// PostgreSQL connection and pool settings (used when `backend` is
    /// `postgres`).
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backend: Backend::default(),
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            metrics_port: None,
        }
    }
}

/// Record-store selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Single-process in-memory store; state is lost on restart.
    #[default]
    Memory,
    /// PostgreSQL.
    Postgres,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Backend::Memory),
            "postgres" => Ok(Backend::Postgres),
            other => Err(format!("unknown backend {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Maximum accepted request-body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_db_name")]
    pub database: String,

    /// Pool size; also the effective request parallelism.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,

    /// Connections kept open while idle.
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,

    /// How long to wait for a pooled connection.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Idle connections are closed after this long.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Connections are recycled after this long regardless of use.
    #[serde(default = "default_max_lifetime_ms")]
    pub max_lifetime_ms: u64,

    /// Per-connection prepared-statement cache entries.
    #[serde(default = "default_statement_cache_size")]
    pub statement_cache_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            username: default_db_username(),
            password: String::new(),
            database: default_db_name(),
            max_pool_size: default_max_pool_size(),
            min_idle: default_min_idle(),
            connection_timeout_ms: default_connection_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_lifetime_ms: default_max_lifetime_ms(),
            statement_cache_size: default_statement_cache_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path to a PEM-encoded RSA public key. When set, requests must
    /// carry a bearer JWT signed by the matching private key; when
    /// absent, the no-op authorizer is used.
    #[serde(default)]
    pub jwt_rsa_pem_path: Option<PathBuf>,
}

// --- Defaults ---

fn default_listen() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("valid default listen address")
}
fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}
fn default_db_host() -> String {
    "localhost".to_string()
}
fn default_db_port() -> u16 {
    5432
}
fn default_db_username() -> String {
    "postgres".to_string()
}
fn default_db_name() -> String {
    "vss".to_string()
}
fn default_max_pool_size() -> u32 {
    10
}
fn default_min_idle() -> u32 {
    2
}
fn default_connection_timeout_ms() -> u64 {
    30_000
}
fn default_idle_timeout_ms() -> u64 {
    600_000
}
fn default_max_lifetime_ms() -> u64 {
    1_800_000
}
fn default_statement_cache_size() -> usize {
    100
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ServiceConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "http.max_body_bytes must be > 0".into(),
            ));
        }
        if self.http.max_body_bytes > MAX_BODY_BYTES_CEILING {
            return Err(ConfigError::Invalid(format!(
                "http.max_body_bytes ({}) must be <= {}",
                self.http.max_body_bytes, MAX_BODY_BYTES_CEILING
            )));
        }
        if self.database.max_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "database.max_pool_size must be > 0".into(),
            ));
        }
        if self.database.min_idle > self.database.max_pool_size {
            return Err(ConfigError::Invalid(format!(
                "database.min_idle ({}) must be <= database.max_pool_size ({})",
                self.database.min_idle, self.database.max_pool_size
            )));
        }
        if self.backend == Backend::Postgres && self.database.database.is_empty() {
            return Err(ConfigError::Invalid(
                "database.database must be set for the postgres backend".into(),
            ));
        }
        Ok(())
    }

    /// Apply `VSS_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        override_from_env(&mut self.listen, "VSS_LISTEN")?;
        override_from_env(&mut self.backend, "VSS_BACKEND")?;
        override_from_env(&mut self.http.max_body_bytes, "VSS_MAX_BODY_BYTES")?;
        override_opt_from_env(&mut self.metrics_port, "VSS_METRICS_PORT")?;

        if let Ok(path) = std::env::var("VSS_JWT_RSA_PEM_PATH") {
            self.auth.jwt_rsa_pem_path = Some(PathBuf::from(path));
        }

        let db = &mut self.database;
        override_from_env(&mut db.host, "VSS_DB_HOST")?;
        override_from_env(&mut db.port, "VSS_DB_PORT")?;
        override_from_env(&mut db.username, "VSS_DB_USERNAME")?;
        override_from_env(&mut db.password, "VSS_DB_PASSWORD")?;
        override_from_env(&mut db.database, "VSS_DB_NAME")?;
        override_from_env(&mut db.max_pool_size, "VSS_DB_MAX_POOL_SIZE")?;
        override_from_env(&mut db.min_idle, "VSS_DB_MIN_IDLE")?;
        override_from_env(&mut db.connection_timeout_ms, "VSS_DB_CONNECTION_TIMEOUT_MS")?;
        override_from_env(&mut db.idle_timeout_ms, "VSS_DB_IDLE_TIMEOUT_MS")?;
        override_from_env(&mut db.max_lifetime_ms, "VSS_DB_MAX_LIFETIME_MS")?;
        override_from_env(&mut db.statement_cache_size, "VSS_DB_STATEMENT_CACHE_SIZE")?;
        Ok(())
    }

    /// Load from an optional YAML file, apply environment overrides,
    /// then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => parse_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Parse a `ServiceConfig` from a YAML file (no environment overrides).
pub fn load_from_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config = parse_file(path)?;
    config.validate()?;
    Ok(config)
}

/// Parse a `ServiceConfig` from a YAML string (no environment
/// overrides).
pub fn load_from_str(yaml: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

fn override_from_env<T>(target: &mut T, var: &str) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(var) {
        *target = raw
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", var, e)))?;
    }
    Ok(())
}

fn override_opt_from_env<T>(target: &mut Option<T>, var: &str) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(var) {
        let value = raw
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", var, e)))?;
        *target = Some(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.listen.port(), 8080);
    }

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
listen: "0.0.0.0:9090"
"#;
        let config = load_from_str(yaml).unwrap();
        assert_eq!(config.listen.port(), 9090);
        assert_eq!(config.database.max_pool_size, 10);
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
listen: "0.0.0.0:8080"
backend: postgres
metrics_port: 9300
http:
  max_body_bytes: 1048576
database:
  host: db.internal
  port: 5433
  username: vss
  password: hunter2
  database: vss_prod
  max_pool_size: 25
  min_idle: 5
  connection_timeout_ms: 5000
  idle_timeout_ms: 120000
  max_lifetime_ms: 900000
  statement_cache_size: 250
auth:
  jwt_rsa_pem_path: /etc/vss/jwt.pem
"#;
        let config = load_from_str(yaml).unwrap();
        assert_eq!(config.backend, Backend::Postgres);
        assert_eq!(config.metrics_port, Some(9300));
        assert_eq!(config.http.max_body_bytes, 1_048_576);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.max_pool_size, 25);
        assert_eq!(config.database.statement_cache_size, 250);
        assert!(config.auth.jwt_rsa_pem_path.is_some());
    }

    #[test]
    fn test_rejects_zero_pool() {
        let yaml = r#"
database:
  max_pool_size: 0
"#;
        let result = load_from_str(yaml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("max_pool_size"), "error should mention max_pool_size: {}", err);
    }

    #[test]
    fn test_rejects_min_idle_above_pool_size() {
        let yaml = r#"
database:
  max_pool_size: 4
  min_idle: 9
"#;
        let result = load_from_str(yaml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("min_idle"), "error should mention min_idle: {}", err);
    }

    #[test]
    fn test_rejects_oversized_body_limit() {
        let yaml = r#"
http:
  max_body_bytes: 2147483648
"#;
        assert!(load_from_str(yaml).is_err());
    }

    #[test]
    fn test_env_overrides_beat_file_values() {
        // Environment is process-wide, so the override cases share one
        // test to avoid racing each other.
        std::env::set_var("VSS_DB_MAX_POOL_SIZE", "33");
        std::env::set_var("VSS_BACKEND", "postgres");

        let mut config = ServiceConfig::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.database.max_pool_size, 33);
        assert_eq!(config.backend, Backend::Postgres);

        std::env::set_var("VSS_DB_PORT", "not-a-port");
        let mut config = ServiceConfig::default();
        assert!(config.apply_env_overrides().is_err());

        std::env::remove_var("VSS_DB_MAX_POOL_SIZE");
        std::env::remove_var("VSS_BACKEND");
        std::env::remove_var("VSS_DB_PORT");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vss.yaml");
        std::fs::write(&path, "listen: \"0.0.0.0:7171\"\nmetrics_port: 9400\n").unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.listen.port(), 7171);
        assert_eq!(config.metrics_port, Some(9400));
    }

    #[test]
    fn test_load_from_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_from_file(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vss.yaml");
        std::fs::write(&path, "database:\n  max_pool_size: 0\n").unwrap();

        assert!(matches!(
            load_from_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_roundtrip_yaml() {
        let config = ServiceConfig::default();
        let serialized = serde_yaml::to_string(&config).unwrap();
        let config2 = load_from_str(&serialized).unwrap();
        assert_eq!(config.listen, config2.listen);
        assert_eq!(config.database.max_pool_size, config2.database.max_pool_size);
    }
}
