//! Configuration management for the circulation server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Library policy (loan period, limits, fines) lives in the settings table,
//! not here.

use libris_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `PostgreSQL` configuration
    pub postgres: PostgresConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Which backend holds the data
    pub storage: StorageBackend,
    /// First super admin, created when the user directory is empty
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            metrics_host: "0.0.0.0".to_string(),
            metrics_port: 9090,
            shutdown_timeout: 30,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// `PostgreSQL` through sqlx
    #[default]
    Postgres,
    /// Process memory; data is lost on exit
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend {other:?}")),
        }
    }
}

/// Credentials-free description of the first administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    /// Login name
    pub username: String,
    /// Contact email
    pub email: String,
    /// Display name
    pub full_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to their defaults with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = ServerConfig::default();
        Self {
            postgres: PostgresConfig::from_env(),
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.host),
                port: parsed("PORT", defaults.port),
                metrics_host: env::var("METRICS_HOST").unwrap_or(defaults.metrics_host),
                metrics_port: parsed("METRICS_PORT", defaults.metrics_port),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
            },
            storage: parsed("LIBRIS_STORAGE", StorageBackend::default()),
            bootstrap_admin: Self::bootstrap_from_env(),
        }
    }

    fn bootstrap_from_env() -> Option<BootstrapAdmin> {
        let username = env::var("LIBRIS_ADMIN_USERNAME").ok()?;
        let email = env::var("LIBRIS_ADMIN_EMAIL").ok()?;
        let full_name =
            env::var("LIBRIS_ADMIN_FULL_NAME").unwrap_or_else(|_| "Administrator".to_string());
        Some(BootstrapAdmin {
            username,
            email,
            full_name,
        })
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Address the metrics exporter binds to.
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.server.metrics_host, self.server.metrics_port)
    }
}

fn parsed<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|error| {
            tracing::warn!(key, %raw, %error, "Ignoring invalid configuration value");
            default
        }),
        Err(_) => default,
    }
}
