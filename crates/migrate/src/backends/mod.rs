//! Database Adapters
//!
//! One adapter per supported engine. Each adapter owns a live connection, the
//! dialect used to translate schema operations, and the name of the version
//! log table.

pub mod core;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use self::core::*;
pub use self::mysql::MySqlAdapter;
pub use self::postgres::PostgresAdapter;
pub use self::sqlite::SqliteAdapter;

use serde::{Deserialize, Serialize};

use crate::config::DatabaseConfig;
use crate::error::{MigrationError, MigrationResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    #[serde(alias = "postgres", alias = "pgsql")]
    PostgreSQL,
    MySQL,
    SQLite,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::PostgreSQL => write!(f, "postgresql"),
            BackendType::MySQL => write!(f, "mysql"),
            BackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pgsql" => Ok(BackendType::PostgreSQL),
            "mysql" => Ok(BackendType::MySQL),
            "sqlite" => Ok(BackendType::SQLite),
            _ => Err(MigrationError::Configuration(format!(
                "Unsupported database backend: {}",
                s
            ))),
        }
    }
}

impl BackendType {
    /// Detect the backend from a connection URL scheme
    pub fn from_url(url: &str) -> MigrationResult<Self> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Ok(BackendType::PostgreSQL)
        } else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Ok(BackendType::MySQL)
        } else if url.starts_with("sqlite:") || url.starts_with("file:") {
            Ok(BackendType::SQLite)
        } else {
            Err(MigrationError::Configuration(format!(
                "Unable to detect database backend from URL: {}",
                url
            )))
        }
    }
}

/// Build an unconnected adapter for the configured database target
pub fn adapter_for(config: &DatabaseConfig, log_table: &str) -> MigrationResult<Box<dyn Adapter>> {
    let backend = match config.adapter {
        Some(backend) => backend,
        None => BackendType::from_url(&config.url)?,
    };

    let adapter: Box<dyn Adapter> = match backend {
        BackendType::PostgreSQL => {
            Box::new(PostgresAdapter::new(&config.url).with_log_table(log_table))
        }
        BackendType::MySQL => Box::new(MySqlAdapter::new(&config.url).with_log_table(log_table)),
        BackendType::SQLite => Box::new(SqliteAdapter::new(&config.url).with_log_table(log_table)),
    };
    Ok(adapter)
}

/// Build the configured adapter and open its connection
pub async fn connect_adapter(
    config: &DatabaseConfig,
    log_table: &str,
) -> MigrationResult<Box<dyn Adapter>> {
    let mut adapter = adapter_for(config, log_table)?;
    tracing::debug!(
        "Connecting {} adapter to {}",
        adapter.backend_type(),
        config.redacted_url()
    );
    adapter.connect().await?;
    Ok(adapter)
}
