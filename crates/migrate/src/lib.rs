//! # keel-migrate: versioned schema migrations
//!
//! Discovers versioned migration units, compares them with a version log kept
//! in the target database, and applies or reverts them one transaction at a
//! time on PostgreSQL, MySQL and SQLite.
//!
//! Migrations describe schema changes through the engine-agnostic [`schema`]
//! model; each adapter's [`translator::Dialect`] turns those operations into
//! the engine's DDL.
//!
//! ```no_run
//! use keel_migrate::prelude::*;
//!
//! struct CreateUsers;
//!
//! #[async_trait]
//! impl Migration for CreateUsers {
//!     fn version(&self) -> i64 {
//!         20240101000000
//!     }
//!
//!     fn name(&self) -> &str {
//!         "create_users"
//!     }
//!
//!     async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
//!         Table::new("users")
//!             .add_column(Column::string("email"))
//!             .add_index(Index::new(["email"]).unique())
//!             .create(schema)
//!             .await
//!     }
//! }
//!
//! # async fn run() -> MigrationResult<()> {
//! let config = MigrationConfig::new("sqlite://app.db");
//! let mut registry = MigrationRegistry::new();
//! registry.register(CreateUsers);
//! let mut manager = MigrationManager::connect(config, registry).await?;
//! manager.migrate(None).await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod migrations;
pub mod schema;
pub mod translator;

pub use async_trait::async_trait;

pub use backends::{
    adapter_for, connect_adapter, Adapter, BackendType, DatabaseRow, DatabaseValue,
    MySqlAdapter, PostgresAdapter, SqliteAdapter,
};
pub use config::{DatabaseConfig, MigrationConfig, VersionOrder};
pub use error::{MigrationError, MigrationResult};
pub use migrations::{
    Migration, MigrationKind, MigrationManager, MigrationRegistry, MigrationRunResult,
    RollbackResult, RollbackTarget, SqlFileMigration, StatusReport, StatusRow, VersionLogEntry,
};

/// Everything a migration file usually needs
pub mod prelude {
    pub use crate::async_trait;
    pub use crate::config::{MigrationConfig, VersionOrder};
    pub use crate::error::{MigrationError, MigrationResult};
    pub use crate::migrations::{
        Migration, MigrationKind, MigrationManager, MigrationRegistry, RollbackTarget,
    };
    pub use crate::schema::{
        Column, ColumnDefault, ColumnType, ForeignKey, IdStrategy, Index, IndexType,
        ReferentialAction, Schema, Table,
    };
}
