//! Migration System
//!
//! Migration units, their discovery, and the manager that applies, reverts
//! and reports them.

pub mod definitions;
pub mod manager;
pub mod registry;
pub mod rollback;
pub mod sql_file;
pub mod status;

pub use definitions::{
    Migration, MigrationDirection, MigrationKind, MigrationRunResult, MigrationState,
    MigrationSummary, RollbackResult, RollbackTarget, StatusRow, VersionLogEntry,
};
pub use manager::MigrationManager;
pub use registry::MigrationRegistry;
pub use sql_file::{parse_file_name, split_statements, SqlFileMigration};
pub use status::StatusReport;
