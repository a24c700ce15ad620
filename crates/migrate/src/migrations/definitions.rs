//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the [`Migration`] trait implemented by every migration unit, the
//! version log record, and the result values returned by the manager.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backends::DatabaseRow;
use crate::error::{MigrationError, MigrationResult};
use crate::schema::Schema;

/// How a migration expresses its reverse logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationKind {
    /// A single `change()` that is recorded and inverted on rollback
    Change,
    /// Explicit `up()` and `down()`
    UpDown,
    /// Forward-only
    Irreversible,
}

/// A versioned schema migration unit
///
/// Implementations override `change()` for automatically reversible
/// migrations, or `up()` and `down()` together with
/// `kind() -> MigrationKind::UpDown`. A `change()` that records no
/// operations is refused as irreversible on rollback, so a unit overriding
/// only `up()` is never silently dropped from the log.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique, positive version; usually a `YYYYMMDDHHMMSS` timestamp
    fn version(&self) -> i64;

    /// snake_case identity of the unit
    fn name(&self) -> &str;

    fn kind(&self) -> MigrationKind {
        MigrationKind::Change
    }

    async fn change(&self, _schema: &mut Schema<'_>) -> MigrationResult<()> {
        Ok(())
    }

    async fn up(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        self.change(schema).await
    }

    async fn down(&self, _schema: &mut Schema<'_>) -> MigrationResult<()> {
        Err(MigrationError::Irreversible {
            version: self.version(),
            name: self.name().to_string(),
            reason: "no down() logic".to_string(),
        })
    }
}

impl fmt::Debug for dyn Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// One row of the version log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionLogEntry {
    pub version: i64,
    pub migration_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Blocks rollback past this version unless forced
    pub breakpoint: bool,
}

impl VersionLogEntry {
    /// Entry for a migration that starts now
    pub fn started(version: i64, migration_name: impl Into<String>) -> Self {
        Self {
            version,
            migration_name: migration_name.into(),
            start_time: Utc::now(),
            end_time: None,
            breakpoint: false,
        }
    }

    pub fn finished(mut self) -> Self {
        self.end_time = Some(Utc::now());
        self
    }

    pub fn from_row(row: &DatabaseRow) -> MigrationResult<Self> {
        let version = row.get_i64("version").ok_or_else(|| MigrationError::Adapter {
            message: "version log row without a version".to_string(),
            statement: None,
        })?;
        let start_time = row
            .get("start_time")
            .and_then(|v| v.as_datetime())
            .ok_or_else(|| MigrationError::Adapter {
                message: format!("version log row {} has no readable start_time", version),
                statement: None,
            })?;
        Ok(Self {
            version,
            migration_name: row.get_string("migration_name").unwrap_or_default(),
            start_time,
            end_time: row.get("end_time").and_then(|v| v.as_datetime()),
            breakpoint: row
                .get("breakpoint")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        })
    }
}

/// Lifecycle of one migration within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applying,
    Applied,
    RollingBack,
    Failed { dirty: bool },
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Pending => write!(f, "pending"),
            MigrationState::Applying => write!(f, "applying"),
            MigrationState::Applied => write!(f, "applied"),
            MigrationState::RollingBack => write!(f, "rolling back"),
            MigrationState::Failed { dirty: true } => write!(f, "failed (dirty)"),
            MigrationState::Failed { dirty: false } => write!(f, "failed"),
        }
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    Up,
    Down,
}

/// Outcome of one migration that was applied or rolled back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationSummary {
    pub version: i64,
    pub name: String,
    /// Statements executed by the migration itself, excluding log writes
    pub statements_executed: usize,
    pub execution_time_ms: u128,
}

/// Result of running migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationRunResult {
    /// Migrations applied by this run, in order
    pub applied_migrations: Vec<MigrationSummary>,
    /// Discovered migrations that were already applied
    pub skipped_count: usize,
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }

    pub fn versions(&self) -> Vec<i64> {
        self.applied_migrations.iter().map(|m| m.version).collect()
    }
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackResult {
    /// Migrations rolled back, in the order they were reverted
    pub rolled_back_migrations: Vec<MigrationSummary>,
    pub execution_time_ms: u128,
}

impl RollbackResult {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back_migrations.len()
    }

    pub fn versions(&self) -> Vec<i64> {
        self.rolled_back_migrations.iter().map(|m| m.version).collect()
    }
}

/// How far a rollback goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Revert everything applied after this version; `0` reverts all
    Version(i64),
    /// Revert the last `n` applied migrations
    Steps(usize),
}

impl Default for RollbackTarget {
    fn default() -> Self {
        RollbackTarget::Steps(1)
    }
}

/// One line of `status()`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRow {
    pub version: i64,
    pub name: String,
    pub applied: bool,
    pub breakpoint: bool,
    pub applied_at: Option<DateTime<Utc>>,
}
