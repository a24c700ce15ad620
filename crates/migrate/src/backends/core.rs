//! Core Adapter Trait
//!
//! The [`Adapter`] trait is the engine's only view of a database. It covers
//! the connection lifecycle, transaction control, raw statement execution,
//! schema introspection and the version-log primitives. Everything
//! engine-specific that does not need a connection lives in the adapter's
//! [`Dialect`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info};

use super::BackendType;
use crate::error::{MigrationError, MigrationResult};
use crate::migrations::VersionLogEntry;
use crate::schema::{ForeignKey, Index, IndexType, ReferentialAction, TableDefinition};
use crate::translator::Dialect;

/// Database value used for parameter binding and decoded rows
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
}

impl DatabaseValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Booleans come back as integers from engines without a boolean type
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Bool(b) => Some(*b),
            DatabaseValue::Int64(i) => Some(*i != 0),
            DatabaseValue::String(s) => match s.as_str() {
                "1" | "t" | "true" | "TRUE" => Some(true),
                "0" | "f" | "false" | "FALSE" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::Bool(b) => Some(i64::from(*b)),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Timestamps may be decoded natively or arrive as text (SQLite)
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            DatabaseValue::DateTime(dt) => Some(*dt),
            DatabaseValue::String(s) => parse_timestamp(s),
            _ => None,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// A decoded result row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatabaseRow {
    pub columns: Vec<String>,
    pub values: Vec<DatabaseValue>,
}

impl DatabaseRow {
    /// Value of the named column; lookups ignore ASCII case
    pub fn get(&self, name: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    pub fn try_get(&self, name: &str) -> MigrationResult<&DatabaseValue> {
        self.get(name).ok_or_else(|| MigrationError::Adapter {
            message: format!("column '{}' not found in result row", name),
            statement: None,
        })
    }

    /// Non-null text value of the named column
    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            DatabaseValue::Null => None,
            DatabaseValue::String(s) => Some(s.clone()),
            DatabaseValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            DatabaseValue::Int64(i) => Some(i.to_string()),
            DatabaseValue::Float64(f) => Some(f.to_string()),
            DatabaseValue::Bool(b) => Some(b.to_string()),
            DatabaseValue::DateTime(dt) => Some(dt.to_rfc3339()),
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(DatabaseValue::as_i64)
    }
}

/// Per-engine capability provider bound to one database target
#[async_trait]
pub trait Adapter: Send {
    fn backend_type(&self) -> BackendType;

    /// SQL generation rules for this engine
    fn dialect(&self) -> &dyn Dialect;

    /// Name of the version log table
    fn log_table(&self) -> &str;

    async fn connect(&mut self) -> MigrationResult<()>;

    async fn disconnect(&mut self) -> MigrationResult<()>;

    fn is_connected(&self) -> bool;

    fn in_transaction(&self) -> bool;

    async fn begin_transaction(&mut self) -> MigrationResult<()>;

    async fn commit_transaction(&mut self) -> MigrationResult<()>;

    async fn rollback_transaction(&mut self) -> MigrationResult<()>;

    /// Execute a statement and return the affected row count
    async fn execute_with(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<u64>;

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrationResult<Vec<DatabaseRow>>;

    async fn has_table(&mut self, table: &str) -> MigrationResult<bool>;

    /// Introspect an existing table. Missing tables are a validation error.
    async fn describe_table(&mut self, table: &str) -> MigrationResult<TableDefinition>;

    async fn ping(&mut self) -> MigrationResult<()> {
        self.fetch_all("SELECT 1", &[]).await?;
        Ok(())
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.dialect().supports_transactional_ddl()
    }

    async fn execute(&mut self, sql: &str) -> MigrationResult<u64> {
        self.execute_with(sql, &[]).await
    }

    async fn has_column(&mut self, table: &str, column: &str) -> MigrationResult<bool> {
        if !self.has_table(table).await? {
            return Ok(false);
        }
        Ok(self.describe_table(table).await?.has_column(column))
    }

    async fn has_index(&mut self, table: &str, columns: &[&str]) -> MigrationResult<bool> {
        if !self.has_table(table).await? {
            return Ok(false);
        }
        let definition = self.describe_table(table).await?;
        Ok(definition
            .indexes
            .iter()
            .any(|index| index.matches_columns(columns)))
    }

    async fn has_index_by_name(&mut self, table: &str, name: &str) -> MigrationResult<bool> {
        if !self.has_table(table).await? {
            return Ok(false);
        }
        let definition = self.describe_table(table).await?;
        Ok(definition
            .indexes
            .iter()
            .any(|index| index.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name))))
    }

    /// Match by constraint name when given, otherwise by local columns
    async fn has_foreign_key(
        &mut self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> MigrationResult<bool> {
        if !self.has_table(table).await? {
            return Ok(false);
        }
        let definition = self.describe_table(table).await?;
        Ok(definition.foreign_keys.iter().any(|fk| match constraint {
            Some(name) => fk
                .constraint_name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name)),
            None => fk.matches_columns(columns),
        }))
    }

    /// Create the version log table if it does not exist yet
    async fn ensure_log_table(&mut self) -> MigrationResult<()> {
        let table = self.log_table().to_string();
        if self.has_table(&table).await? {
            return Ok(());
        }
        info!("Creating version log table {}", table);
        let sql = self.dialect().create_log_table_sql(&table);
        self.execute(&sql).await?;
        Ok(())
    }

    /// Version log entries ascending by version
    async fn applied_versions(&mut self) -> MigrationResult<Vec<VersionLogEntry>> {
        let sql = self.dialect().select_versions_sql(self.log_table());
        let rows = self.fetch_all(&sql, &[]).await?;
        rows.iter().map(VersionLogEntry::from_row).collect()
    }

    async fn record_version(&mut self, entry: &VersionLogEntry) -> MigrationResult<()> {
        let sql = self.dialect().insert_version_sql(self.log_table());
        let params = [
            DatabaseValue::Int64(entry.version),
            DatabaseValue::String(entry.migration_name.clone()),
            DatabaseValue::DateTime(entry.start_time),
            DatabaseValue::from(entry.end_time),
            DatabaseValue::Bool(entry.breakpoint),
        ];
        debug!("Recording version {} in {}", entry.version, self.log_table());
        self.execute_with(&sql, &params).await?;
        Ok(())
    }

    async fn remove_version(&mut self, version: i64) -> MigrationResult<()> {
        let sql = self.dialect().delete_version_sql(self.log_table());
        debug!("Removing version {} from {}", version, self.log_table());
        self.execute_with(&sql, &[DatabaseValue::Int64(version)])
            .await?;
        Ok(())
    }

    async fn set_breakpoint(&mut self, version: i64, breakpoint: bool) -> MigrationResult<u64> {
        let sql = self.dialect().update_breakpoint_sql(self.log_table());
        self.execute_with(
            &sql,
            &[DatabaseValue::Bool(breakpoint), DatabaseValue::Int64(version)],
        )
        .await
    }

    async fn reset_breakpoints(&mut self) -> MigrationResult<u64> {
        let sql = self.dialect().reset_breakpoints_sql(self.log_table());
        self.execute(&sql).await
    }
}

/// Error for operations attempted before `connect()`
pub(crate) fn not_connected(backend: BackendType) -> MigrationError {
    MigrationError::Connection(format!("{} adapter is not connected", backend))
}

/// Error for a statement the driver rejected
pub(crate) fn statement_error(err: sqlx::Error, sql: &str) -> MigrationError {
    MigrationError::statement(err.to_string(), sql)
}

/// Validation error for introspection of a table that does not exist
pub(crate) fn missing_table(table: &str) -> MigrationError {
    MigrationError::Validation(format!("table '{}' does not exist", table))
}

/// Fold one-row-per-column catalog results into indexes.
///
/// Rows must be ordered by index name then key position and carry
/// `index_name`, `column_name`, `is_unique` and optionally `index_type`,
/// `method`, `predicate` and `sub_part`.
pub(crate) fn indexes_from_rows(rows: &[DatabaseRow]) -> Vec<Index> {
    let mut indexes: Vec<Index> = Vec::new();
    for row in rows {
        let (Some(name), Some(column)) = (row.get_string("index_name"), row.get_string("column_name"))
        else {
            continue;
        };
        if let Some(index) = indexes
            .iter_mut()
            .find(|i| i.name.as_deref() == Some(name.as_str()))
        {
            index.columns.push(column);
            continue;
        }

        let fulltext = row
            .get_string("index_type")
            .is_some_and(|t| t.eq_ignore_ascii_case("fulltext"));
        let unique = row
            .get("is_unique")
            .and_then(DatabaseValue::as_bool)
            .unwrap_or(false);
        let mut index = Index::new([column]).named(name);
        index.index_type = if fulltext {
            IndexType::Fulltext
        } else if unique {
            IndexType::Unique
        } else {
            IndexType::Index
        };
        index.using = row.get_string("method");
        index.where_clause = row.get_string("predicate");
        index.limit = row
            .get_i64("sub_part")
            .and_then(|n| u32::try_from(n).ok());
        indexes.push(index);
    }
    indexes
}

/// Fold one-row-per-column catalog results into foreign keys.
///
/// Rows must be ordered by constraint name then key position and carry
/// `name`, `column_name`, `referenced_table`, `referenced_column`,
/// `on_delete` and `on_update`.
pub(crate) fn foreign_keys_from_rows(
    rows: &[DatabaseRow],
    parse_action: fn(&str) -> Option<ReferentialAction>,
) -> Vec<ForeignKey> {
    let mut foreign_keys: Vec<ForeignKey> = Vec::new();
    for row in rows {
        let (Some(name), Some(column), Some(referenced_table), Some(referenced_column)) = (
            row.get_string("name"),
            row.get_string("column_name"),
            row.get_string("referenced_table"),
            row.get_string("referenced_column"),
        ) else {
            continue;
        };
        if let Some(fk) = foreign_keys
            .iter_mut()
            .find(|fk| fk.constraint_name.as_deref() == Some(name.as_str()))
        {
            fk.columns.push(column);
            fk.referenced_columns.push(referenced_column);
            continue;
        }

        let mut fk = ForeignKey::new([column], referenced_table, [referenced_column]).constraint(name);
        fk.on_delete = row.get_string("on_delete").and_then(|a| parse_action(&a));
        fk.on_update = row.get_string("on_update").and_then(|a| parse_action(&a));
        foreign_keys.push(fk);
    }
    foreign_keys
}

/// Referential action spelled out by the catalog; the engine default maps to none
pub(crate) fn parse_action_name(action: &str) -> Option<ReferentialAction> {
    match action.parse::<ReferentialAction>() {
        Ok(ReferentialAction::NoAction) | Err(_) => None,
        Ok(action) => Some(action),
    }
}
