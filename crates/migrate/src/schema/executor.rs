//! Schema execution handle
//!
//! Migrations receive a [`Schema`] and issue operations through it. In
//! execute mode each operation is translated by the adapter's dialect and run
//! immediately; in record mode operations are only collected, which is how
//! `change()` migrations are inverted.

use tracing::{debug, warn};

use super::column::Column;
use super::operation::SchemaOperation;
use super::definition::TableDefinition;
use crate::backends::Adapter;
use crate::error::{MigrationError, MigrationResult};
use crate::translator::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    Execute,
    Record,
}

/// Operation sink bound to one adapter for the duration of a migration
pub struct Schema<'a> {
    adapter: &'a mut dyn Adapter,
    mode: SchemaMode,
    recorded: Vec<SchemaOperation>,
    statements_executed: usize,
}

impl<'a> Schema<'a> {
    pub fn new(adapter: &'a mut dyn Adapter) -> Self {
        Self {
            adapter,
            mode: SchemaMode::Execute,
            recorded: Vec::new(),
            statements_executed: 0,
        }
    }

    pub fn recording(adapter: &'a mut dyn Adapter) -> Self {
        Self {
            mode: SchemaMode::Record,
            ..Self::new(adapter)
        }
    }

    pub fn mode(&self) -> SchemaMode {
        self.mode
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.adapter.dialect()
    }

    /// Statements successfully executed through this handle
    pub fn statements_executed(&self) -> usize {
        self.statements_executed
    }

    pub fn into_recorded(self) -> Vec<SchemaOperation> {
        self.recorded
    }

    /// Run a raw SQL statement
    pub async fn execute(&mut self, sql: impl Into<String>) -> MigrationResult<()> {
        self.apply(SchemaOperation::Execute(sql.into())).await
    }

    /// Validate, translate and run (or record) one operation
    pub async fn apply(&mut self, op: SchemaOperation) -> MigrationResult<()> {
        op.validate()?;
        if self.mode == SchemaMode::Record {
            debug!("Recorded {}", op.describe());
            self.recorded.push(op);
            return Ok(());
        }

        let op = if self.adapter.dialect().requires_rebuild(&op) {
            self.rebuild_for(op).await?
        } else {
            self.resolve_names(op).await?
        };

        let statements = self.adapter.dialect().translate(&op)?;
        debug!("{} -> {} statement(s)", op.describe(), statements.len());
        for sql in statements {
            self.adapter.execute(&sql).await?;
            self.statements_executed += 1;
        }
        Ok(())
    }

    /// Look up the real names of indexes and foreign keys addressed by columns
    async fn resolve_names(&mut self, op: SchemaOperation) -> MigrationResult<SchemaOperation> {
        match op {
            SchemaOperation::RemoveIndex { table, columns } => {
                let definition = self.adapter.describe_table(&table).await?;
                let name = definition
                    .indexes
                    .iter()
                    .find(|index| index.matches_columns(&columns))
                    .and_then(|index| index.name.clone())
                    .ok_or_else(|| {
                        MigrationError::Validation(format!(
                            "no index on ({}) of table '{}'",
                            columns.join(", "),
                            table
                        ))
                    })?;
                Ok(SchemaOperation::RemoveIndexByName { table, name })
            }
            SchemaOperation::DropForeignKey {
                table,
                columns,
                constraint: None,
            } => {
                let definition = self.adapter.describe_table(&table).await?;
                let constraint = definition
                    .foreign_keys
                    .iter()
                    .find(|fk| fk.matches_columns(&columns))
                    .and_then(|fk| fk.constraint_name.clone())
                    .ok_or_else(|| {
                        MigrationError::Validation(format!(
                            "no foreign key on ({}) of table '{}'",
                            columns.join(", "),
                            table
                        ))
                    })?;
                Ok(SchemaOperation::DropForeignKey {
                    table,
                    columns,
                    constraint: Some(constraint),
                })
            }
            other => Ok(other),
        }
    }

    /// Lower an alteration the engine cannot do in place into a table rebuild
    async fn rebuild_for(&mut self, op: SchemaOperation) -> MigrationResult<SchemaOperation> {
        let table = op
            .table()
            .ok_or_else(|| {
                MigrationError::Validation(format!("{} has no target table", op.describe()))
            })?
            .to_string();
        let from = self.adapter.describe_table(&table).await?;
        let (to, copy_columns) = from.apply(&op)?;
        debug!("Rebuilding table {} for {}", table, op.describe());
        Ok(SchemaOperation::RebuildTable {
            table,
            from,
            to,
            copy_columns,
        })
    }

    pub async fn has_table(&mut self, table: &str) -> MigrationResult<bool> {
        self.adapter.has_table(table).await
    }

    pub async fn has_column(&mut self, table: &str, column: &str) -> MigrationResult<bool> {
        self.adapter.has_column(table, column).await
    }

    pub async fn has_index(&mut self, table: &str, columns: &[&str]) -> MigrationResult<bool> {
        self.adapter.has_index(table, columns).await
    }

    pub async fn has_index_by_name(&mut self, table: &str, name: &str) -> MigrationResult<bool> {
        self.adapter.has_index_by_name(table, name).await
    }

    pub async fn has_foreign_key(
        &mut self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> MigrationResult<bool> {
        self.adapter.has_foreign_key(table, columns, constraint).await
    }

    pub async fn describe_table(&mut self, table: &str) -> MigrationResult<TableDefinition> {
        self.adapter.describe_table(table).await
    }

    /// Columns of an existing table
    pub async fn columns(&mut self, table: &str) -> MigrationResult<Vec<Column>> {
        if !self.adapter.has_table(table).await? {
            warn!("Table {} does not exist", table);
            return Ok(Vec::new());
        }
        Ok(self.adapter.describe_table(table).await?.columns)
    }
}
