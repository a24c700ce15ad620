//! Schema operations
//!
//! Every change a migration makes is expressed as a [`SchemaOperation`]. The
//! translator turns one operation into an ordered list of statements; change
//! migrations are reversed by inverting their recorded operations.

use super::column::Column;
use super::definition::{ColumnMap, TableDefinition};
use super::foreign_key::ForeignKey;
use super::index::Index;
use crate::error::{MigrationError, MigrationResult};

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOperation {
    CreateTable(TableDefinition),
    DropTable {
        table: String,
    },
    RenameTable {
        from: String,
        to: String,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    /// Redefine `name`; the new definition may carry a new name
    ChangeColumn {
        table: String,
        name: String,
        column: Column,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    RemoveColumn {
        table: String,
        name: String,
    },
    AddIndex {
        table: String,
        index: Index,
    },
    /// Remove the index covering exactly `columns`
    RemoveIndex {
        table: String,
        columns: Vec<String>,
    },
    RemoveIndexByName {
        table: String,
        name: String,
    },
    AddForeignKey {
        table: String,
        foreign_key: ForeignKey,
    },
    /// Drop a foreign key by constraint name, or by its columns when unnamed
    DropForeignKey {
        table: String,
        columns: Vec<String>,
        constraint: Option<String>,
    },
    /// Replace `table` with a copy built from `to`: create a shadow table,
    /// copy the mapped columns, drop the original and rename the shadow.
    /// Runs as one indivisible operation.
    RebuildTable {
        table: String,
        from: TableDefinition,
        to: TableDefinition,
        copy_columns: ColumnMap,
    },
    /// Raw SQL, passed through untouched
    Execute(String),
}

impl SchemaOperation {
    /// The table this operation targets
    pub fn table(&self) -> Option<&str> {
        match self {
            SchemaOperation::CreateTable(def) => Some(&def.name),
            SchemaOperation::RenameTable { from, .. } => Some(from),
            SchemaOperation::DropTable { table }
            | SchemaOperation::AddColumn { table, .. }
            | SchemaOperation::ChangeColumn { table, .. }
            | SchemaOperation::RenameColumn { table, .. }
            | SchemaOperation::RemoveColumn { table, .. }
            | SchemaOperation::AddIndex { table, .. }
            | SchemaOperation::RemoveIndex { table, .. }
            | SchemaOperation::RemoveIndexByName { table, .. }
            | SchemaOperation::AddForeignKey { table, .. }
            | SchemaOperation::DropForeignKey { table, .. }
            | SchemaOperation::RebuildTable { table, .. } => Some(table),
            SchemaOperation::Execute(_) => None,
        }
    }

    /// Short human-readable form for logs and error messages
    pub fn describe(&self) -> String {
        match self {
            SchemaOperation::CreateTable(def) => format!("create table {}", def.name),
            SchemaOperation::DropTable { table } => format!("drop table {}", table),
            SchemaOperation::RenameTable { from, to } => format!("rename table {} to {}", from, to),
            SchemaOperation::AddColumn { table, column } => {
                format!("add column {}.{}", table, column.name)
            }
            SchemaOperation::ChangeColumn { table, name, .. } => {
                format!("change column {}.{}", table, name)
            }
            SchemaOperation::RenameColumn { table, from, to } => {
                format!("rename column {}.{} to {}", table, from, to)
            }
            SchemaOperation::RemoveColumn { table, name } => {
                format!("remove column {}.{}", table, name)
            }
            SchemaOperation::AddIndex { table, index } => {
                format!("add {} on {} ({})", index.index_type, table, index.columns.join(", "))
            }
            SchemaOperation::RemoveIndex { table, columns } => {
                format!("remove index on {} ({})", table, columns.join(", "))
            }
            SchemaOperation::RemoveIndexByName { table, name } => {
                format!("remove index {} on {}", name, table)
            }
            SchemaOperation::AddForeignKey { table, foreign_key } => format!(
                "add foreign key {} ({}) -> {}",
                table,
                foreign_key.columns.join(", "),
                foreign_key.referenced_table
            ),
            SchemaOperation::DropForeignKey { table, columns, .. } => {
                format!("drop foreign key {} ({})", table, columns.join(", "))
            }
            SchemaOperation::RebuildTable { table, .. } => format!("rebuild table {}", table),
            SchemaOperation::Execute(sql) => format!("execute `{}`", sql.trim()),
        }
    }

    /// The operation that undoes this one, if it can be derived from the
    /// operation alone. Drops, removals, type changes, rebuilds and raw SQL
    /// lose information and have no inverse.
    pub fn inverse(&self) -> Option<SchemaOperation> {
        let inverse = match self {
            SchemaOperation::CreateTable(def) => SchemaOperation::DropTable {
                table: def.name.clone(),
            },
            SchemaOperation::RenameTable { from, to } => SchemaOperation::RenameTable {
                from: to.clone(),
                to: from.clone(),
            },
            SchemaOperation::AddColumn { table, column } => SchemaOperation::RemoveColumn {
                table: table.clone(),
                name: column.name.clone(),
            },
            SchemaOperation::RenameColumn { table, from, to } => SchemaOperation::RenameColumn {
                table: table.clone(),
                from: to.clone(),
                to: from.clone(),
            },
            SchemaOperation::AddIndex { table, index } => match &index.name {
                Some(name) => SchemaOperation::RemoveIndexByName {
                    table: table.clone(),
                    name: name.clone(),
                },
                None => SchemaOperation::RemoveIndex {
                    table: table.clone(),
                    columns: index.columns.clone(),
                },
            },
            SchemaOperation::AddForeignKey { table, foreign_key } => {
                SchemaOperation::DropForeignKey {
                    table: table.clone(),
                    columns: foreign_key.columns.clone(),
                    constraint: foreign_key.constraint_name.clone(),
                }
            }
            SchemaOperation::DropTable { .. }
            | SchemaOperation::ChangeColumn { .. }
            | SchemaOperation::RemoveColumn { .. }
            | SchemaOperation::RemoveIndex { .. }
            | SchemaOperation::RemoveIndexByName { .. }
            | SchemaOperation::DropForeignKey { .. }
            | SchemaOperation::RebuildTable { .. }
            | SchemaOperation::Execute(_) => return None,
        };
        Some(inverse)
    }

    /// Reject operations that are incomplete before any SQL is generated
    pub(crate) fn validate(&self) -> MigrationResult<()> {
        if let Some(table) = self.table() {
            if table.trim().is_empty() {
                return Err(MigrationError::Validation(format!(
                    "{}: table name must not be empty",
                    self.describe()
                )));
            }
        }
        match self {
            SchemaOperation::CreateTable(def) => def.validate(),
            SchemaOperation::AddColumn { column, .. }
            | SchemaOperation::ChangeColumn { column, .. } => column.validate(),
            SchemaOperation::AddIndex { index, .. } => index.validate(),
            SchemaOperation::AddForeignKey { foreign_key, .. } => foreign_key.validate(),
            SchemaOperation::RenameTable { to, .. } | SchemaOperation::RenameColumn { to, .. }
                if to.trim().is_empty() =>
            {
                Err(MigrationError::Validation(format!(
                    "{}: new name must not be empty",
                    self.describe()
                )))
            }
            SchemaOperation::RemoveIndex { columns, .. } if columns.is_empty() => Err(
                MigrationError::Validation("remove index: no columns given".to_string()),
            ),
            SchemaOperation::Execute(sql) if sql.trim().is_empty() => Err(
                MigrationError::Validation("cannot execute an empty statement".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
