//! Table definitions
//!
//! A [`TableDefinition`] is the full description of one table: its columns in
//! order, primary key, indexes and foreign keys. It is what `CREATE TABLE`
//! consumes and what adapter introspection produces.

use super::column::{Column, ColumnType};
use super::foreign_key::ForeignKey;
use super::index::Index;
use super::operation::SchemaOperation;
use crate::error::{MigrationError, MigrationResult};

/// How the implicit id column of a new table is created
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Auto-incrementing integer column named `id`
    #[default]
    Default,
    /// Auto-incrementing integer column with a custom name
    Named(String),
    /// No implicit id column
    None,
}

/// Table-level options
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableOptions {
    /// Storage engine (MySQL), defaults to InnoDB there
    pub engine: Option<String>,
    pub collation: Option<String>,
    pub comment: Option<String>,
    pub id: IdStrategy,
    /// Explicit primary key columns; suppresses the implicit id column
    pub primary_key: Vec<String>,
}

/// Complete description of a table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
    pub options: TableOptions,
}

/// Columns copied from the old table into its rebuilt replacement, as
/// `(target, source)` pairs
pub type ColumnMap = Vec<(String, String)>;

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    fn column_position(&self, name: &str) -> MigrationResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                MigrationError::Validation(format!(
                    "column '{}' does not exist on table '{}'",
                    name, self.name
                ))
            })
    }

    /// The single auto-incrementing primary key column, if the table has one
    pub fn identity_column(&self) -> Option<&Column> {
        match self.primary_key.as_slice() {
            [pk] => self
                .column(pk)
                .filter(|c| c.options.identity && c.column_type.is_integer()),
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> MigrationResult<()> {
        if self.name.trim().is_empty() {
            return Err(MigrationError::Validation(
                "table name must not be empty".to_string(),
            ));
        }
        if self.columns.is_empty() {
            return Err(MigrationError::Validation(format!(
                "table '{}' must have at least one column",
                self.name
            )));
        }
        for (i, column) in self.columns.iter().enumerate() {
            column.validate()?;
            if self.columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(MigrationError::Validation(format!(
                    "column '{}' is declared twice on table '{}'",
                    column.name, self.name
                )));
            }
        }
        for pk in &self.primary_key {
            self.column_position(pk)?;
        }
        for index in &self.indexes {
            index.validate()?;
            for column in &index.columns {
                self.column_position(column)?;
            }
        }
        for fk in &self.foreign_keys {
            fk.validate()?;
            for column in &fk.columns {
                self.column_position(column)?;
            }
        }
        Ok(())
    }

    /// Compute the definition that results from applying `op` to this table,
    /// together with the columns to copy across when the table is rebuilt.
    ///
    /// Only column and foreign key alterations are supported; they are the
    /// operations an engine without in-place `ALTER` has to emulate.
    pub fn apply(&self, op: &SchemaOperation) -> MigrationResult<(TableDefinition, ColumnMap)> {
        let mut next = self.clone();
        let mut map: ColumnMap = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.name.clone()))
            .collect();

        match op {
            SchemaOperation::AddColumn { column, .. } => {
                if self.has_column(&column.name) {
                    return Err(MigrationError::Validation(format!(
                        "column '{}' already exists on table '{}'",
                        column.name, self.name
                    )));
                }
                let position = match &column.options.after {
                    Some(after) => self.column_position(after)? + 1,
                    None => next.columns.len(),
                };
                next.columns.insert(position, column.clone());
            }
            SchemaOperation::ChangeColumn { name, column, .. } => {
                let position = self.column_position(name)?;
                next.columns[position] = column.clone();
                next.rename_references(name, &column.name);
                map[position].0 = column.name.clone();
            }
            SchemaOperation::RenameColumn { from, to, .. } => {
                let position = self.column_position(from)?;
                next.columns[position].name = to.clone();
                next.rename_references(from, to);
                map[position].0 = to.clone();
            }
            SchemaOperation::RemoveColumn { name, .. } => {
                let position = self.column_position(name)?;
                if self.primary_key.iter().any(|pk| pk.eq_ignore_ascii_case(name)) {
                    return Err(MigrationError::Validation(format!(
                        "column '{}' is part of the primary key of '{}' and cannot be removed",
                        name, self.name
                    )));
                }
                next.columns.remove(position);
                map.remove(position);
                next.indexes
                    .retain(|index| !index.columns.iter().any(|c| c.eq_ignore_ascii_case(name)));
                next.foreign_keys
                    .retain(|fk| !fk.columns.iter().any(|c| c.eq_ignore_ascii_case(name)));
            }
            SchemaOperation::AddForeignKey { foreign_key, .. } => {
                for column in &foreign_key.columns {
                    self.column_position(column)?;
                }
                next.foreign_keys.push(foreign_key.clone());
            }
            SchemaOperation::DropForeignKey {
                columns,
                constraint,
                ..
            } => {
                let position = constraint
                    .as_deref()
                    .and_then(|name| {
                        self.foreign_keys.iter().position(|fk| {
                            fk.constraint_name
                                .as_deref()
                                .is_some_and(|n| n.eq_ignore_ascii_case(name))
                        })
                    })
                    .or_else(|| self.foreign_keys.iter().position(|fk| fk.matches_columns(columns)))
                    .ok_or_else(|| {
                        MigrationError::Validation(format!(
                            "no foreign key on ({}) of table '{}'",
                            columns.join(", "),
                            self.name
                        ))
                    })?;
                next.foreign_keys.remove(position);
            }
            other => {
                return Err(MigrationError::Validation(format!(
                    "'{}' cannot be applied by rebuilding table '{}'",
                    other.describe(),
                    self.name
                )))
            }
        }

        next.validate()?;
        Ok((next, map))
    }

    fn rename_references(&mut self, from: &str, to: &str) {
        let rename = |columns: &mut Vec<String>| {
            for column in columns.iter_mut() {
                if column.eq_ignore_ascii_case(from) {
                    *column = to.to_string();
                }
            }
        };
        rename(&mut self.primary_key);
        for index in &mut self.indexes {
            rename(&mut index.columns);
        }
        for fk in &mut self.foreign_keys {
            rename(&mut fk.columns);
        }
    }

    /// Implicit id column for a new table, if the options ask for one
    pub(crate) fn implicit_id(options: &TableOptions) -> Option<Column> {
        if !options.primary_key.is_empty() {
            return None;
        }
        let name = match &options.id {
            IdStrategy::Default => "id".to_string(),
            IdStrategy::Named(name) => name.clone(),
            IdStrategy::None => return None,
        };
        Some(Column::new(name, ColumnType::Integer).identity())
    }
}
