//! Table builder
//!
//! A [`Table`] accumulates pending column, index and foreign key operations
//! through builder calls and flushes them, in order, on `create()`,
//! `update()` or `save()`.

use tracing::debug;

use super::column::{Column, ColumnType};
use super::definition::{IdStrategy, TableDefinition, TableOptions};
use super::executor::{Schema, SchemaMode};
use super::foreign_key::ForeignKey;
use super::index::Index;
use super::operation::SchemaOperation;
use super::options::OptionValue;
use crate::error::{MigrationError, MigrationResult};

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    options: TableOptions,
    pending: Vec<SchemaOperation>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: TableOptions::default(),
            pending: Vec::new(),
        }
    }

    pub fn with_options(name: impl Into<String>, options: TableOptions) -> Self {
        Self {
            options,
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub fn pending(&self) -> &[SchemaOperation] {
        &self.pending
    }

    /// Name of the implicit id column, or no id column with `None`
    pub fn id(mut self, id: IdStrategy) -> Self {
        self.options.id = id;
        self
    }

    pub fn primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.options.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.options.engine = Some(engine.into());
        self
    }

    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.options.collation = Some(collation.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.pending.push(SchemaOperation::AddColumn {
            table: self.name.clone(),
            column,
        });
        self
    }

    /// Add a column from a type and an option map
    pub fn add_column_with<K, V, I>(
        self,
        name: &str,
        column_type: ColumnType,
        options: I,
    ) -> MigrationResult<Self>
    where
        K: AsRef<str>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let column = Column::new(name, column_type).with_options(options)?;
        Ok(self.add_column(column))
    }

    pub fn change_column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.pending.push(SchemaOperation::ChangeColumn {
            table: self.name.clone(),
            name: name.into(),
            column,
        });
        self
    }

    pub fn rename_column(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.pending.push(SchemaOperation::RenameColumn {
            table: self.name.clone(),
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn remove_column(mut self, name: impl Into<String>) -> Self {
        self.pending.push(SchemaOperation::RemoveColumn {
            table: self.name.clone(),
            name: name.into(),
        });
        self
    }

    pub fn add_index(mut self, index: Index) -> Self {
        self.pending.push(SchemaOperation::AddIndex {
            table: self.name.clone(),
            index,
        });
        self
    }

    /// Add an index over `columns` configured from an option map
    pub fn add_index_with<S, K, V, I>(
        self,
        columns: impl IntoIterator<Item = S>,
        options: I,
    ) -> MigrationResult<Self>
    where
        S: Into<String>,
        K: AsRef<str>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let index = Index::new(columns).with_options(options)?;
        Ok(self.add_index(index))
    }

    pub fn remove_index<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.pending.push(SchemaOperation::RemoveIndex {
            table: self.name.clone(),
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn remove_index_by_name(mut self, name: impl Into<String>) -> Self {
        self.pending.push(SchemaOperation::RemoveIndexByName {
            table: self.name.clone(),
            name: name.into(),
        });
        self
    }

    pub fn add_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.pending.push(SchemaOperation::AddForeignKey {
            table: self.name.clone(),
            foreign_key,
        });
        self
    }

    pub fn drop_foreign_key<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
        constraint: Option<&str>,
    ) -> Self {
        self.pending.push(SchemaOperation::DropForeignKey {
            table: self.name.clone(),
            columns: columns.into_iter().map(Into::into).collect(),
            constraint: constraint.map(str::to_string),
        });
        self
    }

    /// Create the table from the pending columns, indexes and foreign keys
    pub async fn create(&mut self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        let definition = self.definition()?;
        schema.apply(SchemaOperation::CreateTable(definition)).await?;
        self.pending.clear();
        Ok(())
    }

    /// Apply the pending operations to an existing table, in order
    pub async fn update(&mut self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        if self.pending.is_empty() {
            return Err(MigrationError::Validation(format!(
                "nothing to update on table '{}'",
                self.name
            )));
        }
        let pending = std::mem::take(&mut self.pending);
        debug!("Updating table {} with {} operation(s)", self.name, pending.len());
        for op in pending {
            schema.apply(op).await?;
        }
        Ok(())
    }

    /// `update()` when the table exists, `create()` otherwise
    ///
    /// Not reversible: when a `change()` is recorded for rollback the table
    /// always exists, so use `create()` or `update()` there.
    pub async fn save(&mut self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        if schema.mode() == SchemaMode::Record {
            return Err(MigrationError::Validation(format!(
                "save() on table '{}' cannot be reversed, use create() or update()",
                self.name
            )));
        }
        if schema.has_table(&self.name).await? {
            self.update(schema).await
        } else {
            self.create(schema).await
        }
    }

    pub async fn drop(&mut self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        schema
            .apply(SchemaOperation::DropTable {
                table: self.name.clone(),
            })
            .await
    }

    pub async fn rename(&mut self, schema: &mut Schema<'_>, new_name: &str) -> MigrationResult<()> {
        schema
            .apply(SchemaOperation::RenameTable {
                from: self.name.clone(),
                to: new_name.to_string(),
            })
            .await?;
        self.name = new_name.to_string();
        for op in &mut self.pending {
            retarget(op, new_name);
        }
        Ok(())
    }

    pub async fn exists(&self, schema: &mut Schema<'_>) -> MigrationResult<bool> {
        schema.has_table(&self.name).await
    }

    pub async fn has_column(&self, schema: &mut Schema<'_>, column: &str) -> MigrationResult<bool> {
        schema.has_column(&self.name, column).await
    }

    /// Fold pending additions into a full definition for `CREATE TABLE`
    fn definition(&self) -> MigrationResult<TableDefinition> {
        let mut definition = TableDefinition::new(self.name.clone());
        definition.options = self.options.clone();

        if let Some(id) = TableDefinition::implicit_id(&self.options) {
            definition.primary_key = vec![id.name.clone()];
            definition.columns.push(id);
        } else {
            definition.primary_key = self.options.primary_key.clone();
        }

        for op in &self.pending {
            match op {
                SchemaOperation::AddColumn { column, .. } => definition.columns.push(column.clone()),
                SchemaOperation::AddIndex { index, .. } => definition.indexes.push(index.clone()),
                SchemaOperation::AddForeignKey { foreign_key, .. } => {
                    definition.foreign_keys.push(foreign_key.clone())
                }
                other => {
                    return Err(MigrationError::Validation(format!(
                        "cannot {} while creating table '{}'",
                        other.describe(),
                        self.name
                    )))
                }
            }
        }
        Ok(definition)
    }
}

fn retarget(op: &mut SchemaOperation, new_name: &str) {
    match op {
        SchemaOperation::AddColumn { table, .. }
        | SchemaOperation::ChangeColumn { table, .. }
        | SchemaOperation::RenameColumn { table, .. }
        | SchemaOperation::RemoveColumn { table, .. }
        | SchemaOperation::AddIndex { table, .. }
        | SchemaOperation::RemoveIndex { table, .. }
        | SchemaOperation::RemoveIndexByName { table, .. }
        | SchemaOperation::AddForeignKey { table, .. }
        | SchemaOperation::DropForeignKey { table, .. } => *table = new_name.to_string(),
        _ => {}
    }
}
