//! SQLite dialect
//!
//! SQLite cannot change or drop columns, nor add or drop foreign keys, in
//! place. Those operations are reported by [`Dialect::requires_rebuild`] and
//! arrive here as [`SchemaOperation::RebuildTable`].

use tracing::warn;

use super::{
    base_column_definition, check_identifier, foreign_key_clause, generate_name, index_name,
    quote_columns, quote_with, with_size, Dialect, SqlType,
};
use crate::backends::BackendType;
use crate::error::{MigrationError, MigrationResult};
use crate::schema::{Column, ColumnType, Index, IndexType, SchemaOperation, TableDefinition};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// `CREATE TABLE` for `def` under `physical_name`; constraint names are
    /// derived from the logical name so they survive a rebuild
    fn create_table_sql(&self, def: &TableDefinition, physical_name: &str) -> MigrationResult<String> {
        check_identifier(self, &def.name)?;
        let identity = def.identity_column().map(|c| c.name.clone());

        let mut parts = Vec::with_capacity(def.columns.len() + 2);
        for column in &def.columns {
            let is_identity = identity
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(&column.name));
            if is_identity {
                parts.push(format!(
                    "{} INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT",
                    self.quote_identifier(&column.name)
                ));
            } else if column.options.identity {
                let mut plain = column.clone();
                plain.options.identity = false;
                parts.push(self.column_definition(&plain)?);
            } else {
                parts.push(self.column_definition(column)?);
            }
        }
        if identity.is_none() && !def.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", quote_columns(self, &def.primary_key)));
        }
        for fk in &def.foreign_keys {
            parts.push(foreign_key_clause(self, &def.name, fk)?);
        }

        Ok(format!(
            "CREATE TABLE {} ({})",
            self.quote_identifier(physical_name),
            parts.join(", ")
        ))
    }

    fn create_index(&self, table: &str, index: &Index) -> MigrationResult<String> {
        index.validate()?;
        if index.index_type == IndexType::Fulltext {
            return Err(MigrationError::Validation(format!(
                "SQLite has no fulltext index type (index on {} ({}))",
                table,
                index.columns.join(", ")
            )));
        }
        if let Some(method) = &index.using {
            warn!("SQLite ignores index method '{}' on {}", method, table);
        }
        if index.limit.is_some() {
            warn!("SQLite ignores index prefix limits on {}", table);
        }
        let name = index_name(self, table, index)?;
        let predicate = match &index.where_clause {
            Some(predicate) => format!(" WHERE {}", predicate),
            None => String::new(),
        };
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({}){}",
            if index.is_unique() { "UNIQUE " } else { "" },
            self.quote_identifier(&name),
            self.quote_identifier(table),
            quote_columns(self, &index.columns),
            predicate
        ))
    }

    fn rebuild_table(
        &self,
        table: &str,
        to: &TableDefinition,
        copy_columns: &[(String, String)],
    ) -> MigrationResult<Vec<String>> {
        let shadow = format!("tmp_{}", table);
        let quoted_table = self.quote_identifier(table);
        let quoted_shadow = self.quote_identifier(&shadow);

        // expects foreign key enforcement off, see SqliteAdapter::begin_transaction
        let mut statements = vec![self.create_table_sql(to, &shadow)?];
        if !copy_columns.is_empty() {
            let targets: Vec<&str> = copy_columns.iter().map(|(t, _)| t.as_str()).collect();
            let sources: Vec<&str> = copy_columns.iter().map(|(_, s)| s.as_str()).collect();
            statements.push(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                quoted_shadow,
                quote_columns(self, &targets),
                quote_columns(self, &sources),
                quoted_table
            ));
        }
        statements.push(format!("DROP TABLE {}", quoted_table));
        statements.push(format!("ALTER TABLE {} RENAME TO {}", quoted_shadow, quoted_table));
        for index in &to.indexes {
            statements.push(self.create_index(table, index)?);
        }
        Ok(statements)
    }
}

impl Dialect for SqliteDialect {
    fn backend_type(&self) -> BackendType {
        BackendType::SQLite
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '"')
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn max_identifier_length(&self) -> usize {
        // no engine limit; keeps generated names readable
        128
    }

    fn column_type(&self, column: &Column) -> MigrationResult<String> {
        let options = &column.options;
        let sql_type = match column.column_type {
            ColumnType::String | ColumnType::Enum => format!("VARCHAR({})", options.limit.unwrap_or(255)),
            ColumnType::Char => format!("CHAR({})", options.limit.unwrap_or(255)),
            ColumnType::Text | ColumnType::Json => "TEXT".to_string(),
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Decimal => format!(
                "DECIMAL({},{})",
                options.precision.unwrap_or(10),
                options.scale.unwrap_or(0)
            ),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
        };
        Ok(sql_type)
    }

    fn column_definition(&self, column: &Column) -> MigrationResult<String> {
        if column.options.after.is_some() {
            warn!("SQLite cannot position columns; appending {}", column.name);
        }
        base_column_definition(self, column)
    }

    fn parse_column(&self, name: &str, sql_type: &str) -> Column {
        let parsed = SqlType::parse(sql_type);
        let column_type = match parsed.base.as_str() {
            "varchar" | "character varying" | "nvarchar" | "varying character" => ColumnType::String,
            "char" | "character" | "nchar" => ColumnType::Char,
            "smallint" => ColumnType::SmallInteger,
            "integer" | "int" | "mediumint" | "tinyint" => ColumnType::Integer,
            "bigint" => ColumnType::BigInteger,
            "float" | "real" => ColumnType::Float,
            "double" | "double precision" => ColumnType::Double,
            "decimal" | "numeric" => ColumnType::Decimal,
            "boolean" | "bool" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "datetime" => ColumnType::DateTime,
            "timestamp" => ColumnType::Timestamp,
            "blob" => ColumnType::Binary,
            "json" => ColumnType::Json,
            "uuid" => ColumnType::Uuid,
            _ => ColumnType::Text,
        };
        with_size(Column::new(name, column_type), &parsed)
    }

    fn requires_rebuild(&self, op: &SchemaOperation) -> bool {
        match op {
            SchemaOperation::ChangeColumn { .. }
            | SchemaOperation::RemoveColumn { .. }
            | SchemaOperation::AddForeignKey { .. }
            | SchemaOperation::DropForeignKey { .. } => true,
            // ADD COLUMN cannot add a NOT NULL column without a default
            SchemaOperation::AddColumn { column, .. } => {
                column.options.identity
                    || (!column.options.null && column.options.default.is_none())
            }
            _ => false,
        }
    }

    fn translate(&self, op: &SchemaOperation) -> MigrationResult<Vec<String>> {
        if self.requires_rebuild(op) {
            return Err(MigrationError::Validation(format!(
                "SQLite cannot {} in place; the table has to be rebuilt",
                op.describe()
            )));
        }
        let statements = match op {
            SchemaOperation::CreateTable(def) => {
                let mut statements = vec![self.create_table_sql(def, &def.name)?];
                for index in &def.indexes {
                    statements.push(self.create_index(&def.name, index)?);
                }
                statements
            }
            SchemaOperation::DropTable { table } => {
                vec![format!("DROP TABLE {}", self.quote_identifier(table))]
            }
            SchemaOperation::RenameTable { from, to } => {
                check_identifier(self, to)?;
                vec![format!(
                    "ALTER TABLE {} RENAME TO {}",
                    self.quote_identifier(from),
                    self.quote_identifier(to)
                )]
            }
            SchemaOperation::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.quote_identifier(table),
                self.column_definition(column)?
            )],
            SchemaOperation::RenameColumn { table, from, to } => {
                check_identifier(self, to)?;
                vec![format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    self.quote_identifier(table),
                    self.quote_identifier(from),
                    self.quote_identifier(to)
                )]
            }
            SchemaOperation::AddIndex { table, index } => vec![self.create_index(table, index)?],
            SchemaOperation::RemoveIndex { table, columns } => {
                let name = generate_name(table, columns, "index", self.max_identifier_length());
                vec![format!("DROP INDEX {}", self.quote_identifier(&name))]
            }
            SchemaOperation::RemoveIndexByName { name, .. } => {
                vec![format!("DROP INDEX {}", self.quote_identifier(name))]
            }
            SchemaOperation::RebuildTable {
                table,
                to,
                copy_columns,
                ..
            } => self.rebuild_table(table, to, copy_columns)?,
            SchemaOperation::Execute(sql) => vec![sql.clone()],
            SchemaOperation::ChangeColumn { .. }
            | SchemaOperation::RemoveColumn { .. }
            | SchemaOperation::AddForeignKey { .. }
            | SchemaOperation::DropForeignKey { .. } => Vec::new(),
        };
        Ok(statements)
    }

    fn create_log_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (\"version\" BIGINT NOT NULL, \"migration_name\" VARCHAR(100) NULL, \
             \"start_time\" TIMESTAMP NOT NULL, \"end_time\" TIMESTAMP NULL, \
             \"breakpoint\" BOOLEAN NOT NULL DEFAULT 0, PRIMARY KEY (\"version\"))",
            self.quote_identifier(table)
        )
    }
}
