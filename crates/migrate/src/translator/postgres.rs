//! PostgreSQL dialect

use tracing::warn;

use super::{
    check_identifier, check_keyword, check_limit, foreign_key_clause, foreign_key_name,
    generate_name, index_name, parse_default_literal, quote_columns, quote_with, with_size,
    Dialect, SqlType,
};
use crate::backends::BackendType;
use crate::error::{MigrationError, MigrationResult};
use crate::schema::{
    Column, ColumnDefault, ColumnType, Index, IndexType, SchemaOperation, TableDefinition,
};

const MAX_CHAR_LENGTH: u32 = 10_485_760;
const MAX_NUMERIC_PRECISION: u32 = 1000;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    fn create_table(&self, def: &TableDefinition) -> MigrationResult<Vec<String>> {
        check_identifier(self, &def.name)?;
        let table = self.quote_identifier(&def.name);

        let mut parts = Vec::with_capacity(def.columns.len() + 2);
        for column in &def.columns {
            parts.push(self.column_definition(column)?);
        }
        if !def.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", quote_columns(self, &def.primary_key)));
        }
        for fk in &def.foreign_keys {
            parts.push(foreign_key_clause(self, &def.name, fk)?);
        }

        let mut statements = vec![format!("CREATE TABLE {} ({})", table, parts.join(", "))];
        if let Some(comment) = &def.options.comment {
            statements.push(format!(
                "COMMENT ON TABLE {} IS {}",
                table,
                self.quote_string(comment)
            ));
        }
        for column in &def.columns {
            statements.extend(self.column_comment(&def.name, column));
        }
        for index in &def.indexes {
            statements.push(self.create_index(&def.name, index)?);
        }
        if def.options.engine.is_some() || def.options.collation.is_some() {
            warn!(
                "PostgreSQL ignores table engine and collation options on {}",
                def.name
            );
        }
        Ok(statements)
    }

    fn column_comment(&self, table: &str, column: &Column) -> Option<String> {
        column.options.comment.as_ref().map(|comment| {
            format!(
                "COMMENT ON COLUMN {}.{} IS {}",
                self.quote_identifier(table),
                self.quote_identifier(&column.name),
                self.quote_string(comment)
            )
        })
    }

    fn create_index(&self, table: &str, index: &Index) -> MigrationResult<String> {
        index.validate()?;
        if index.index_type == IndexType::Fulltext {
            return Err(MigrationError::Validation(format!(
                "PostgreSQL has no fulltext index type (index on {} ({}))",
                table,
                index.columns.join(", ")
            )));
        }
        if index.limit.is_some() {
            warn!("PostgreSQL ignores index prefix limits on {}", table);
        }
        let name = index_name(self, table, index)?;
        let using = match &index.using {
            Some(method) => {
                check_keyword("index method", method)?;
                format!(" USING {}", method)
            }
            None => String::new(),
        };
        let predicate = match &index.where_clause {
            Some(predicate) => format!(" WHERE {}", predicate),
            None => String::new(),
        };
        Ok(format!(
            "CREATE {}INDEX {} ON {}{} ({}){}",
            if index.is_unique() { "UNIQUE " } else { "" },
            self.quote_identifier(&name),
            self.quote_identifier(table),
            using,
            quote_columns(self, &index.columns),
            predicate
        ))
    }

    fn change_column(&self, table: &str, name: &str, column: &Column) -> MigrationResult<Vec<String>> {
        column.validate()?;
        let quoted_table = self.quote_identifier(table);
        let mut statements = Vec::new();

        if name != column.name {
            check_identifier(self, &column.name)?;
            statements.push(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                quoted_table,
                self.quote_identifier(name),
                self.quote_identifier(&column.name)
            ));
        }

        // serial pseudo-types are only valid at creation
        let mut plain = column.clone();
        plain.options.identity = false;
        let sql_type = self.column_type(&plain)?;
        let target = self.quote_identifier(&column.name);

        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
            quoted_table, target, sql_type, target, sql_type
        ));
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            quoted_table,
            target,
            if column.options.null { "DROP NOT NULL" } else { "SET NOT NULL" }
        ));
        statements.push(match &column.options.default {
            Some(default) => format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                quoted_table,
                target,
                super::default_sql(self, default)
            ),
            None => format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT", quoted_table, target),
        });
        statements.extend(self.column_comment(table, column));
        Ok(statements)
    }
}

impl Dialect for PostgresDialect {
    fn backend_type(&self) -> BackendType {
        BackendType::PostgreSQL
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '"')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn max_identifier_length(&self) -> usize {
        63
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn column_type(&self, column: &Column) -> MigrationResult<String> {
        let options = &column.options;
        let backend = self.backend_type();
        let sql_type = match column.column_type {
            ColumnType::String | ColumnType::Enum => {
                let limit = options.limit.unwrap_or(255);
                check_limit(column, "VARCHAR", limit, MAX_CHAR_LENGTH, backend)?;
                format!("VARCHAR({})", limit)
            }
            ColumnType::Char => {
                let limit = options.limit.unwrap_or(255);
                check_limit(column, "CHAR", limit, MAX_CHAR_LENGTH, backend)?;
                format!("CHAR({})", limit)
            }
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::SmallInteger if options.identity => "SMALLSERIAL".to_string(),
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::Integer if options.identity => "SERIAL".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger if options.identity => "BIGSERIAL".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal => {
                let precision = options.precision.unwrap_or(10);
                check_limit(column, "NUMERIC precision", precision, MAX_NUMERIC_PRECISION, backend)?;
                format!("NUMERIC({},{})", precision, options.scale.unwrap_or(0))
            }
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "TIMESTAMP".to_string(),
            ColumnType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
        };
        Ok(sql_type)
    }

    fn parse_column(&self, name: &str, sql_type: &str) -> Column {
        let parsed = SqlType::parse(sql_type);
        let column_type = match parsed.base.as_str() {
            "character varying" | "varchar" => ColumnType::String,
            "character" | "char" | "bpchar" => ColumnType::Char,
            "smallint" | "int2" => ColumnType::SmallInteger,
            "integer" | "int" | "int4" => ColumnType::Integer,
            "bigint" | "int8" => ColumnType::BigInteger,
            "real" | "float4" => ColumnType::Float,
            "double precision" | "float8" => ColumnType::Double,
            "numeric" | "decimal" => ColumnType::Decimal,
            "boolean" | "bool" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "time" | "time without time zone" => ColumnType::Time,
            "timestamp" | "timestamp without time zone" => ColumnType::DateTime,
            "timestamp with time zone" | "timestamptz" => ColumnType::Timestamp,
            "bytea" => ColumnType::Binary,
            "json" | "jsonb" => ColumnType::Json,
            "uuid" => ColumnType::Uuid,
            _ => ColumnType::Text,
        };
        with_size(Column::new(name, column_type), &parsed)
    }

    fn parse_default(&self, raw: &str) -> Option<ColumnDefault> {
        // strip casts such as 'abc'::character varying
        let raw = raw.trim();
        let literal = match raw.rfind("::") {
            Some(cast) if raw.starts_with('\'') || raw.starts_with('(') => &raw[..cast],
            _ => raw,
        };
        parse_default_literal(literal.trim_matches(|c| c == '(' || c == ')'))
    }

    fn translate(&self, op: &SchemaOperation) -> MigrationResult<Vec<String>> {
        let statements = match op {
            SchemaOperation::CreateTable(def) => self.create_table(def)?,
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
            SchemaOperation::AddColumn { table, column } => {
                if column.options.after.is_some() {
                    warn!(
                        "PostgreSQL cannot position columns; appending {}.{}",
                        table, column.name
                    );
                }
                let mut statements = vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.quote_identifier(table),
                    self.column_definition(column)?
                )];
                statements.extend(self.column_comment(table, column));
                statements
            }
            SchemaOperation::ChangeColumn { table, name, column } => {
                self.change_column(table, name, column)?
            }
            SchemaOperation::RenameColumn { table, from, to } => {
                check_identifier(self, to)?;
                vec![format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    self.quote_identifier(table),
                    self.quote_identifier(from),
                    self.quote_identifier(to)
                )]
            }
            SchemaOperation::RemoveColumn { table, name } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_identifier(table),
                self.quote_identifier(name)
            )],
            SchemaOperation::AddIndex { table, index } => vec![self.create_index(table, index)?],
            SchemaOperation::RemoveIndex { table, columns } => {
                let name = generate_name(table, columns, "index", self.max_identifier_length());
                vec![format!("DROP INDEX {}", self.quote_identifier(&name))]
            }
            SchemaOperation::RemoveIndexByName { name, .. } => {
                vec![format!("DROP INDEX {}", self.quote_identifier(name))]
            }
            SchemaOperation::AddForeignKey { table, foreign_key } => vec![format!(
                "ALTER TABLE {} ADD {}",
                self.quote_identifier(table),
                foreign_key_clause(self, table, foreign_key)?
            )],
            SchemaOperation::DropForeignKey {
                table,
                columns,
                constraint,
            } => {
                let name = foreign_key_name(self, table, columns, constraint.as_deref())?;
                vec![format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    self.quote_identifier(table),
                    self.quote_identifier(&name)
                )]
            }
            SchemaOperation::RebuildTable { table, .. } => {
                return Err(MigrationError::Validation(format!(
                    "PostgreSQL alters table {} in place; rebuilding is not supported",
                    table
                )))
            }
            SchemaOperation::Execute(sql) => vec![sql.clone()],
        };
        Ok(statements)
    }

    fn create_log_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (\"version\" BIGINT NOT NULL, \"migration_name\" VARCHAR(100) NULL, \
             \"start_time\" TIMESTAMP NOT NULL, \"end_time\" TIMESTAMP NULL, \
             \"breakpoint\" BOOLEAN NOT NULL DEFAULT FALSE, PRIMARY KEY (\"version\"))",
            self.quote_identifier(table)
        )
    }
}
