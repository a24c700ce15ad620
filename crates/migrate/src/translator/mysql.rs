//! MySQL / MariaDB dialect

use tracing::warn;

use super::{
    check_identifier, check_keyword, check_limit, default_sql, foreign_key_clause,
    foreign_key_name, generate_name, index_name, quote_columns, quote_with, with_size, Dialect,
    SqlType,
};
use crate::backends::BackendType;
use crate::error::{MigrationError, MigrationResult};
use crate::schema::{Column, ColumnDefault, ColumnType, Index, IndexType, SchemaOperation, TableDefinition};

const MAX_VARCHAR_LENGTH: u32 = 65_535;
const MAX_CHAR_LENGTH: u32 = 255;
const MAX_DECIMAL_PRECISION: u32 = 65;

// Size thresholds for the TINY / regular / MEDIUM / LONG type families
const SIZE_TINY: u32 = 255;
const SIZE_SMALL: u32 = 65_535;
const SIZE_MEDIUM: u32 = 16_777_215;
const SIZE_LONG: u32 = 4_294_967_295;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

/// Smallest of `TINYTEXT`..`LONGTEXT` (or the blob equivalents) holding `limit` bytes
fn sized_family(limit: Option<u32>, family: &str) -> String {
    let prefix = match limit {
        Some(l) if l <= SIZE_TINY => "TINY",
        Some(l) if l <= SIZE_SMALL => "",
        Some(l) if l <= SIZE_MEDIUM => "MEDIUM",
        Some(_) => "LONG",
        None => "",
    };
    format!("{}{}", prefix, family)
}

/// Limits below 255 are display widths; larger ones pick the smallest
/// integer type holding that value
fn sized_integer(limit: Option<u32>) -> &'static str {
    match limit {
        Some(l) if l < SIZE_TINY => "INT",
        Some(l) if l <= SIZE_TINY => "TINYINT",
        Some(l) if l <= SIZE_SMALL => "SMALLINT",
        Some(l) if l <= SIZE_MEDIUM => "MEDIUMINT",
        _ => "INT",
    }
}

impl MySqlDialect {
    fn create_table(&self, def: &TableDefinition) -> MigrationResult<Vec<String>> {
        check_identifier(self, &def.name)?;
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

        let engine = def.options.engine.as_deref().unwrap_or("InnoDB");
        check_keyword("engine", engine)?;
        let mut sql = format!(
            "CREATE TABLE {} ({}) ENGINE = {}",
            self.quote_identifier(&def.name),
            parts.join(", "),
            engine
        );
        if let Some(collation) = &def.options.collation {
            check_keyword("collation", collation)?;
            sql.push_str(&format!(" COLLATE = {}", collation));
        }
        if let Some(comment) = &def.options.comment {
            sql.push_str(&format!(" COMMENT = {}", self.quote_string(comment)));
        }

        let mut statements = vec![sql];
        for index in &def.indexes {
            statements.push(self.create_index(&def.name, index)?);
        }
        Ok(statements)
    }

    fn create_index(&self, table: &str, index: &Index) -> MigrationResult<String> {
        index.validate()?;
        if index.where_clause.is_some() {
            return Err(MigrationError::Validation(format!(
                "MySQL does not support partial indexes (index on {} ({}))",
                table,
                index.columns.join(", ")
            )));
        }
        let name = index_name(self, table, index)?;
        let kind = match index.index_type {
            IndexType::Index => "",
            IndexType::Unique => "UNIQUE ",
            IndexType::Fulltext => "FULLTEXT ",
        };
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| match index.limit {
                Some(limit) => format!("{}({})", self.quote_identifier(c), limit),
                None => self.quote_identifier(c),
            })
            .collect();
        let using = match &index.using {
            Some(method) if index.index_type != IndexType::Fulltext => {
                check_keyword("index method", method)?;
                format!(" USING {}", method.to_uppercase())
            }
            Some(_) => {
                warn!("MySQL ignores index methods on fulltext indexes ({})", table);
                String::new()
            }
            None => String::new(),
        };
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({}){}",
            kind,
            self.quote_identifier(&name),
            self.quote_identifier(table),
            columns.join(", "),
            using
        ))
    }

    fn position(&self, column: &Column) -> String {
        match &column.options.after {
            Some(after) => format!(" AFTER {}", self.quote_identifier(after)),
            None => String::new(),
        }
    }
}

impl Dialect for MySqlDialect {
    fn backend_type(&self) -> BackendType {
        BackendType::MySQL
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '`')
    }

    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn max_identifier_length(&self) -> usize {
        64
    }

    fn column_type(&self, column: &Column) -> MigrationResult<String> {
        let options = &column.options;
        let backend = self.backend_type();
        let sql_type = match column.column_type {
            ColumnType::String => {
                let limit = options.limit.unwrap_or(255);
                check_limit(column, "VARCHAR", limit, MAX_VARCHAR_LENGTH, backend)?;
                format!("VARCHAR({})", limit)
            }
            ColumnType::Char => {
                let limit = options.limit.unwrap_or(255);
                check_limit(column, "CHAR", limit, MAX_CHAR_LENGTH, backend)?;
                format!("CHAR({})", limit)
            }
            ColumnType::Text => sized_family(options.limit, "TEXT"),
            ColumnType::Binary => sized_family(options.limit, "BLOB"),
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::Integer => sized_integer(options.limit).to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Decimal => {
                let precision = options.precision.unwrap_or(10);
                check_limit(column, "DECIMAL precision", precision, MAX_DECIMAL_PRECISION, backend)?;
                format!("DECIMAL({},{})", precision, options.scale.unwrap_or(0))
            }
            ColumnType::Boolean => "TINYINT(1)".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
            ColumnType::Enum => {
                let values: Vec<String> = options.values.iter().map(|v| self.quote_string(v)).collect();
                format!("ENUM({})", values.join(", "))
            }
        };
        Ok(sql_type)
    }

    fn column_definition(&self, column: &Column) -> MigrationResult<String> {
        column.validate()?;
        check_identifier(self, &column.name)?;
        let options = &column.options;
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column)?
        );
        let numeric = column.column_type.is_integer()
            || matches!(
                column.column_type,
                ColumnType::Float | ColumnType::Double | ColumnType::Decimal
            );
        if numeric && !options.signed {
            sql.push_str(" UNSIGNED");
        }
        sql.push_str(if options.null && !options.identity { " NULL" } else { " NOT NULL" });
        if options.identity {
            sql.push_str(" AUTO_INCREMENT");
        } else if let Some(default) = &options.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_sql(self, default));
        }
        if let Some(comment) = &options.comment {
            sql.push_str(" COMMENT ");
            sql.push_str(&self.quote_string(comment));
        }
        Ok(sql)
    }

    fn parse_column(&self, name: &str, sql_type: &str) -> Column {
        let parsed = SqlType::parse(sql_type);
        let sized = |column_type: ColumnType, limit: u32| {
            Column::new(name, column_type).limit(limit)
        };
        let mut column = match parsed.base.as_str() {
            "varchar" => with_size(Column::new(name, ColumnType::String), &parsed),
            "char" => with_size(Column::new(name, ColumnType::Char), &parsed),
            "tinytext" => sized(ColumnType::Text, SIZE_TINY),
            "text" => Column::new(name, ColumnType::Text),
            "mediumtext" => sized(ColumnType::Text, SIZE_MEDIUM),
            "longtext" => sized(ColumnType::Text, SIZE_LONG),
            "tinyblob" => sized(ColumnType::Binary, SIZE_TINY),
            "blob" | "varbinary" | "binary" => Column::new(name, ColumnType::Binary),
            "mediumblob" => sized(ColumnType::Binary, SIZE_MEDIUM),
            "longblob" => sized(ColumnType::Binary, SIZE_LONG),
            "tinyint" if parsed.arg(0) == Some(1) => Column::new(name, ColumnType::Boolean),
            "bool" | "boolean" => Column::new(name, ColumnType::Boolean),
            "tinyint" => sized(ColumnType::Integer, SIZE_TINY),
            "smallint" => Column::new(name, ColumnType::SmallInteger),
            "mediumint" => sized(ColumnType::Integer, SIZE_MEDIUM),
            "int" | "integer" => Column::new(name, ColumnType::Integer),
            "bigint" => Column::new(name, ColumnType::BigInteger),
            "float" => Column::new(name, ColumnType::Float),
            "double" | "real" => Column::new(name, ColumnType::Double),
            "decimal" | "numeric" => with_size(Column::new(name, ColumnType::Decimal), &parsed),
            "date" => Column::new(name, ColumnType::Date),
            "time" => Column::new(name, ColumnType::Time),
            "datetime" => Column::new(name, ColumnType::DateTime),
            "timestamp" => Column::new(name, ColumnType::Timestamp),
            "json" => Column::new(name, ColumnType::Json),
            "enum" => with_size(Column::new(name, ColumnType::Enum), &parsed),
            _ => Column::new(name, ColumnType::Text),
        };
        column.options.signed = !parsed.unsigned;
        column
    }

    fn parse_default(&self, raw: &str) -> Option<ColumnDefault> {
        // the catalog reports string defaults unquoted
        let raw = raw.trim();
        match super::parse_default_literal(raw)? {
            ColumnDefault::Expression(expr) if !expr.contains('(') => {
                Some(ColumnDefault::String(expr))
            }
            other => Some(other),
        }
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
                    "RENAME TABLE {} TO {}",
                    self.quote_identifier(from),
                    self.quote_identifier(to)
                )]
            }
            SchemaOperation::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD {}{}",
                self.quote_identifier(table),
                self.column_definition(column)?,
                self.position(column)
            )],
            SchemaOperation::ChangeColumn { table, name, column } => vec![format!(
                "ALTER TABLE {} CHANGE {} {}{}",
                self.quote_identifier(table),
                self.quote_identifier(name),
                self.column_definition(column)?,
                self.position(column)
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
            SchemaOperation::RemoveColumn { table, name } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_identifier(table),
                self.quote_identifier(name)
            )],
            SchemaOperation::AddIndex { table, index } => vec![self.create_index(table, index)?],
            SchemaOperation::RemoveIndex { table, columns } => {
                let name = generate_name(table, columns, "index", self.max_identifier_length());
                vec![format!(
                    "ALTER TABLE {} DROP INDEX {}",
                    self.quote_identifier(table),
                    self.quote_identifier(&name)
                )]
            }
            SchemaOperation::RemoveIndexByName { table, name } => vec![format!(
                "ALTER TABLE {} DROP INDEX {}",
                self.quote_identifier(table),
                self.quote_identifier(name)
            )],
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
                    "ALTER TABLE {} DROP FOREIGN KEY {}",
                    self.quote_identifier(table),
                    self.quote_identifier(&name)
                )]
            }
            SchemaOperation::RebuildTable { table, .. } => {
                return Err(MigrationError::Validation(format!(
                    "MySQL alters table {} in place; rebuilding is not supported",
                    table
                )))
            }
            SchemaOperation::Execute(sql) => vec![sql.clone()],
        };
        Ok(statements)
    }

    fn begin_sql(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn create_log_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {} (`version` BIGINT NOT NULL, `migration_name` VARCHAR(100) NULL, \
             `start_time` TIMESTAMP NULL DEFAULT NULL, `end_time` TIMESTAMP NULL DEFAULT NULL, \
             `breakpoint` TINYINT(1) NOT NULL DEFAULT 0, PRIMARY KEY (`version`)) ENGINE = InnoDB",
            self.quote_identifier(table)
        )
    }

    // `start_time = start_time` stops TIMESTAMP auto-update from rewriting
    // the apply time when only the flag changes
    fn update_breakpoint_sql(&self, table: &str) -> String {
        format!(
            "UPDATE {} SET `breakpoint` = ?, `start_time` = `start_time` WHERE `version` = ?",
            self.quote_identifier(table)
        )
    }

    fn reset_breakpoints_sql(&self, table: &str) -> String {
        format!(
            "UPDATE {} SET `breakpoint` = 0, `start_time` = `start_time` WHERE `breakpoint` <> 0",
            self.quote_identifier(table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForeignKey;

    #[test]
    fn test_create_table_with_options() {
        let mut def = TableDefinition::new("users");
        def.columns = vec![
            Column::integer("id").identity().unsigned(),
            Column::string("email").comment("login"),
        ];
        def.primary_key = vec!["id".to_string()];
        def.options.collation = Some("utf8mb4_unicode_ci".to_string());
        let statements = MySqlDialect
            .translate(&SchemaOperation::CreateTable(def))
            .unwrap();
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE `users` (`id` INT UNSIGNED NOT NULL AUTO_INCREMENT, \
                 `email` VARCHAR(255) NOT NULL COMMENT 'login', PRIMARY KEY (`id`)) \
                 ENGINE = InnoDB COLLATE = utf8mb4_unicode_ci"
            ]
        );
    }

    #[test]
    fn test_text_and_integer_limits_are_clamped() {
        assert_eq!(
            MySqlDialect.column_type(&Column::text("bio").limit(SIZE_MEDIUM)).unwrap(),
            "MEDIUMTEXT"
        );
        assert_eq!(
            MySqlDialect.column_type(&Column::text("bio").limit(SIZE_LONG)).unwrap(),
            "LONGTEXT"
        );
        assert_eq!(
            MySqlDialect.column_type(&Column::text("bio").limit(SIZE_TINY)).unwrap(),
            "TINYTEXT"
        );
        assert_eq!(
            MySqlDialect.column_type(&Column::text("bio").limit(300)).unwrap(),
            "TEXT"
        );
        assert_eq!(
            MySqlDialect.column_type(&Column::integer("views").limit(11)).unwrap(),
            "INT"
        );
        assert_eq!(
            MySqlDialect.column_type(&Column::integer("flags").limit(SIZE_TINY)).unwrap(),
            "TINYINT"
        );
        assert!(MySqlDialect
            .column_type(&Column::string("name").limit(70_000))
            .is_err());
        assert!(MySqlDialect
            .column_type(&Column::decimal("amount", 66, 2))
            .is_err());
    }

    #[test]
    fn test_index_with_prefix_and_method() {
        let index = Index::new(["title"]).using("btree");
        let index = Index { limit: Some(10), ..index };
        let statements = MySqlDialect
            .translate(&SchemaOperation::AddIndex {
                table: "posts".to_string(),
                index,
            })
            .unwrap();
        assert_eq!(
            statements,
            vec!["CREATE INDEX `posts_title_index` ON `posts` (`title`(10)) USING BTREE"]
        );
    }

    #[test]
    fn test_partial_index_rejected() {
        let op = SchemaOperation::AddIndex {
            table: "posts".to_string(),
            index: Index::new(["title"]).where_clause("id > 1"),
        };
        assert!(MySqlDialect.translate(&op).is_err());
    }

    #[test]
    fn test_alterations() {
        let add = MySqlDialect
            .translate(&SchemaOperation::AddColumn {
                table: "users".to_string(),
                column: Column::string("name").nullable().after("id"),
            })
            .unwrap();
        assert_eq!(
            add,
            vec!["ALTER TABLE `users` ADD `name` VARCHAR(255) NULL AFTER `id`"]
        );

        let drop_fk = MySqlDialect
            .translate(&SchemaOperation::DropForeignKey {
                table: "posts".to_string(),
                columns: vec!["user_id".to_string()],
                constraint: None,
            })
            .unwrap();
        assert_eq!(
            drop_fk,
            vec!["ALTER TABLE `posts` DROP FOREIGN KEY `posts_user_id_fk`"]
        );

        let add_fk = MySqlDialect
            .translate(&SchemaOperation::AddForeignKey {
                table: "posts".to_string(),
                foreign_key: ForeignKey::new(["user_id"], "users", ["id"]).constraint("fk_author"),
            })
            .unwrap();
        assert_eq!(
            add_fk,
            vec!["ALTER TABLE `posts` ADD CONSTRAINT `fk_author` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`)"]
        );
    }

    #[test]
    fn test_parse_column() {
        let column = MySqlDialect.parse_column("hits", "int unsigned");
        assert_eq!(column.column_type, ColumnType::Integer);
        assert!(!column.options.signed);

        let column = MySqlDialect.parse_column("active", "tinyint(1)");
        assert_eq!(column.column_type, ColumnType::Boolean);

        let column = MySqlDialect.parse_column("status", "enum('draft','live')");
        assert_eq!(column.options.values, vec!["draft".to_string(), "live".to_string()]);

        assert_eq!(
            MySqlDialect.parse_default("draft"),
            Some(ColumnDefault::String("draft".to_string()))
        );
    }

    #[test]
    fn test_breakpoint_update_preserves_start_time() {
        let sql = MySqlDialect.update_breakpoint_sql("keel_log");
        assert!(sql.contains("`start_time` = `start_time`"));
        assert!(!MySqlDialect.supports_transactional_ddl());
    }
}
