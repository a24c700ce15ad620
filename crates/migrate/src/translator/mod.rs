//! Query Translator
//!
//! A [`Dialect`] turns one [`SchemaOperation`] into the ordered list of SQL
//! statements that perform it on a specific engine. Translation is pure: it
//! never touches a connection, so anything that needs the live schema (index
//! names, table rebuild plans) is resolved before the dialect is called.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::backends::BackendType;
use crate::error::{MigrationError, MigrationResult};
use crate::schema::{Column, ColumnDefault, ColumnType, ForeignKey, Index, SchemaOperation};

/// Version log columns, in insert order
pub const LOG_COLUMNS: [&str; 5] = [
    "version",
    "migration_name",
    "start_time",
    "end_time",
    "breakpoint",
];

/// Engine-specific SQL generation rules
pub trait Dialect: Send + Sync + fmt::Debug {
    fn backend_type(&self) -> BackendType;

    /// Quote an identifier; dotted names are quoted part by part
    fn quote_identifier(&self, name: &str) -> String;

    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Bind parameter marker for the 1-based position `index`
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Whether DDL statements can be rolled back
    fn supports_transactional_ddl(&self) -> bool;

    fn max_identifier_length(&self) -> usize;

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    /// Concrete SQL type for an abstract column
    fn column_type(&self, column: &Column) -> MigrationResult<String>;

    /// Full column definition as used in `CREATE TABLE` and `ADD COLUMN`
    fn column_definition(&self, column: &Column) -> MigrationResult<String> {
        base_column_definition(self, column)
    }

    /// Abstract column for an introspected SQL type
    fn parse_column(&self, name: &str, sql_type: &str) -> Column;

    /// Introspected default expression
    fn parse_default(&self, raw: &str) -> Option<ColumnDefault> {
        parse_default_literal(raw)
    }

    /// Whether `op` has to be emulated by rebuilding the table
    fn requires_rebuild(&self, _op: &SchemaOperation) -> bool {
        false
    }

    fn translate(&self, op: &SchemaOperation) -> MigrationResult<Vec<String>>;

    fn begin_sql(&self) -> &'static str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }

    fn create_log_table_sql(&self, table: &str) -> String;

    fn insert_version_sql(&self, table: &str) -> String {
        let columns: Vec<String> = LOG_COLUMNS
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        let values: Vec<String> = (1..=LOG_COLUMNS.len())
            .map(|i| self.placeholder(i))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier(table),
            columns.join(", "),
            values.join(", ")
        )
    }

    fn select_versions_sql(&self, table: &str) -> String {
        let columns: Vec<String> = LOG_COLUMNS
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        format!(
            "SELECT {} FROM {} ORDER BY {} ASC",
            columns.join(", "),
            self.quote_identifier(table),
            self.quote_identifier("version")
        )
    }

    fn delete_version_sql(&self, table: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote_identifier(table),
            self.quote_identifier("version"),
            self.placeholder(1)
        )
    }

    /// Parameters: breakpoint flag, version
    fn update_breakpoint_sql(&self, table: &str) -> String {
        format!(
            "UPDATE {} SET {} = {} WHERE {} = {}",
            self.quote_identifier(table),
            self.quote_identifier("breakpoint"),
            self.placeholder(1),
            self.quote_identifier("version"),
            self.placeholder(2)
        )
    }

    fn reset_breakpoints_sql(&self, table: &str) -> String {
        let breakpoint = self.quote_identifier("breakpoint");
        format!(
            "UPDATE {} SET {} = {} WHERE {} <> {}",
            self.quote_identifier(table),
            breakpoint,
            self.boolean_literal(false),
            breakpoint,
            self.boolean_literal(false)
        )
    }
}

pub(crate) fn quote_with(name: &str, quote: char) -> String {
    let escaped = format!("{}{}", quote, quote);
    name.split('.')
        .map(|part| format!("{}{}{}", quote, part.replace(quote, &escaped), quote))
        .collect::<Vec<_>>()
        .join(".")
}

/// Deterministic name for an index or constraint: `{table}_{columns}_{suffix}`
pub fn generate_name<S: AsRef<str>>(
    table: &str,
    columns: &[S],
    suffix: &str,
    max_length: usize,
) -> String {
    let columns: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
    let full = format!("{}_{}_{}", table, columns.join("_"), suffix);
    shorten_identifier(&full, max_length)
}

/// Names over `max_length` keep a prefix and end in `_` plus the first eight
/// hex digits of the SHA-256 of the full name, so they stay unique.
pub fn shorten_identifier(name: &str, max_length: usize) -> String {
    if name.len() <= max_length {
        return name.to_string();
    }
    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let keep = max_length.saturating_sub(9);
    let cut = name
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= keep)
        .last()
        .unwrap_or(0);
    format!("{}_{}", &name[..cut], &digest[..8])
}

pub(crate) fn check_identifier<D: Dialect + ?Sized>(dialect: &D, name: &str) -> MigrationResult<()> {
    if name.trim().is_empty() {
        return Err(MigrationError::Validation(
            "identifier must not be empty".to_string(),
        ));
    }
    if name.len() > dialect.max_identifier_length() {
        return Err(MigrationError::Validation(format!(
            "identifier '{}' is longer than the {} characters {} allows",
            name,
            dialect.max_identifier_length(),
            dialect.backend_type()
        )));
    }
    Ok(())
}

pub(crate) fn quote_columns<D: Dialect + ?Sized, S: AsRef<str>>(dialect: &D, columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_identifier(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn default_sql<D: Dialect + ?Sized>(dialect: &D, default: &ColumnDefault) -> String {
    match default {
        ColumnDefault::Null => "NULL".to_string(),
        ColumnDefault::Bool(b) => dialect.boolean_literal(*b).to_string(),
        ColumnDefault::Integer(i) => i.to_string(),
        ColumnDefault::Float(f) => f.to_string(),
        ColumnDefault::String(s) => dialect.quote_string(s),
        ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        ColumnDefault::Expression(expr) => expr.clone(),
    }
}

/// Reject length or precision beyond what the engine stores
pub(crate) fn check_limit(
    column: &Column,
    type_name: &str,
    value: u32,
    max: u32,
    backend: BackendType,
) -> MigrationResult<()> {
    if value == 0 || value > max {
        return Err(MigrationError::Validation(format!(
            "{} size {} of column '{}' is outside 1..={} on {}",
            type_name, value, column.name, max, backend
        )));
    }
    Ok(())
}

fn enum_check<D: Dialect + ?Sized>(dialect: &D, column: &Column) -> String {
    let values: Vec<String> = column
        .options
        .values
        .iter()
        .map(|v| dialect.quote_string(v))
        .collect();
    format!(
        "CHECK ({} IN ({}))",
        dialect.quote_identifier(&column.name),
        values.join(", ")
    )
}

pub(crate) fn base_column_definition<D: Dialect + ?Sized>(
    dialect: &D,
    column: &Column,
) -> MigrationResult<String> {
    column.validate()?;
    check_identifier(dialect, &column.name)?;
    let mut sql = format!(
        "{} {}",
        dialect.quote_identifier(&column.name),
        dialect.column_type(column)?
    );
    if column.options.null && !column.options.identity {
        sql.push_str(" NULL");
    } else {
        sql.push_str(" NOT NULL");
    }
    if let (Some(default), false) = (&column.options.default, column.options.identity) {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default_sql(dialect, default));
    }
    if column.column_type == ColumnType::Enum {
        sql.push(' ');
        sql.push_str(&enum_check(dialect, column));
    }
    Ok(sql)
}

pub(crate) fn index_name<D: Dialect + ?Sized>(
    dialect: &D,
    table: &str,
    index: &Index,
) -> MigrationResult<String> {
    match &index.name {
        Some(name) => {
            check_identifier(dialect, name)?;
            Ok(name.clone())
        }
        None => Ok(generate_name(
            table,
            &index.columns,
            index.index_type.as_str(),
            dialect.max_identifier_length(),
        )),
    }
}

pub(crate) fn foreign_key_name<D: Dialect + ?Sized>(
    dialect: &D,
    table: &str,
    columns: &[String],
    constraint: Option<&str>,
) -> MigrationResult<String> {
    match constraint {
        Some(name) => {
            check_identifier(dialect, name)?;
            Ok(name.to_string())
        }
        None => Ok(generate_name(
            table,
            columns,
            "fk",
            dialect.max_identifier_length(),
        )),
    }
}

/// `CONSTRAINT .. FOREIGN KEY (..) REFERENCES .. (..) [ON DELETE ..] [ON UPDATE ..]`
pub(crate) fn foreign_key_clause<D: Dialect + ?Sized>(
    dialect: &D,
    table: &str,
    fk: &ForeignKey,
) -> MigrationResult<String> {
    fk.validate()?;
    let name = foreign_key_name(dialect, table, &fk.columns, fk.constraint_name.as_deref())?;
    let mut sql = format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        dialect.quote_identifier(&name),
        quote_columns(dialect, &fk.columns),
        dialect.quote_identifier(&fk.referenced_table),
        quote_columns(dialect, &fk.referenced_columns)
    );
    if let Some(action) = fk.on_delete {
        sql.push_str(" ON DELETE ");
        sql.push_str(action.as_sql());
    }
    if let Some(action) = fk.on_update {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action.as_sql());
    }
    Ok(sql)
}

/// Index methods and similar words spliced into SQL must be plain words
pub(crate) fn check_keyword(kind: &str, value: &str) -> MigrationResult<()> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MigrationError::Validation(format!(
            "invalid {} '{}'",
            kind, value
        )));
    }
    Ok(())
}

/// Parse a literal default as reported by the catalog
pub fn parse_default_literal(raw: &str) -> Option<ColumnDefault> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let upper = raw.to_uppercase();
    match upper.as_str() {
        "NULL" => return Some(ColumnDefault::Null),
        "CURRENT_TIMESTAMP" | "CURRENT_TIMESTAMP()" | "NOW()" => {
            return Some(ColumnDefault::CurrentTimestamp)
        }
        "TRUE" => return Some(ColumnDefault::Bool(true)),
        "FALSE" => return Some(ColumnDefault::Bool(false)),
        _ => {}
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Some(ColumnDefault::String(
            raw[1..raw.len() - 1].replace("''", "'"),
        ));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(ColumnDefault::Integer(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Some(ColumnDefault::Float(f));
    }
    Some(ColumnDefault::Expression(raw.to_string()))
}

/// A catalog type such as `varchar(255)`, `decimal(10,2)` or `int unsigned`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlType {
    /// Lowercased base name without arguments or modifiers
    pub base: String,
    /// Raw arguments, case preserved
    pub args: Vec<String>,
    pub unsigned: bool,
}

impl SqlType {
    pub fn parse(sql_type: &str) -> Self {
        let trimmed = sql_type.trim();
        let lower = trimmed.to_lowercase();
        let unsigned = lower.split_whitespace().any(|w| w == "unsigned");

        let (base, args) = match (trimmed.find('('), trimmed.rfind(')')) {
            (Some(open), Some(close)) if close > open => {
                let mut base = lower[..open].trim().to_string();
                // modifiers after the argument list, e.g. `time(6) without time zone`
                let tail = lower[close + 1..].trim();
                if !tail.is_empty() && tail != "unsigned" && !tail.starts_with("unsigned") {
                    base = format!("{} {}", base, tail);
                }
                (base, split_args(&trimmed[open + 1..close]))
            }
            _ => (lower.clone(), Vec::new()),
        };

        let base = base
            .split_whitespace()
            .filter(|w| *w != "unsigned" && *w != "zerofill")
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            base,
            args,
            unsigned,
        }
    }

    /// Numeric argument at `position`
    pub fn arg(&self, position: usize) -> Option<u32> {
        self.args.get(position).and_then(|a| a.trim().parse().ok())
    }
}

fn split_args(args: &str) -> Vec<String> {
    // quoted values may contain commas (enum definitions)
    let quoted = match Regex::new(r"'((?:[^']|'')*)'") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    if args.trim_start().starts_with('\'') {
        return quoted
            .captures_iter(args)
            .map(|c| c[1].replace("''", "'"))
            .collect();
    }
    args.split(',').map(|a| a.trim().to_string()).collect()
}

/// Apply numeric arguments of an introspected type to a column
pub(crate) fn with_size(mut column: Column, sql_type: &SqlType) -> Column {
    match column.column_type {
        ColumnType::Decimal => {
            column.options.precision = sql_type.arg(0);
            column.options.scale = sql_type.arg(1);
        }
        ColumnType::Enum => {
            column.options.values = sql_type.args.clone();
        }
        _ => {
            column.options.limit = sql_type.arg(0);
        }
    }
    column
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_name_is_deterministic() {
        let name = generate_name("users", &["email"], "unique", 63);
        assert_eq!(name, "users_email_unique");
        assert_eq!(name, generate_name("users", &["email"], "unique", 63));
    }

    #[test]
    fn test_long_names_are_hashed() {
        let columns = ["organisation_identifier", "department_identifier", "employee_number"];
        let name = generate_name("very_long_personnel_assignments", &columns, "unique", 63);
        assert_eq!(name.len(), 63);
        assert!(name.starts_with("very_long_personnel_assignments_"));

        let other = generate_name("very_long_personnel_assignments", &["organisation_identifier"], "unique", 63);
        assert_ne!(name, other);

        let hash = &name[name.len() - 8..];
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(&name[name.len() - 9..name.len() - 8], "_");
    }

    #[test]
    fn test_parse_default_literal() {
        assert_eq!(parse_default_literal("NULL"), Some(ColumnDefault::Null));
        assert_eq!(
            parse_default_literal("'it''s'"),
            Some(ColumnDefault::String("it's".to_string()))
        );
        assert_eq!(parse_default_literal("42"), Some(ColumnDefault::Integer(42)));
        assert_eq!(parse_default_literal("1.5"), Some(ColumnDefault::Float(1.5)));
        assert_eq!(
            parse_default_literal("current_timestamp"),
            Some(ColumnDefault::CurrentTimestamp)
        );
        assert_eq!(
            parse_default_literal("lower('X')"),
            Some(ColumnDefault::Expression("lower('X')".to_string()))
        );
        assert_eq!(parse_default_literal(""), None);
    }

    #[test]
    fn test_sql_type_parse() {
        let t = SqlType::parse("DECIMAL(10, 2)");
        assert_eq!(t.base, "decimal");
        assert_eq!(t.arg(0), Some(10));
        assert_eq!(t.arg(1), Some(2));

        let t = SqlType::parse("int unsigned");
        assert_eq!(t.base, "int");
        assert!(t.unsigned);

        let t = SqlType::parse("int(10) unsigned");
        assert_eq!(t.base, "int");
        assert!(t.unsigned);

        let t = SqlType::parse("enum('draft','it''s, live')");
        assert_eq!(t.base, "enum");
        assert_eq!(t.args, vec!["draft".to_string(), "it's, live".to_string()]);

        let t = SqlType::parse("character varying(255)");
        assert_eq!(t.base, "character varying");
        assert_eq!(t.arg(0), Some(255));
    }
}
