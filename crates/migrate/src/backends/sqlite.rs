//! SQLite Adapter
//!
//! Runs over a single `SqliteConnection`. SQLite keeps DDL inside
//! transactions, so every migration is atomic on this engine.

use std::str::FromStr;

use async_trait::async_trait;
use regex::Regex;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as _, ConnectOptions, Connection, Executor, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, warn};

use super::core::*;
use super::BackendType;
use crate::error::{MigrationError, MigrationResult};
use crate::schema::{ForeignKey, Index, IndexType, TableDefinition};
use crate::translator::{Dialect, SqliteDialect};

/// Adapter for SQLite databases (`sqlite://path.db`, `sqlite::memory:`)
pub struct SqliteAdapter {
    url: String,
    log_table: String,
    dialect: SqliteDialect,
    conn: Option<SqliteConnection>,
    in_transaction: bool,
}

impl SqliteAdapter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            log_table: "keel_log".to_string(),
            dialect: SqliteDialect,
            conn: None,
            in_transaction: false,
        }
    }

    pub fn with_log_table(mut self, log_table: impl Into<String>) -> Self {
        self.log_table = log_table.into();
        self
    }

    fn conn(&mut self) -> MigrationResult<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| not_connected(BackendType::SQLite))
    }

    /// Fail with the first dangling reference left by the open transaction
    async fn check_foreign_keys(&mut self) -> MigrationResult<()> {
        const CHECK: &str = "PRAGMA foreign_key_check";
        let violations = self.fetch_all(CHECK, &[]).await?;
        match violations.first() {
            None => Ok(()),
            Some(row) => Err(MigrationError::Adapter {
                message: format!(
                    "{} foreign key violation(s), first in table {} referencing {}",
                    violations.len(),
                    row.get_string("table").unwrap_or_default(),
                    row.get_string("parent").unwrap_or_default()
                ),
                statement: Some(CHECK.to_string()),
            }),
        }
    }

    async fn restore_foreign_keys(&mut self) {
        if let Err(e) = self.execute("PRAGMA foreign_keys = ON").await {
            warn!("Failed to re-enable SQLite foreign keys: {}", e);
        }
    }

    async fn table_sql(&mut self, table: &str) -> MigrationResult<Option<String>> {
        let rows = self
            .fetch_all(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[table.into()],
            )
            .await?;
        Ok(rows.first().and_then(|row| row.get_string("sql")))
    }

    async fn describe_indexes(&mut self, table: &str) -> MigrationResult<Vec<Index>> {
        let list = self
            .fetch_all(
                "SELECT name, \"unique\" AS is_unique, origin FROM pragma_index_list(?)",
                &[table.into()],
            )
            .await?;

        let mut indexes = Vec::new();
        for entry in list {
            // only indexes created with CREATE INDEX, not PK/UNIQUE constraints
            if entry.get_string("origin").as_deref() != Some("c") {
                continue;
            }
            let Some(name) = entry.get_string("name") else {
                continue;
            };
            let columns: Vec<String> = self
                .fetch_all(
                    "SELECT name FROM pragma_index_info(?) ORDER BY seqno",
                    &[name.as_str().into()],
                )
                .await?
                .iter()
                .filter_map(|row| row.get_string("name"))
                .collect();
            let index_sql = self
                .fetch_all(
                    "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?",
                    &[name.as_str().into()],
                )
                .await?
                .first()
                .and_then(|row| row.get_string("sql"));

            let mut index = Index::new(columns).named(name);
            if entry
                .get("is_unique")
                .and_then(DatabaseValue::as_bool)
                .unwrap_or(false)
            {
                index.index_type = IndexType::Unique;
            }
            index.where_clause = index_sql.as_deref().and_then(partial_predicate);
            indexes.push(index);
        }
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(indexes)
    }

    async fn describe_foreign_keys(
        &mut self,
        table: &str,
        table_sql: &str,
    ) -> MigrationResult<Vec<ForeignKey>> {
        let rows = self
            .fetch_all(
                "SELECT id, seq, \"table\" AS referenced_table, \"from\" AS column_name, \
                 \"to\" AS referenced_column, on_update, on_delete \
                 FROM pragma_foreign_key_list(?) ORDER BY id, seq",
                &[table.into()],
            )
            .await?;

        let mut grouped: Vec<(i64, ForeignKey)> = Vec::new();
        for row in &rows {
            let id = row.get_i64("id").unwrap_or_default();
            let (Some(column), Some(referenced_table)) =
                (row.get_string("column_name"), row.get_string("referenced_table"))
            else {
                continue;
            };
            let referenced_column = row.get_string("referenced_column").unwrap_or_else(|| "id".to_string());
            match grouped.iter_mut().find(|(fk_id, _)| *fk_id == id) {
                Some((_, fk)) => {
                    fk.columns.push(column);
                    fk.referenced_columns.push(referenced_column);
                }
                None => {
                    let mut fk = ForeignKey::new([column], referenced_table, [referenced_column]);
                    fk.on_delete = row.get_string("on_delete").and_then(|a| parse_action_name(&a));
                    fk.on_update = row.get_string("on_update").and_then(|a| parse_action_name(&a));
                    grouped.push((id, fk));
                }
            }
        }

        // the pragma does not report constraint names; recover them from the DDL
        let declared = declared_foreign_keys(table_sql);
        let mut foreign_keys: Vec<(usize, ForeignKey)> = grouped
            .into_iter()
            .map(|(_, mut fk)| {
                let position = declared
                    .iter()
                    .position(|(_, columns)| fk.matches_columns(columns));
                if let Some(position) = position {
                    fk.constraint_name = Some(declared[position].0.clone());
                }
                (position.unwrap_or(usize::MAX), fk)
            })
            .collect();
        foreign_keys.sort_by_key(|(position, _)| *position);
        Ok(foreign_keys.into_iter().map(|(_, fk)| fk).collect())
    }
}

/// `CONSTRAINT name FOREIGN KEY (cols)` clauses of a `CREATE TABLE`, in order
fn declared_foreign_keys(table_sql: &str) -> Vec<(String, Vec<String>)> {
    let Ok(re) = Regex::new(r#"(?i)CONSTRAINT\s+["`\[]?(\w+)["`\]]?\s+FOREIGN\s+KEY\s*\(([^)]*)\)"#) else {
        return Vec::new();
    };
    re.captures_iter(table_sql)
        .map(|caps| {
            let columns = caps[2]
                .split(',')
                .map(|c| c.trim().trim_matches(|q| q == '"' || q == '`' || q == '[' || q == ']').to_string())
                .collect();
            (caps[1].to_string(), columns)
        })
        .collect()
}

/// Predicate of a partial index, from its `CREATE INDEX` statement
fn partial_predicate(index_sql: &str) -> Option<String> {
    let re = Regex::new(r"(?is)\)\s*WHERE\s+(.+)$").ok()?;
    re.captures(index_sql)
        .map(|caps| caps[1].trim().to_string())
        .filter(|p| !p.is_empty())
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::DateTime(dt) => query.bind(dt.naive_utc()),
    }
}

fn bind_params<'q>(sql: &'q str, params: &[DatabaseValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

/// Decode by storage class; SQLite columns are not strongly typed
fn decode_value(row: &SqliteRow, index: usize) -> MigrationResult<DatabaseValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => DatabaseValue::Int64(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => DatabaseValue::Float64(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => DatabaseValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => DatabaseValue::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

fn convert_row(row: &SqliteRow) -> MigrationResult<DatabaseRow> {
    let mut converted = DatabaseRow::default();
    for (index, column) in row.columns().iter().enumerate() {
        converted.columns.push(column.name().to_string());
        converted.values.push(decode_value(row, index)?);
    }
    Ok(converted)
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::SQLite
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn log_table(&self) -> &str {
        &self.log_table
    }

    async fn connect(&mut self) -> MigrationResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let options = SqliteConnectOptions::from_str(&self.url)
            .map_err(|e| MigrationError::Connection(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true);
        let conn = options
            .connect()
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to open SQLite database: {}", e)))?;
        debug!("Connected to SQLite database");
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) -> MigrationResult<()> {
        self.in_transaction = false;
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn begin_transaction(&mut self) -> MigrationResult<()> {
        if self.in_transaction {
            return Err(MigrationError::Adapter {
                message: "a transaction is already open".to_string(),
                statement: None,
            });
        }
        // Table rebuilds drop the original table, which would fire ON DELETE
        // actions on child rows. The pragma is a no-op once a transaction is open.
        self.execute("PRAGMA foreign_keys = OFF").await?;
        let sql = self.dialect.begin_sql();
        if let Err(e) = self.execute(sql).await {
            self.restore_foreign_keys().await;
            return Err(e);
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> MigrationResult<()> {
        self.check_foreign_keys().await?;
        let sql = self.dialect.commit_sql();
        self.execute(sql).await?;
        self.in_transaction = false;
        self.restore_foreign_keys().await;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> MigrationResult<()> {
        let sql = self.dialect.rollback_sql();
        self.in_transaction = false;
        let result = self.execute(sql).await;
        self.restore_foreign_keys().await;
        result.map(|_| ())
    }

    async fn execute_with(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<u64> {
        debug!("Executing SQL: {}", sql);
        let conn = self.conn()?;
        let result = if params.is_empty() {
            (&mut *conn).execute(sql).await
        } else {
            bind_params(sql, params).execute(&mut *conn).await
        };
        result
            .map(|done| done.rows_affected())
            .map_err(|e| statement_error(e, sql))
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrationResult<Vec<DatabaseRow>> {
        let conn = self.conn()?;
        let rows = if params.is_empty() {
            (&mut *conn).fetch_all(sql).await
        } else {
            bind_params(sql, params).fetch_all(&mut *conn).await
        }
        .map_err(|e| statement_error(e, sql))?;
        rows.iter().map(convert_row).collect()
    }

    async fn has_table(&mut self, table: &str) -> MigrationResult<bool> {
        let rows = self
            .fetch_all(
                "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[table.into()],
            )
            .await?;
        Ok(rows.first().and_then(|row| row.get_i64("n")).unwrap_or(0) > 0)
    }

    async fn describe_table(&mut self, table: &str) -> MigrationResult<TableDefinition> {
        let table_sql = self
            .table_sql(table)
            .await?
            .ok_or_else(|| missing_table(table))?;

        let column_rows = self
            .fetch_all(
                "SELECT name, type, \"notnull\" AS not_null, dflt_value, pk FROM pragma_table_info(?) ORDER BY cid",
                &[table.into()],
            )
            .await?;

        let mut definition = TableDefinition::new(table);
        let mut primary_key: Vec<(i64, String)> = Vec::new();
        let mut integer_key = false;
        for row in &column_rows {
            let Some(name) = row.get_string("name") else {
                continue;
            };
            let sql_type = row.get_string("type").unwrap_or_default();
            let mut column = self.dialect.parse_column(&name, &sql_type);
            column.options.null = !row
                .get("not_null")
                .and_then(DatabaseValue::as_bool)
                .unwrap_or(false);
            column.options.default = row
                .get_string("dflt_value")
                .and_then(|raw| self.dialect.parse_default(&raw));

            let pk_position = row.get_i64("pk").unwrap_or(0);
            if pk_position > 0 {
                integer_key = sql_type.eq_ignore_ascii_case("INTEGER");
                primary_key.push((pk_position, name.clone()));
            }
            definition.columns.push(column);
        }
        primary_key.sort();
        definition.primary_key = primary_key.into_iter().map(|(_, name)| name).collect();

        let autoincrement = table_sql.to_uppercase().contains("AUTOINCREMENT");
        if definition.primary_key.len() == 1 && integer_key && autoincrement {
            let pk = definition.primary_key[0].clone();
            if let Some(column) = definition
                .columns
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(&pk))
            {
                column.options.identity = true;
                column.options.null = false;
            }
        }

        definition.indexes = self.describe_indexes(table).await?;
        definition.foreign_keys = self.describe_foreign_keys(table, &table_sql).await?;
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ReferentialAction, Schema, SchemaOperation};

    async fn memory_adapter() -> SqliteAdapter {
        let mut adapter = SqliteAdapter::new("sqlite::memory:");
        adapter.connect().await.unwrap();
        adapter
    }

    #[test]
    fn test_declared_foreign_keys() {
        let sql = "CREATE TABLE \"posts\" (\"id\" INTEGER, \"a\" INTEGER, \
                   CONSTRAINT \"posts_a_fk\" FOREIGN KEY (\"a\") REFERENCES \"authors\" (\"id\"))";
        assert_eq!(
            declared_foreign_keys(sql),
            vec![("posts_a_fk".to_string(), vec!["a".to_string()])]
        );
    }

    #[test]
    fn test_partial_predicate() {
        assert_eq!(
            partial_predicate("CREATE INDEX \"i\" ON \"t\" (\"a\") WHERE a > 1").as_deref(),
            Some("a > 1")
        );
        assert_eq!(partial_predicate("CREATE INDEX \"i\" ON \"t\" (\"a\")"), None);
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mut adapter = SqliteAdapter::new("sqlite::memory:");
        let err = adapter.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, MigrationError::Connection(_)));
    }

    #[tokio::test]
    async fn test_log_table_primitives() {
        let mut adapter = memory_adapter().await;
        adapter.ensure_log_table().await.unwrap();
        adapter.ensure_log_table().await.unwrap();
        assert!(adapter.has_table("keel_log").await.unwrap());

        let entry = crate::migrations::VersionLogEntry::started(20240101000000, "create_users")
            .finished();
        adapter.record_version(&entry).await.unwrap();

        let applied = adapter.applied_versions().await.unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].version, 20240101000000);
        assert_eq!(applied[0].migration_name, "create_users");
        assert!(!applied[0].breakpoint);
        assert!(applied[0].end_time.is_some());

        assert_eq!(adapter.set_breakpoint(20240101000000, true).await.unwrap(), 1);
        assert!(adapter.applied_versions().await.unwrap()[0].breakpoint);
        assert_eq!(adapter.reset_breakpoints().await.unwrap(), 1);

        adapter.remove_version(20240101000000).await.unwrap();
        assert!(adapter.applied_versions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_suspends_cascades_and_checks_references() {
        let mut adapter = memory_adapter().await;
        adapter.execute("CREATE TABLE parents (id INTEGER PRIMARY KEY)").await.unwrap();
        adapter
            .execute(
                "CREATE TABLE children (parent_id INTEGER \
                 REFERENCES parents (id) ON DELETE CASCADE)",
            )
            .await
            .unwrap();
        adapter.execute("INSERT INTO parents (id) VALUES (1)").await.unwrap();
        adapter.execute("INSERT INTO children (parent_id) VALUES (1)").await.unwrap();

        // dropping and recreating the parent leaves the child row alone
        adapter.begin_transaction().await.unwrap();
        adapter.execute("CREATE TABLE tmp_parents (id INTEGER PRIMARY KEY)").await.unwrap();
        adapter
            .execute("INSERT INTO tmp_parents (id) SELECT id FROM parents")
            .await
            .unwrap();
        adapter.execute("DROP TABLE parents").await.unwrap();
        adapter.execute("ALTER TABLE tmp_parents RENAME TO parents").await.unwrap();
        adapter.commit_transaction().await.unwrap();
        let rows = adapter.fetch_all("SELECT parent_id FROM children", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);

        // a dangling reference blocks the commit
        adapter.begin_transaction().await.unwrap();
        adapter.execute("DELETE FROM parents").await.unwrap();
        let err = adapter.commit_transaction().await.unwrap_err();
        assert!(err.to_string().contains("foreign key violation"));
        assert!(adapter.in_transaction());
        adapter.rollback_transaction().await.unwrap();

        let rows = adapter.fetch_all("SELECT id FROM parents", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(adapter.execute("DELETE FROM parents").await.is_ok());
        let rows = adapter.fetch_all("SELECT parent_id FROM children", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_ddl() {
        let mut adapter = memory_adapter().await;
        adapter.begin_transaction().await.unwrap();
        assert!(adapter.in_transaction());
        adapter.execute("CREATE TABLE scratch (a INTEGER)").await.unwrap();
        adapter.rollback_transaction().await.unwrap();
        assert!(!adapter.in_transaction());
        assert!(!adapter.has_table("scratch").await.unwrap());
    }

    #[tokio::test]
    async fn test_describe_table() {
        let mut adapter = memory_adapter().await;
        {
            let mut schema = Schema::new(&mut adapter);
            let mut authors = TableDefinition::new("authors");
            authors.columns = vec![Column::integer("id").identity()];
            authors.primary_key = vec!["id".to_string()];
            schema.apply(SchemaOperation::CreateTable(authors)).await.unwrap();

            let mut posts = TableDefinition::new("posts");
            posts.columns = vec![
                Column::integer("id").identity(),
                Column::integer("author_id").nullable(),
                Column::string("slug").limit(80),
            ];
            posts.primary_key = vec!["id".to_string()];
            posts.indexes = vec![Index::new(["slug"]).unique()];
            posts.foreign_keys = vec![ForeignKey::new(["author_id"], "authors", ["id"])
                .on_delete(ReferentialAction::SetNull)];
            schema.apply(SchemaOperation::CreateTable(posts)).await.unwrap();
        }

        let posts = adapter.describe_table("posts").await.unwrap();
        assert_eq!(posts.primary_key, vec!["id"]);
        assert!(posts.columns[0].options.identity);
        assert!(posts.columns[1].options.null);
        assert_eq!(posts.columns[2].options.limit, Some(80));
        assert_eq!(posts.indexes.len(), 1);
        assert_eq!(posts.indexes[0].name.as_deref(), Some("posts_slug_unique"));
        assert_eq!(posts.indexes[0].index_type, IndexType::Unique);
        assert_eq!(posts.foreign_keys.len(), 1);
        assert_eq!(
            posts.foreign_keys[0].constraint_name.as_deref(),
            Some("posts_author_id_fk")
        );
        assert_eq!(posts.foreign_keys[0].on_delete, Some(ReferentialAction::SetNull));

        assert!(adapter.has_index("posts", &["slug"]).await.unwrap());
        assert!(adapter.has_foreign_key("posts", &["author_id"], None).await.unwrap());
        assert!(!adapter.has_column("posts", "title").await.unwrap());
        assert!(adapter.describe_table("missing").await.is_err());
    }
}
