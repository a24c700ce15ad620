//! Shared fixtures for the engine tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use keel_migrate::backends::{Adapter, BackendType, DatabaseRow, DatabaseValue, SqliteAdapter};
use keel_migrate::prelude::*;
use keel_migrate::schema::TableDefinition;
use keel_migrate::translator::Dialect;

/// Statements written through a [`JournalingAdapter`], in execution order
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, sql: &str) {
        self.0.lock().unwrap().push(sql.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Index of the first statement starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|sql| sql.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|sql| sql.starts_with(prefix))
            .count()
    }
}

/// Adapter wrapper recording every write and transaction boundary
pub struct JournalingAdapter<A> {
    inner: A,
    journal: Journal,
    transactional: bool,
}

impl<A: Adapter> JournalingAdapter<A> {
    pub fn new(inner: A) -> Self {
        let transactional = inner.supports_transactional_ddl();
        Self {
            inner,
            journal: Journal::default(),
            transactional,
        }
    }

    /// Pretend the engine cannot run DDL inside transactions
    pub fn without_transactions(mut self) -> Self {
        self.transactional = false;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

#[async_trait]
impl<A: Adapter> Adapter for JournalingAdapter<A> {
    fn backend_type(&self) -> BackendType {
        self.inner.backend_type()
    }

    fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect()
    }

    fn log_table(&self) -> &str {
        self.inner.log_table()
    }

    async fn connect(&mut self) -> MigrationResult<()> {
        self.inner.connect().await
    }

    async fn disconnect(&mut self) -> MigrationResult<()> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.transactional
    }

    async fn begin_transaction(&mut self) -> MigrationResult<()> {
        self.journal.push("BEGIN");
        self.inner.begin_transaction().await
    }

    async fn commit_transaction(&mut self) -> MigrationResult<()> {
        self.journal.push("COMMIT");
        self.inner.commit_transaction().await
    }

    async fn rollback_transaction(&mut self) -> MigrationResult<()> {
        self.journal.push("ROLLBACK");
        self.inner.rollback_transaction().await
    }

    async fn execute_with(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrationResult<u64> {
        self.journal.push(sql);
        self.inner.execute_with(sql, params).await
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> MigrationResult<Vec<DatabaseRow>> {
        self.inner.fetch_all(sql, params).await
    }

    async fn has_table(&mut self, table: &str) -> MigrationResult<bool> {
        self.inner.has_table(table).await
    }

    async fn describe_table(&mut self, table: &str) -> MigrationResult<TableDefinition> {
        self.inner.describe_table(table).await
    }
}

/// Route engine logs to the test output; `RUST_LOG=keel_migrate=debug` shows statements
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn memory_adapter() -> SqliteAdapter {
    init_tracing();
    let mut adapter = SqliteAdapter::new("sqlite::memory:");
    adapter.connect().await.unwrap();
    adapter
}

pub async fn journaled() -> (JournalingAdapter<SqliteAdapter>, Journal) {
    let adapter = JournalingAdapter::new(memory_adapter().await);
    let journal = adapter.journal();
    (adapter, journal)
}

pub fn config() -> MigrationConfig {
    let mut config = MigrationConfig::new("sqlite::memory:");
    config.migration_paths.clear();
    config
}

pub fn manager<A: Adapter + 'static>(adapter: A, registry: MigrationRegistry) -> MigrationManager {
    MigrationManager::new(config(), Box::new(adapter), registry).unwrap()
}

/// The users fixture: V1 creates the table, V2 adds email, V3 indexes it
pub fn users_registry() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateUsers)
        .register(AddEmail)
        .register(UniqueEmail);
    registry
}

pub struct CreateUsers;

#[async_trait]
impl Migration for CreateUsers {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "create_users"
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        Table::new("users").create(schema).await
    }
}

pub struct AddEmail;

#[async_trait]
impl Migration for AddEmail {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "add_email"
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        Table::new("users")
            .add_column(Column::string("email").nullable())
            .update(schema)
            .await
    }
}

pub struct UniqueEmail;

#[async_trait]
impl Migration for UniqueEmail {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "unique_email"
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        Table::new("users")
            .add_index(Index::new(["email"]).unique())
            .update(schema)
            .await
    }
}

/// Posts belong to users and go with them
pub struct CreatePosts;

#[async_trait]
impl Migration for CreatePosts {
    fn version(&self) -> i64 {
        4
    }

    fn name(&self) -> &str {
        "create_posts"
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        Table::new("posts")
            .add_column(Column::integer("user_id"))
            .add_column(Column::string("title").limit(120))
            .add_column(Column::text("body").nullable())
            .add_index(Index::new(["user_id", "title"]).unique())
            .add_foreign_key(
                ForeignKey::new(["user_id"], "users", ["id"])
                    .on_delete(ReferentialAction::Cascade),
            )
            .create(schema)
            .await
    }
}

/// Creates one table with a single name column
pub struct CreateTable {
    pub version: i64,
    pub name: String,
    pub table: String,
}

impl CreateTable {
    pub fn new(version: i64, table: &str) -> Self {
        Self {
            version,
            name: format!("create_{}", table),
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl Migration for CreateTable {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        Table::new(self.table.as_str())
            .add_column(Column::string("name"))
            .create(schema)
            .await
    }
}

/// Runs raw statements up and down
pub struct RawSql {
    pub version: i64,
    pub name: &'static str,
    pub up: Vec<&'static str>,
    pub down: Vec<&'static str>,
}

#[async_trait]
impl Migration for RawSql {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> MigrationKind {
        MigrationKind::UpDown
    }

    async fn up(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        for sql in &self.up {
            schema.execute(*sql).await?;
        }
        Ok(())
    }

    async fn down(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        for sql in &self.down {
            schema.execute(*sql).await?;
        }
        Ok(())
    }
}

/// One user with one post, for checks that child rows survive
pub async fn seed_user_with_post(manager: &mut MigrationManager) {
    let adapter = manager.adapter_mut();
    adapter
        .execute("INSERT INTO users (id, email) VALUES (1, 'ada@example.com')")
        .await
        .unwrap();
    adapter
        .execute("INSERT INTO posts (user_id, title) VALUES (1, 'hello')")
        .await
        .unwrap();
}

pub async fn count_rows(manager: &mut MigrationManager, table: &str) -> i64 {
    let rows = manager
        .adapter_mut()
        .fetch_all(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
        .await
        .unwrap();
    rows[0].get_i64("n").unwrap()
}

pub async fn logged_versions(manager: &mut MigrationManager) -> Vec<i64> {
    manager
        .adapter_mut()
        .applied_versions()
        .await
        .unwrap()
        .iter()
        .map(|entry| entry.version)
        .collect()
}
