mod common;

use std::time::Duration;

use common::*;
use keel_migrate::backends::Adapter;
use keel_migrate::prelude::*;
use keel_migrate::SqlFileMigration;

#[tokio::test]
async fn test_rollback_reverts_in_descending_order() {
    let (adapter, journal) = journaled().await;
    let mut manager = manager(adapter, users_registry());
    manager.migrate(None).await.unwrap();
    journal.clear();

    let result = manager
        .rollback(RollbackTarget::Version(1), false)
        .await
        .unwrap();
    assert_eq!(result.versions(), vec![3, 2]);
    assert_eq!(logged_versions(&mut manager).await, vec![1]);

    // the index from V3 goes before the column from V2
    let drop_index = journal.position("DROP INDEX").unwrap();
    let rebuild = journal.position("DROP TABLE \"users\"").unwrap();
    assert!(drop_index < rebuild);

    let users = manager.adapter_mut().describe_table("users").await.unwrap();
    assert!(!users.has_column("email"));
    assert!(users.has_column("id"));

    let again = manager
        .rollback(RollbackTarget::Version(1), false)
        .await
        .unwrap();
    assert_eq!(again.rolled_back_count(), 0);
}

#[tokio::test]
async fn test_rollback_by_steps() {
    let (adapter, _journal) = journaled().await;
    let mut manager = manager(adapter, users_registry());
    manager.migrate(None).await.unwrap();

    let result = manager.rollback(RollbackTarget::default(), false).await.unwrap();
    assert_eq!(result.versions(), vec![3]);

    let result = manager.rollback(RollbackTarget::Steps(10), false).await.unwrap();
    assert_eq!(result.versions(), vec![2, 1]);
    assert!(!manager.adapter_mut().has_table("users").await.unwrap());
}

#[tokio::test]
async fn test_full_rollback_then_migrate_reproduces_schema() {
    let (adapter, _journal) = journaled().await;
    let mut registry = users_registry();
    registry.register(CreatePosts);
    let mut manager = manager(adapter, registry);

    manager.migrate(None).await.unwrap();
    let users = manager.adapter_mut().describe_table("users").await.unwrap();
    let posts = manager.adapter_mut().describe_table("posts").await.unwrap();

    let result = manager
        .rollback(RollbackTarget::Version(0), false)
        .await
        .unwrap();
    assert_eq!(result.versions(), vec![4, 3, 2, 1]);
    assert!(!manager.adapter_mut().has_table("posts").await.unwrap());
    assert!(logged_versions(&mut manager).await.is_empty());

    manager.migrate(None).await.unwrap();
    assert_eq!(manager.adapter_mut().describe_table("users").await.unwrap(), users);
    assert_eq!(manager.adapter_mut().describe_table("posts").await.unwrap(), posts);
}

#[tokio::test]
async fn test_breakpoint_blocks_rollback_unless_forced() {
    let (adapter, journal) = journaled().await;
    let mut manager = manager(adapter, users_registry());
    manager.migrate(None).await.unwrap();
    manager.set_breakpoint(2, true).await.unwrap();
    journal.clear();

    let err = manager
        .rollback(RollbackTarget::Version(1), false)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Breakpoint { version: 2, .. }));
    assert_eq!(err.exit_code(), 4);
    assert!(journal.entries().is_empty());
    assert_eq!(logged_versions(&mut manager).await, vec![1, 2, 3]);

    // rolling back above the breakpoint is fine
    let result = manager.rollback(RollbackTarget::Steps(1), false).await.unwrap();
    assert_eq!(result.versions(), vec![3]);

    let result = manager
        .rollback(RollbackTarget::Version(1), true)
        .await
        .unwrap();
    assert_eq!(result.versions(), vec![2]);
}

#[tokio::test]
async fn test_irreversible_change_is_reported_before_executing() {
    let (adapter, journal) = journaled().await;
    let mut registry = users_registry();
    registry.register(Backfill);
    let mut manager = manager(adapter, registry);
    manager.migrate(None).await.unwrap();
    journal.clear();

    let err = manager
        .rollback(RollbackTarget::Version(0), false)
        .await
        .unwrap_err();
    match &err {
        MigrationError::Irreversible { version, reason, .. } => {
            assert_eq!(*version, 4);
            assert!(reason.contains("UPDATE users"));
        }
        other => panic!("expected an irreversible error, got {:?}", other),
    }
    assert!(journal.entries().is_empty());
    assert_eq!(logged_versions(&mut manager).await, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_sql_file_without_down_is_irreversible() {
    let (adapter, _journal) = journaled().await;
    let mut registry = MigrationRegistry::new();
    registry.register(
        SqlFileMigration::parse(5, "seed", "CREATE TABLE seeds (id INTEGER);").unwrap(),
    );
    let mut manager = manager(adapter, registry);
    manager.migrate(None).await.unwrap();

    let err = manager.rollback(RollbackTarget::Steps(1), false).await.unwrap_err();
    assert!(matches!(err, MigrationError::Irreversible { version: 5, .. }));
    assert!(manager.adapter_mut().has_table("seeds").await.unwrap());
}

#[tokio::test]
async fn test_rename_is_reversed() {
    let (adapter, _journal) = journaled().await;
    let mut registry = users_registry();
    registry.register(RenameEmail);
    let mut manager = manager(adapter, registry);
    manager.migrate(None).await.unwrap();
    assert!(manager
        .adapter_mut()
        .has_column("users", "email_address")
        .await
        .unwrap());

    manager.rollback(RollbackTarget::Steps(1), false).await.unwrap();
    assert!(manager.adapter_mut().has_column("users", "email").await.unwrap());
    assert!(!manager
        .adapter_mut()
        .has_column("users", "email_address")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_rollback_target_must_be_applied() {
    let (adapter, _journal) = journaled().await;
    let mut manager = manager(adapter, users_registry());
    manager.migrate(Some(2)).await.unwrap();

    let err = manager
        .rollback(RollbackTarget::Version(3), false)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Validation(_)));
}

#[tokio::test]
async fn test_rolling_back_a_missing_migration_is_refused() {
    let (adapter, _journal) = journaled().await;
    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateTable::new(1, "authors"))
        .register(CreateTable::new(2, "books"));
    let mut first = manager(adapter, registry);
    first.migrate(None).await.unwrap();

    let mut registry = MigrationRegistry::new();
    registry.register(CreateTable::new(1, "authors"));
    let mut second = MigrationManager::new(config(), first.into_adapter(), registry).unwrap();

    let err = second
        .rollback(RollbackTarget::Version(0), false)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Validation(_)));
    assert!(second.adapter_mut().has_table("authors").await.unwrap());
    assert_eq!(logged_versions(&mut second).await, vec![1, 2]);
}

#[tokio::test]
async fn test_execution_order_rolls_back_latest_applied_first() {
    let (adapter, _journal) = journaled().await;
    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateTable::new(1, "authors"))
        .register(CreateTable::new(3, "shelves"));
    let mut first = manager(adapter, registry);
    first.migrate(None).await.unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let mut registry = MigrationRegistry::new();
    registry
        .register(CreateTable::new(1, "authors"))
        .register(CreateTable::new(2, "books"))
        .register(CreateTable::new(3, "shelves"));
    let mut config = config();
    config.version_order = VersionOrder::Execution;
    let mut manager = MigrationManager::new(config, first.into_adapter(), registry).unwrap();
    assert_eq!(manager.migrate(None).await.unwrap().versions(), vec![2]);

    let result = manager.rollback(RollbackTarget::Steps(1), false).await.unwrap();
    assert_eq!(result.versions(), vec![2]);

    let result = manager
        .rollback(RollbackTarget::Version(1), false)
        .await
        .unwrap();
    assert_eq!(result.versions(), vec![3]);
}

#[tokio::test]
async fn test_up_only_migration_is_irreversible() {
    let (adapter, journal) = journaled().await;
    let mut registry = MigrationRegistry::new();
    registry.register(CreateUsers).register(UpOnly);
    let mut manager = manager(adapter, registry);
    manager.migrate(None).await.unwrap();
    journal.clear();

    let err = manager
        .rollback(RollbackTarget::Version(0), false)
        .await
        .unwrap_err();
    match &err {
        MigrationError::Irreversible { version, reason, .. } => {
            assert_eq!(*version, 2);
            assert!(reason.contains("no operations"));
        }
        other => panic!("expected an irreversible error, got {:?}", other),
    }
    assert!(journal.entries().is_empty());
    assert!(manager.adapter_mut().has_table("widgets").await.unwrap());
    assert_eq!(logged_versions(&mut manager).await, vec![1, 2]);
}

#[tokio::test]
async fn test_up_down_without_kind_is_not_silently_dropped() {
    let (adapter, journal) = journaled().await;
    let mut registry = MigrationRegistry::new();
    registry.register(UpDownWithoutKind);
    let mut manager = manager(adapter, registry);
    manager.migrate(None).await.unwrap();
    journal.clear();

    let err = manager.rollback(RollbackTarget::Steps(1), false).await.unwrap_err();
    assert!(matches!(err, MigrationError::Irreversible { version: 3, .. }));
    assert!(journal.entries().is_empty());
    assert_eq!(logged_versions(&mut manager).await, vec![3]);
}

#[tokio::test]
async fn test_save_in_change_cannot_be_reversed() {
    let (adapter, journal) = journaled().await;
    let mut registry = MigrationRegistry::new();
    registry.register(SaveGadgets);
    let mut manager = manager(adapter, registry);
    manager.migrate(None).await.unwrap();
    assert!(manager.adapter_mut().has_table("gadgets").await.unwrap());
    journal.clear();

    let err = manager.rollback(RollbackTarget::Steps(1), false).await.unwrap_err();
    match &err {
        MigrationError::Irreversible { version, reason, .. } => {
            assert_eq!(*version, 6);
            assert!(reason.contains("save()"));
        }
        other => panic!("expected an irreversible error, got {:?}", other),
    }
    assert!(journal.entries().is_empty());
    assert!(manager.adapter_mut().has_table("gadgets").await.unwrap());
}

#[tokio::test]
async fn test_rebuilding_a_parent_keeps_child_rows() {
    let (adapter, journal) = journaled().await;
    let mut registry = users_registry();
    registry.register(CreatePosts).register(AddNickname);
    let mut manager = manager(adapter, registry);
    manager.migrate(Some(4)).await.unwrap();
    seed_user_with_post(&mut manager).await;
    manager.migrate(None).await.unwrap();
    journal.clear();

    let result = manager.rollback(RollbackTarget::Steps(1), false).await.unwrap();
    assert_eq!(result.versions(), vec![5]);
    assert!(journal.position("DROP TABLE \"users\"").is_some());
    assert!(!manager.adapter_mut().has_column("users", "nickname").await.unwrap());

    assert_eq!(count_rows(&mut manager, "users").await, 1);
    assert_eq!(count_rows(&mut manager, "posts").await, 1);
    let posts = manager.adapter_mut().describe_table("posts").await.unwrap();
    assert_eq!(posts.foreign_keys.len(), 1);

    // enforcement is back on once the unit has committed
    let orphan = manager
        .adapter_mut()
        .execute("INSERT INTO posts (user_id, title) VALUES (99, 'orphan')")
        .await;
    assert!(orphan.is_err());
}

struct Backfill;

#[async_trait]
impl Migration for Backfill {
    fn version(&self) -> i64 {
        4
    }

    fn name(&self) -> &str {
        "backfill_emails"
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        schema
            .execute("UPDATE users SET email = 'unknown' WHERE email IS NULL")
            .await
    }
}

struct RenameEmail;

#[async_trait]
impl Migration for RenameEmail {
    fn version(&self) -> i64 {
        4
    }

    fn name(&self) -> &str {
        "rename_email"
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        Table::new("users")
            .rename_column("email", "email_address")
            .update(schema)
            .await
    }
}

struct UpOnly;

#[async_trait]
impl Migration for UpOnly {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "create_widgets"
    }

    async fn up(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        schema.execute("CREATE TABLE widgets (id INTEGER)").await
    }
}

struct UpDownWithoutKind;

#[async_trait]
impl Migration for UpDownWithoutKind {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "create_gizmos"
    }

    async fn up(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        schema.execute("CREATE TABLE gizmos (id INTEGER)").await
    }

    async fn down(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        schema.execute("DROP TABLE gizmos").await
    }
}

struct SaveGadgets;

#[async_trait]
impl Migration for SaveGadgets {
    fn version(&self) -> i64 {
        6
    }

    fn name(&self) -> &str {
        "save_gadgets"
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        Table::new("gadgets")
            .add_column(Column::string("label"))
            .save(schema)
            .await
    }
}

struct AddNickname;

#[async_trait]
impl Migration for AddNickname {
    fn version(&self) -> i64 {
        5
    }

    fn name(&self) -> &str {
        "add_nickname"
    }

    async fn change(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        Table::new("users")
            .add_column(Column::string("nickname").nullable())
            .update(schema)
            .await
    }
}
