mod common;

use std::time::Duration;

use common::*;
use keel_migrate::backends::Adapter;
use keel_migrate::prelude::*;

#[tokio::test]
async fn test_status_on_a_fresh_database() {
    let (adapter, journal) = journaled().await;
    let mut manager = manager(adapter, users_registry());

    let status = manager.status().await.unwrap();
    assert_eq!(status.len(), 3);
    assert!(status.iter().all(|row| !row.applied));
    assert!(!status.is_up_to_date());
    // reading status leaves the database untouched
    assert!(journal.entries().is_empty());
    assert!(!manager.adapter_mut().has_table("keel_log").await.unwrap());
}

#[tokio::test]
async fn test_status_joins_the_version_log() {
    let (adapter, _journal) = journaled().await;
    let mut manager = manager(adapter, users_registry());
    manager.migrate(Some(2)).await.unwrap();
    manager.set_breakpoint(1, true).await.unwrap();

    let status = manager.status().await.unwrap();
    let rows: Vec<(i64, &str, bool, bool)> = status
        .iter()
        .map(|row| (row.version, row.name.as_str(), row.applied, row.breakpoint))
        .collect();
    assert_eq!(
        rows,
        vec![
            (1, "create_users", true, true),
            (2, "add_email", true, false),
            (3, "unique_email", false, false),
        ]
    );
    assert!(status.rows()[0].applied_at.is_some());
    assert!(status.rows()[2].applied_at.is_none());

    // the report can be walked again
    let pending: Vec<i64> = status.pending().map(|row| row.version).collect();
    assert_eq!(pending, vec![3]);
    assert_eq!((&status).into_iter().count(), 3);
    assert!(status.missing().is_empty());
}

#[tokio::test]
async fn test_status_reports_missing_migrations() {
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

    let status = second.status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert!(status.is_up_to_date());
    assert_eq!(status.missing().len(), 1);
    assert_eq!(status.missing()[0].version, 2);
    assert_eq!(status.missing()[0].migration_name, "create_books");
}

#[tokio::test]
async fn test_status_in_execution_order() {
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
        .register(CreateTable::new(3, "shelves"))
        .register(CreateTable::new(4, "racks"));
    let mut config = config();
    config.version_order = VersionOrder::Execution;
    let mut manager = MigrationManager::new(config, first.into_adapter(), registry).unwrap();
    manager.migrate(Some(2)).await.unwrap();

    let order: Vec<i64> = manager
        .status()
        .await
        .unwrap()
        .iter()
        .map(|row| row.version)
        .collect();
    assert_eq!(order, vec![1, 3, 2, 4]);
}

#[tokio::test]
async fn test_breakpoint_management() {
    let (adapter, _journal) = journaled().await;
    let mut manager = manager(adapter, users_registry());

    let err = manager.toggle_breakpoint(None).await.unwrap_err();
    assert!(matches!(err, MigrationError::Validation(_)));

    manager.migrate(None).await.unwrap();
    assert!(manager.toggle_breakpoint(None).await.unwrap());
    assert!(manager.toggle_breakpoint(Some(1)).await.unwrap());
    assert!(!manager.toggle_breakpoint(Some(3)).await.unwrap());
    assert!(manager.set_breakpoint(9, true).await.is_err());

    manager.set_breakpoint(2, true).await.unwrap();
    assert_eq!(manager.remove_all_breakpoints().await.unwrap(), 2);
    let status = manager.status().await.unwrap();
    assert!(status.iter().all(|row| !row.breakpoint));
}
