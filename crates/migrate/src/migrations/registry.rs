//! Migration registry
//!
//! Collects migration units from explicit registrations and directory scans,
//! then validates and orders them.

use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::definitions::Migration;
use super::sql_file::SqlFileMigration;
use crate::config::MigrationConfig;
use crate::error::{MigrationError, MigrationResult};

/// In-memory set of discovered migrations
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every SQL migration under the configured paths
    pub fn from_config(config: &MigrationConfig) -> MigrationResult<Self> {
        let mut registry = Self::new();
        for path in &config.migration_paths {
            registry.scan_directory(path)?;
        }
        Ok(registry)
    }

    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> &mut Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    pub fn register_arc(&mut self, migration: Arc<dyn Migration>) -> &mut Self {
        self.migrations.push(migration);
        self
    }

    /// Add every `*.sql` file in `dir`. A missing directory adds nothing.
    ///
    /// Returns the number of migrations found.
    pub fn scan_directory(&mut self, dir: &Path) -> MigrationResult<usize> {
        if !dir.is_dir() {
            debug!("Migration path {} does not exist, skipping", dir.display());
            return Ok(0);
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let migration = SqlFileMigration::from_file(path)?;
            debug!(
                "Discovered migration {} ({}) in {}",
                migration.version(),
                migration.name(),
                path.display()
            );
            self.register(migration);
        }
        Ok(paths.len())
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Validate identities and return the migrations in ascending version order
    pub fn build(self) -> MigrationResult<Vec<Arc<dyn Migration>>> {
        let name_pattern = Regex::new(r"^[a-z][a-z0-9_]*$")
            .map_err(|e| MigrationError::Validation(e.to_string()))?;

        let mut versions = HashSet::new();
        let mut names = HashSet::new();
        for migration in &self.migrations {
            let version = migration.version();
            let name = migration.name();
            if version <= 0 {
                return Err(MigrationError::Validation(format!(
                    "migration '{}' has invalid version {}; versions must be positive",
                    name, version
                )));
            }
            if !name_pattern.is_match(name) {
                return Err(MigrationError::Validation(format!(
                    "migration name '{}' ({}) must be snake_case",
                    name, version
                )));
            }
            if !versions.insert(version) {
                return Err(MigrationError::Validation(format!(
                    "duplicate migration version {} ({})",
                    version, name
                )));
            }
            if !names.insert(name.to_string()) {
                return Err(MigrationError::Validation(format!(
                    "duplicate migration name '{}' ({})",
                    name, version
                )));
            }
        }

        let mut migrations = self.migrations;
        migrations.sort_by_key(|m| m.version());
        Ok(migrations)
    }
}
