//! Migration Manager - Drives migrations against one adapter
//!
//! Compares the discovered migrations with the version log and applies the
//! pending ones in ascending version order, one transaction per migration
//! where the engine allows it. The first failure stops the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::definitions::{
    Migration, MigrationDirection, MigrationRunResult, MigrationState, MigrationSummary,
    VersionLogEntry,
};
use super::registry::MigrationRegistry;
use crate::backends::{connect_adapter, Adapter};
use crate::config::{MigrationConfig, VersionOrder};
use crate::error::{MigrationError, MigrationResult};
use crate::schema::{Schema, SchemaOperation};

/// What a single unit run executes
pub(crate) enum UnitPlan {
    Up,
    Down,
    /// Pre-computed inverse of a recorded `change()`
    Operations(Vec<SchemaOperation>),
}

impl UnitPlan {
    fn direction(&self) -> MigrationDirection {
        match self {
            UnitPlan::Up => MigrationDirection::Up,
            UnitPlan::Down | UnitPlan::Operations(_) => MigrationDirection::Down,
        }
    }
}

/// Applies, rolls back and reports migrations for one database
pub struct MigrationManager {
    config: MigrationConfig,
    adapter: Box<dyn Adapter>,
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationManager {
    /// Create a manager over a connected adapter and a set of migrations
    pub fn new(
        config: MigrationConfig,
        adapter: Box<dyn Adapter>,
        registry: MigrationRegistry,
    ) -> MigrationResult<Self> {
        let migrations = registry.build()?;
        debug!(
            "Migration manager ready with {} migration(s) on {}",
            migrations.len(),
            adapter.backend_type()
        );
        Ok(Self {
            config,
            adapter,
            migrations,
        })
    }

    /// Scan the configured paths, connect the configured adapter and build a manager
    ///
    /// Migrations already registered in `registry` are kept alongside the
    /// scanned SQL files.
    pub async fn connect(
        config: MigrationConfig,
        mut registry: MigrationRegistry,
    ) -> MigrationResult<Self> {
        config.validate()?;
        for path in &config.migration_paths {
            registry.scan_directory(path)?;
        }
        let adapter = connect_adapter(&config.database, &config.log_table).await?;
        Self::new(config, adapter, registry)
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Discovered migrations, ascending by version
    pub fn migrations(&self) -> &[Arc<dyn Migration>] {
        &self.migrations
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn adapter_mut(&mut self) -> &mut dyn Adapter {
        self.adapter.as_mut()
    }

    pub fn into_adapter(self) -> Box<dyn Adapter> {
        self.adapter
    }

    pub(crate) fn find(&self, version: i64) -> Option<Arc<dyn Migration>> {
        self.migrations
            .iter()
            .find(|m| m.version() == version)
            .cloned()
    }

    /// Apply every pending migration with a version up to `target`
    ///
    /// `None` targets the latest discovered version.
    pub async fn migrate(&mut self, target: Option<i64>) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();

        self.adapter.ensure_log_table().await?;
        let log = self.adapter.applied_versions().await?;
        self.warn_missing(&log);
        let applied: HashSet<i64> = log.iter().map(|entry| entry.version).collect();

        let skipped_count = self
            .migrations
            .iter()
            .filter(|m| applied.contains(&m.version()))
            .count();

        let target = target.or_else(|| self.migrations.last().map(|m| m.version()));
        let pending: Vec<Arc<dyn Migration>> = match target {
            Some(target) => self
                .migrations
                .iter()
                .filter(|m| !applied.contains(&m.version()) && m.version() <= target)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if pending.is_empty() {
            info!("No pending migrations");
        }

        let mut applied_migrations = Vec::with_capacity(pending.len());
        for migration in pending {
            let summary = self.run_unit(migration, UnitPlan::Up).await?;
            applied_migrations.push(summary);
        }

        Ok(MigrationRunResult {
            applied_migrations,
            skipped_count,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Run one migration in its own transaction and update the version log
    pub(crate) async fn run_unit(
        &mut self,
        migration: Arc<dyn Migration>,
        plan: UnitPlan,
    ) -> MigrationResult<MigrationSummary> {
        let version = migration.version();
        let name = migration.name().to_string();
        let direction = plan.direction();
        let (from, running) = match direction {
            MigrationDirection::Up => (MigrationState::Pending, MigrationState::Applying),
            MigrationDirection::Down => (MigrationState::Applied, MigrationState::RollingBack),
        };
        debug!("Migration {} ({}): {} -> {}", version, name, from, running);
        match direction {
            MigrationDirection::Up => info!("Applying migration {} ({})", version, name),
            MigrationDirection::Down => info!("Rolling back migration {} ({})", version, name),
        }

        let start_time = Instant::now();
        let entry = VersionLogEntry::started(version, name.clone());
        let transactional = self.adapter.supports_transactional_ddl();
        if transactional {
            self.adapter
                .begin_transaction()
                .await
                .map_err(|e| MigrationError::Failed {
                    version,
                    name: name.clone(),
                    source: Box::new(e),
                })?;
        }

        let (outcome, statements_executed) = {
            let mut schema = Schema::new(self.adapter.as_mut());
            let outcome = match &plan {
                UnitPlan::Up => migration.up(&mut schema).await,
                UnitPlan::Down => migration.down(&mut schema).await,
                UnitPlan::Operations(ops) => apply_all(&mut schema, ops).await,
            };
            (outcome, schema.statements_executed())
        };

        let outcome = match outcome {
            Ok(()) => match direction {
                MigrationDirection::Up => self.adapter.record_version(&entry.finished()).await,
                MigrationDirection::Down => self.adapter.remove_version(version).await,
            },
            Err(e) => Err(e),
        };

        let outcome = match outcome {
            Ok(()) if transactional => self.adapter.commit_transaction().await,
            other => other,
        };

        match outcome {
            Ok(()) => {
                let to = match direction {
                    MigrationDirection::Up => MigrationState::Applied,
                    MigrationDirection::Down => MigrationState::Pending,
                };
                debug!("Migration {} ({}): {} -> {}", version, name, running, to);
                let execution_time_ms = start_time.elapsed().as_millis();
                info!(
                    "Migration {} ({}) {} in {}ms",
                    version,
                    name,
                    match direction {
                        MigrationDirection::Up => "applied",
                        MigrationDirection::Down => "rolled back",
                    },
                    execution_time_ms
                );
                Ok(MigrationSummary {
                    version,
                    name,
                    statements_executed,
                    execution_time_ms,
                })
            }
            Err(e) => Err(self
                .fail_unit(version, name, running, transactional, statements_executed, e)
                .await),
        }
    }

    /// Undo what can be undone after a failed unit and classify the error
    async fn fail_unit(
        &mut self,
        version: i64,
        name: String,
        running: MigrationState,
        transactional: bool,
        statements_executed: usize,
        source: MigrationError,
    ) -> MigrationError {
        if transactional && self.adapter.in_transaction() {
            if let Err(rollback_error) = self.adapter.rollback_transaction().await {
                warn!(
                    "Rolling back the transaction of migration {} failed: {}",
                    version, rollback_error
                );
            }
        }

        let dirty = !transactional && statements_executed > 0;
        let state = MigrationState::Failed { dirty };
        debug!("Migration {} ({}): {} -> {}", version, name, running, state);
        error!(
            "Migration {} ({}) failed after {} statement(s), dirty: {}: {}",
            version, name, statements_executed, dirty, source
        );

        if dirty {
            return MigrationError::DirtyState {
                version,
                name,
                statements_executed,
                source: Box::new(source),
            };
        }
        match source {
            irreversible @ MigrationError::Irreversible { .. } => irreversible,
            source => MigrationError::Failed {
                version,
                name,
                source: Box::new(source),
            },
        }
    }

    /// Log entries in the configured version order
    pub(crate) fn ordered_log(&self, mut log: Vec<VersionLogEntry>) -> Vec<VersionLogEntry> {
        match self.config.version_order {
            VersionOrder::Creation => log.sort_by_key(|entry| entry.version),
            VersionOrder::Execution => log.sort_by(|a, b| {
                a.start_time
                    .cmp(&b.start_time)
                    .then(a.version.cmp(&b.version))
            }),
        }
        log
    }

    /// Log entries without a discovered migration
    pub(crate) fn missing_entries<'a>(
        &self,
        log: &'a [VersionLogEntry],
    ) -> Vec<&'a VersionLogEntry> {
        let known: HashSet<i64> = self.migrations.iter().map(|m| m.version()).collect();
        log.iter()
            .filter(|entry| !known.contains(&entry.version))
            .collect()
    }

    fn warn_missing(&self, log: &[VersionLogEntry]) {
        for entry in self.missing_entries(log) {
            warn!(
                "Migration {} ({}) is in the version log but was not found",
                entry.version, entry.migration_name
            );
        }
    }

    /// Set or clear the breakpoint of an applied version
    pub async fn set_breakpoint(&mut self, version: i64, breakpoint: bool) -> MigrationResult<()> {
        self.adapter.ensure_log_table().await?;
        let log = self.adapter.applied_versions().await?;
        if !log.iter().any(|entry| entry.version == version) {
            return Err(MigrationError::Validation(format!(
                "migration {} has not been applied",
                version
            )));
        }
        self.adapter.set_breakpoint(version, breakpoint).await?;
        info!(
            "Breakpoint {} for migration {}",
            if breakpoint { "set" } else { "cleared" },
            version
        );
        Ok(())
    }

    /// Flip the breakpoint of `version`, or of the most recent applied
    /// migration when `None`. Returns the new flag.
    pub async fn toggle_breakpoint(&mut self, version: Option<i64>) -> MigrationResult<bool> {
        self.adapter.ensure_log_table().await?;
        let log = self.adapter.applied_versions().await?;
        let log = self.ordered_log(log);
        let entry = match version {
            Some(version) => log.iter().find(|entry| entry.version == version).ok_or_else(|| {
                MigrationError::Validation(format!("migration {} has not been applied", version))
            })?,
            None => log.last().ok_or_else(|| {
                MigrationError::Validation("no migrations have been applied".to_string())
            })?,
        };
        let (version, breakpoint) = (entry.version, !entry.breakpoint);
        self.set_breakpoint(version, breakpoint).await?;
        Ok(breakpoint)
    }

    /// Clear every breakpoint. Returns the number of log rows updated.
    pub async fn remove_all_breakpoints(&mut self) -> MigrationResult<u64> {
        self.adapter.ensure_log_table().await?;
        let cleared = self.adapter.reset_breakpoints().await?;
        info!("Cleared breakpoints on {} migration(s)", cleared);
        Ok(cleared)
    }
}

async fn apply_all(schema: &mut Schema<'_>, ops: &[SchemaOperation]) -> MigrationResult<()> {
    for op in ops {
        schema.apply(op.clone()).await?;
    }
    Ok(())
}
