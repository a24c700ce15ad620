//! Migration Rollback - Reverts applied migrations
//!
//! Every precondition is checked before the first statement runs: the set of
//! migrations to revert is resolved from the version log, breakpoints are
//! honoured, and each unit's reverse logic is planned up front so an
//! irreversible migration is reported without touching the schema.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::definitions::{Migration, MigrationKind, RollbackResult, RollbackTarget, VersionLogEntry};
use super::manager::{MigrationManager, UnitPlan};
use crate::config::VersionOrder;
use crate::error::{MigrationError, MigrationResult};
use crate::schema::Schema;

impl MigrationManager {
    /// Revert applied migrations down to `target`
    ///
    /// Crossing a breakpoint is refused unless `force` is set.
    pub async fn rollback(
        &mut self,
        target: RollbackTarget,
        force: bool,
    ) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();

        self.adapter_mut().ensure_log_table().await?;
        let log = self.adapter_mut().applied_versions().await?;
        let log = self.ordered_log(log);
        let selected = self.select_for_rollback(&log, target)?;

        if selected.is_empty() {
            info!("No migrations to roll back");
            return Ok(RollbackResult {
                rolled_back_migrations: Vec::new(),
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        if !force {
            if let Some(entry) = selected.iter().find(|entry| entry.breakpoint) {
                return Err(MigrationError::Breakpoint {
                    version: entry.version,
                    name: entry.migration_name.clone(),
                });
            }
        }

        let mut units = Vec::with_capacity(selected.len());
        for entry in &selected {
            let migration = self.find(entry.version).ok_or_else(|| {
                MigrationError::Validation(format!(
                    "migration {} ({}) is in the version log but was not found",
                    entry.version, entry.migration_name
                ))
            })?;
            units.push(migration);
        }

        let mut plans = Vec::with_capacity(units.len());
        for migration in units {
            let plan = self.plan_rollback(&migration).await?;
            plans.push((migration, plan));
        }

        let mut rolled_back_migrations = Vec::with_capacity(plans.len());
        for (migration, plan) in plans {
            let summary = self.run_unit(migration, plan).await?;
            rolled_back_migrations.push(summary);
        }

        Ok(RollbackResult {
            rolled_back_migrations,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Log entries to revert, in the order they will be reverted
    fn select_for_rollback(
        &self,
        log: &[VersionLogEntry],
        target: RollbackTarget,
    ) -> MigrationResult<Vec<VersionLogEntry>> {
        let selected: Vec<VersionLogEntry> = match target {
            RollbackTarget::Steps(steps) => {
                let keep = log.len().saturating_sub(steps);
                log[keep..].to_vec()
            }
            RollbackTarget::Version(0) => log.to_vec(),
            RollbackTarget::Version(version) => {
                let position = log
                    .iter()
                    .position(|entry| entry.version == version)
                    .ok_or_else(|| {
                        MigrationError::Validation(format!(
                            "rollback target {} has not been applied",
                            version
                        ))
                    })?;
                match self.config().version_order {
                    VersionOrder::Creation => log
                        .iter()
                        .filter(|entry| entry.version > version)
                        .cloned()
                        .collect(),
                    VersionOrder::Execution => log[position + 1..].to_vec(),
                }
            }
        };
        debug!(
            "Selected {} migration(s) for rollback with {:?}",
            selected.len(),
            target
        );
        Ok(selected.into_iter().rev().collect())
    }

    /// Work out how to revert one migration without executing anything
    async fn plan_rollback(&mut self, migration: &Arc<dyn Migration>) -> MigrationResult<UnitPlan> {
        match migration.kind() {
            MigrationKind::UpDown => Ok(UnitPlan::Down),
            MigrationKind::Irreversible => Err(MigrationError::Irreversible {
                version: migration.version(),
                name: migration.name().to_string(),
                reason: "the migration is forward-only".to_string(),
            }),
            MigrationKind::Change => {
                let irreversible = |reason: String| MigrationError::Irreversible {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    reason,
                };
                let recorded = {
                    let mut schema = Schema::recording(self.adapter_mut());
                    migration.change(&mut schema).await.map_err(|e| match e {
                        MigrationError::Validation(reason) => irreversible(reason),
                        other => other,
                    })?;
                    schema.into_recorded()
                };
                // up() without change() or an UpDown migration missing kind()
                if recorded.is_empty() {
                    return Err(irreversible(
                        "change() recorded no operations to reverse".to_string(),
                    ));
                }
                let mut inverse = Vec::with_capacity(recorded.len());
                for op in recorded.iter().rev() {
                    let undo = op
                        .inverse()
                        .ok_or_else(|| irreversible(format!("cannot reverse {}", op.describe())))?;
                    inverse.push(undo);
                }
                debug!(
                    "Planned {} inverse operation(s) for migration {}",
                    inverse.len(),
                    migration.version()
                );
                Ok(UnitPlan::Operations(inverse))
            }
        }
    }
}
