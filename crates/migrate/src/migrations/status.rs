//! Migration status report

use std::collections::HashMap;
use std::slice;
use std::vec;

use super::definitions::{StatusRow, VersionLogEntry};
use super::manager::MigrationManager;
use crate::config::VersionOrder;
use crate::error::MigrationResult;

/// Discovered migrations joined with the version log
///
/// Iterating borrows the report, so it can be walked any number of times.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    rows: Vec<StatusRow>,
    missing: Vec<VersionLogEntry>,
}

impl StatusReport {
    pub fn iter(&self) -> slice::Iter<'_, StatusRow> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[StatusRow] {
        &self.rows
    }

    /// Logged versions with no discovered migration
    pub fn missing(&self) -> &[VersionLogEntry] {
        &self.missing
    }

    pub fn pending(&self) -> impl Iterator<Item = &StatusRow> {
        self.rows.iter().filter(|row| !row.applied)
    }

    pub fn is_up_to_date(&self) -> bool {
        self.rows.iter().all(|row| row.applied)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'a> IntoIterator for &'a StatusReport {
    type Item = &'a StatusRow;
    type IntoIter = slice::Iter<'a, StatusRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for StatusReport {
    type Item = StatusRow;
    type IntoIter = vec::IntoIter<StatusRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl MigrationManager {
    /// Report every discovered migration with its applied state
    ///
    /// Reading status never creates the version log table. The version log is
    /// read once, so the report is materialized rather than streamed; walking
    /// it again through [`StatusReport::iter`] does not touch the database.
    pub async fn status(&mut self) -> MigrationResult<StatusReport> {
        let log_table = self.adapter().log_table().to_string();
        let log = if self.adapter_mut().has_table(&log_table).await? {
            self.adapter_mut().applied_versions().await?
        } else {
            Vec::new()
        };
        let log = self.ordered_log(log);

        let missing: Vec<VersionLogEntry> = self
            .missing_entries(&log)
            .into_iter()
            .cloned()
            .collect();

        let by_version: HashMap<i64, &VersionLogEntry> =
            log.iter().map(|entry| (entry.version, entry)).collect();
        let mut rows: Vec<StatusRow> = self
            .migrations()
            .iter()
            .map(|migration| {
                let entry = by_version.get(&migration.version());
                StatusRow {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    applied: entry.is_some(),
                    breakpoint: entry.is_some_and(|e| e.breakpoint),
                    applied_at: entry.map(|e| e.start_time),
                }
            })
            .collect();

        if self.config().version_order == VersionOrder::Execution {
            let position: HashMap<i64, usize> = log
                .iter()
                .enumerate()
                .map(|(i, entry)| (entry.version, i))
                .collect();
            rows.sort_by_key(|row| match position.get(&row.version) {
                Some(i) => (0, *i as i64),
                None => (1, row.version),
            });
        }

        Ok(StatusReport { rows, missing })
    }
}
