//! Foreign key constraints

use std::fmt;

use super::options::{apply_options, OptionSetter, OptionValue};
use crate::error::{MigrationError, MigrationResult};

/// Referential action for `ON DELETE` / `ON UPDATE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl std::str::FromStr for ReferentialAction {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('_', " ").as_str() {
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" => Ok(ReferentialAction::SetDefault),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "NO ACTION" => Ok(ReferentialAction::NoAction),
            _ => Err(MigrationError::Validation(format!(
                "\"{}\" is not a valid referential action.",
                s
            ))),
        }
    }
}

/// A foreign key constraint
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub constraint_name: Option<String>,
}

const FOREIGN_KEY_OPTIONS: &[(&str, OptionSetter<ForeignKey>)] = &[
    ("delete", |fk, value| {
        fk.on_delete = match value.as_optional_string("delete")? {
            Some(action) => Some(action.parse()?),
            None => None,
        };
        Ok(())
    }),
    ("update", |fk, value| {
        fk.on_update = match value.as_optional_string("update")? {
            Some(action) => Some(action.parse()?),
            None => None,
        };
        Ok(())
    }),
    ("constraint", |fk, value| {
        fk.constraint_name = value.as_optional_string("constraint")?;
        Ok(())
    }),
];

impl ForeignKey {
    pub fn new<C, R>(
        columns: impl IntoIterator<Item = C>,
        referenced_table: impl Into<String>,
        referenced_columns: impl IntoIterator<Item = R>,
    ) -> Self
    where
        C: Into<String>,
        R: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
            on_delete: None,
            on_update: None,
            constraint_name: None,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn constraint(mut self, name: impl Into<String>) -> Self {
        self.constraint_name = Some(name.into());
        self
    }

    /// Apply `delete`, `update` and `constraint` options
    pub fn set_options<K, V, I>(&mut self, options: I) -> MigrationResult<&mut Self>
    where
        K: AsRef<str>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        apply_options(self, "foreign key", FOREIGN_KEY_OPTIONS, options)?;
        Ok(self)
    }

    pub fn matches_columns<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b.as_ref()))
    }

    pub(crate) fn validate(&self) -> MigrationResult<()> {
        if self.columns.is_empty() || self.referenced_table.trim().is_empty() {
            return Err(MigrationError::Validation(
                "a foreign key needs columns and a referenced table".to_string(),
            ));
        }
        if self.columns.len() != self.referenced_columns.len() {
            return Err(MigrationError::Validation(format!(
                "foreign key on ({}) references {} column(s) of '{}'",
                self.columns.join(", "),
                self.referenced_columns.len(),
                self.referenced_table
            )));
        }
        Ok(())
    }
}
