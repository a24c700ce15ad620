//! Index definitions

use std::fmt;

use super::options::{apply_options, OptionSetter, OptionValue};
use crate::error::{MigrationError, MigrationResult};

/// Index kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    #[default]
    Index,
    Unique,
    Fulltext,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Index => "index",
            IndexType::Unique => "unique",
            IndexType::Fulltext => "fulltext",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IndexType {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "index" => Ok(IndexType::Index),
            "unique" => Ok(IndexType::Unique),
            "fulltext" => Ok(IndexType::Fulltext),
            other => Err(MigrationError::Validation(format!(
                "\"{}\" is not a valid index type.",
                other
            ))),
        }
    }
}

/// A table index over an ordered list of columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Index {
    pub columns: Vec<String>,
    pub index_type: IndexType,
    pub name: Option<String>,
    /// Key prefix length (MySQL)
    pub limit: Option<u32>,
    /// Storage method, e.g. btree, hash, gist, gin
    pub using: Option<String>,
    /// Partial index predicate
    pub where_clause: Option<String>,
}

/// Accepted keys for [`Index::set_options`]. `unique` only ever sets the type.
const INDEX_OPTIONS: &[(&str, OptionSetter<Index>)] = &[
    ("type", |index, value| {
        index.index_type = value.as_string("type")?.parse()?;
        Ok(())
    }),
    ("unique", |index, value| {
        if value.is_truthy() {
            index.index_type = IndexType::Unique;
        }
        Ok(())
    }),
    ("name", |index, value| {
        index.name = value.as_optional_string("name")?;
        Ok(())
    }),
    ("limit", |index, value| {
        index.limit = match value {
            OptionValue::Null => None,
            other => Some(other.as_u32("limit")?),
        };
        Ok(())
    }),
    ("using", |index, value| {
        index.using = value.as_optional_string("using")?;
        Ok(())
    }),
    ("where", |index, value| {
        index.where_clause = value.as_optional_string("where")?;
        Ok(())
    }),
];

impl Index {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn unique(mut self) -> Self {
        self.index_type = IndexType::Unique;
        self
    }

    pub fn fulltext(mut self) -> Self {
        self.index_type = IndexType::Fulltext;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.using = Some(method.into());
        self
    }

    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    pub fn is_unique(&self) -> bool {
        self.index_type == IndexType::Unique
    }

    /// Maps an option map onto this index.
    ///
    /// Valid keys are `type`, `unique`, `name`, `limit`, `using` and `where`.
    /// An unknown key fails with a validation error and the index is left as
    /// it was.
    pub fn set_options<K, V, I>(&mut self, options: I) -> MigrationResult<&mut Self>
    where
        K: AsRef<str>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        apply_options(self, "index", INDEX_OPTIONS, options)?;
        Ok(self)
    }

    /// Builder form of [`Index::set_options`]
    pub fn with_options<K, V, I>(mut self, options: I) -> MigrationResult<Self>
    where
        K: AsRef<str>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_options(options)?;
        Ok(self)
    }

    /// Whether this index covers exactly `columns`, in order
    pub fn matches_columns<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b.as_ref()))
    }

    pub(crate) fn validate(&self) -> MigrationResult<()> {
        if self.columns.is_empty() {
            return Err(MigrationError::Validation(
                "an index needs at least one column".to_string(),
            ));
        }
        if self.columns.iter().any(|c| c.trim().is_empty()) {
            return Err(MigrationError::Validation(
                "index column names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
