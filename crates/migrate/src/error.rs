//! Error types for the migration engine
//!
//! Every failure surfaced by the engine is a [`MigrationError`]. Failures that
//! happen while a migration is executing are wrapped with the version and name
//! of the unit that was running so callers can diagnose without re-running.

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error taxonomy for discovery, translation, execution and rollback
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Invalid or duplicate versions, unknown option keys, malformed identifiers
    #[error("Validation error: {0}")]
    Validation(String),

    /// The adapter could not reach the database
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed to execute
    #[error("Adapter error: {message}{}", describe_statement(.statement))]
    Adapter {
        message: String,
        statement: Option<String>,
    },

    /// Rollback was requested for a migration without reverse logic
    #[error("Migration {version} ({name}) is irreversible: {reason}")]
    Irreversible {
        version: i64,
        name: String,
        reason: String,
    },

    /// Rollback would cross a breakpointed version
    #[error("Breakpoint set on migration {version} ({name}); rollback refused without force")]
    Breakpoint { version: i64, name: String },

    /// A non-transactional engine failed after some DDL had already run
    #[error(
        "Migration {version} ({name}) failed after {statements_executed} statement(s) on an engine \
         without transactional DDL; the schema is in a dirty state and needs manual inspection: {source}"
    )]
    DirtyState {
        version: i64,
        name: String,
        statements_executed: usize,
        #[source]
        source: Box<MigrationError>,
    },

    /// A migration failed and was cleanly rolled back
    #[error("Migration {version} ({name}) failed: {source}")]
    Failed {
        version: i64,
        name: String,
        #[source]
        source: Box<MigrationError>,
    },

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_statement(statement: &Option<String>) -> String {
    match statement {
        Some(sql) => format!(" [statement: {}]", sql),
        None => String::new(),
    }
}

impl MigrationError {
    /// Build an adapter error carrying the offending statement
    pub fn statement(message: impl Into<String>, sql: &str) -> Self {
        MigrationError::Adapter {
            message: message.into(),
            statement: Some(sql.to_string()),
        }
    }

    /// The migration version this error is attached to, if any
    pub fn version(&self) -> Option<i64> {
        match self {
            MigrationError::Irreversible { version, .. }
            | MigrationError::Breakpoint { version, .. }
            | MigrationError::DirtyState { version, .. }
            | MigrationError::Failed { version, .. } => Some(*version),
            _ => None,
        }
    }

    /// The migration name this error is attached to, if any
    pub fn migration_name(&self) -> Option<&str> {
        match self {
            MigrationError::Irreversible { name, .. }
            | MigrationError::Breakpoint { name, .. }
            | MigrationError::DirtyState { name, .. }
            | MigrationError::Failed { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether the schema may have been left partially modified
    pub fn is_dirty(&self) -> bool {
        matches!(self, MigrationError::DirtyState { .. })
    }

    /// Process exit code for command-line callers. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationError::Validation(_) | MigrationError::Configuration(_) => 2,
            MigrationError::DirtyState { .. } => 3,
            MigrationError::Irreversible { .. } | MigrationError::Breakpoint { .. } => 4,
            _ => 1,
        }
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Adapter {
            message: err.to_string(),
            statement: None,
        }
    }
}

impl From<serde_yaml::Error> for MigrationError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrationError::Configuration(err.to_string())
    }
}
