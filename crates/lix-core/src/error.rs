//! Error types for the lix engine.

use thiserror::Error;

/// Result type alias using LixError.
pub type Result<T> = std::result::Result<T, LixError>;

/// Errors that can occur in the lix engine.
#[derive(Error, Debug)]
pub enum LixError {
    /// A different definition is already stored under the same key and version.
    #[error("Schema conflict: {key}@{version} is already stored with a different definition; bump x-lix-version")]
    SchemaConflict { key: String, version: String },

    /// Schema not registered.
    #[error("Schema not found: {key}@{version}")]
    SchemaNotFound { key: String, version: String },

    /// Snapshot content does not match its schema.
    #[error("Schema validation failed for {key}: {message}")]
    SchemaValidation { key: String, message: String },

    /// A write references an entity that does not exist.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A query called a function the engine does not provide.
    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    /// A query referenced a view or table that does not exist.
    #[error("Unknown view: {name}")]
    UnknownView { name: String },

    /// A mutation targeted a view that cannot be written.
    #[error("View is read-only: {name}")]
    ReadOnlyView { name: String },

    /// Version not found.
    #[error("Version not found: {id}")]
    VersionNotFound { id: String },

    /// Version name already taken.
    #[error("Version already exists: {name}")]
    VersionExists { name: String },

    /// Version cannot be removed while something depends on it.
    #[error("Version {id} is in use: {reason}")]
    VersionInUse { id: String, reason: String },

    /// Commit not found.
    #[error("Commit not found: {id}")]
    CommitNotFound { id: String },

    /// Change not found.
    #[error("Change not found: {id}")]
    ChangeNotFound { id: String },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// No plugin handles the given path.
    #[error("No plugin matches {path}")]
    NoPlugin { path: String },

    /// A plugin failed to detect or apply changes.
    #[error("Plugin {key} failed: {message}")]
    Plugin { key: String, message: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// A failure raised while rewriting or executing a logical query.
    ///
    /// Carries the SQL of each preprocessing stage that was reached.
    /// `error_code` and `root` report the wrapped error so its identity is
    /// preserved.
    #[error("{source}\n  original: {original_sql}{}", stage_lines(.rewritten_sql, .expanded_sql))]
    Query {
        source: Box<LixError>,
        original_sql: String,
        rewritten_sql: Option<String>,
        expanded_sql: Option<String>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Display lines for the preprocessing stages a failed query got through.
fn stage_lines(rewritten_sql: &Option<String>, expanded_sql: &Option<String>) -> String {
    let mut lines = String::new();
    if let Some(sql) = rewritten_sql {
        lines.push_str("\n  rewritten: ");
        lines.push_str(sql);
    }
    if let Some(sql) = expanded_sql {
        lines.push_str("\n  expanded: ");
        lines.push_str(sql);
    }
    lines
}

impl LixError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a foreign key violation.
    pub fn foreign_key(message: impl Into<String>) -> Self {
        Self::ForeignKeyViolation {
            message: message.into(),
        }
    }

    /// Create a plugin error.
    pub fn plugin(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach preprocessing context to an error.
    ///
    /// Errors that already carry context are returned unchanged so the
    /// innermost (most precise) SQL is kept.
    pub fn with_query_context(
        self,
        original_sql: impl Into<String>,
        rewritten_sql: Option<String>,
        expanded_sql: Option<String>,
    ) -> Self {
        match self {
            Self::Query { .. } => self,
            other => Self::Query {
                source: Box::new(other),
                original_sql: original_sql.into(),
                rewritten_sql,
                expanded_sql,
            },
        }
    }

    /// The error with any context wrappers removed.
    pub fn root(&self) -> &LixError {
        match self {
            Self::Query { source, .. } => source.root(),
            other => other,
        }
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SchemaConflict { .. } => "SCHEMA_CONFLICT",
            Self::SchemaNotFound { .. } => "SCHEMA_NOT_FOUND",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION",
            Self::ForeignKeyViolation { .. } => "FOREIGN_KEY_VIOLATION",
            Self::UnknownFunction { .. } => "UNKNOWN_FUNCTION",
            Self::UnknownView { .. } => "UNKNOWN_VIEW",
            Self::ReadOnlyView { .. } => "READ_ONLY_VIEW",
            Self::VersionNotFound { .. } => "VERSION_NOT_FOUND",
            Self::VersionExists { .. } => "VERSION_EXISTS",
            Self::VersionInUse { .. } => "VERSION_IN_USE",
            Self::CommitNotFound { .. } => "COMMIT_NOT_FOUND",
            Self::ChangeNotFound { .. } => "CHANGE_NOT_FOUND",
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::NoPlugin { .. } => "NO_PLUGIN",
            Self::Plugin { .. } => "PLUGIN_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Query { source, .. } => source.error_code(),
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LixError::SchemaConflict {
            key: "todo".to_string(),
            version: "1.0".to_string(),
        };
        assert!(err.to_string().contains("todo@1.0"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LixError::UnknownFunction {
                name: "nope".to_string()
            }
            .error_code(),
            "UNKNOWN_FUNCTION"
        );
        assert_eq!(LixError::database("test").error_code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_query_context_keeps_identity() {
        let err = LixError::foreign_key("missing file").with_query_context(
            "INSERT INTO state ...",
            Some("upsert ...".to_string()),
            Some("SELECT ...".to_string()),
        );
        assert_eq!(err.error_code(), "FOREIGN_KEY_VIOLATION");
        assert!(matches!(err.root(), LixError::ForeignKeyViolation { .. }));
        assert!(err.to_string().contains("INSERT INTO state"));
        assert!(err.to_string().contains("expanded: SELECT ..."));

        // Wrapping twice keeps the first context.
        let twice = err.with_query_context("outer", Some("outer".to_string()), None);
        assert!(!twice.to_string().contains("outer"));
    }

    #[test]
    fn test_query_context_lists_only_reached_stages() {
        let err = LixError::invalid_argument("bad").with_query_context("SELECT 1", None, None);
        let text = err.to_string();
        assert!(text.ends_with("original: SELECT 1"));
        assert!(!text.contains("rewritten:"));
        assert!(!text.contains("expanded:"));

        let err = LixError::invalid_argument("bad").with_query_context("SELECT 1", Some("SELECT 2".to_string()), None);
        assert!(err.to_string().ends_with("rewritten: SELECT 2"));
    }
}
