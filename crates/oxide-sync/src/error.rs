//! Error types for schema reconciliation.

/// Errors that can occur while parsing a schema or reconciling a database.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The schema source is structurally invalid.
    ///
    /// Raised before any DDL is issued; aborts the whole run.
    #[error("Malformed schema ({context}): {message}")]
    MalformedSchema {
        /// Where the problem was found (model name, line, document).
        context: String,
        /// What is wrong.
        message: String,
    },

    /// A strict driver has no native type for an abstract field type.
    #[error("Unsupported type '{type_name}' for {backend}")]
    UnsupportedType {
        /// Backend name (e.g. "sqlite").
        backend: &'static str,
        /// The abstract type that could not be mapped.
        type_name: String,
    },

    /// A column's native type would change in a way that can lose data.
    #[error("Cannot safely convert column {table}.{column} from {from} to {to}")]
    UnsafeSchemaChange {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Type currently stored in the database.
        from: String,
        /// Type required by the desired schema.
        to: String,
    },

    /// A rebuild was required on a table at or above the row ceiling.
    #[error("Table '{table}' has {rows} rows; rebuilds are refused at {limit} rows or more")]
    TableTooLargeForRebuild {
        /// Table name.
        table: String,
        /// Rows currently in the table.
        rows: u64,
        /// The ceiling that was hit.
        limit: u64,
    },

    /// The backend rejected a DDL or DML statement.
    #[error("Statement rejected: {source}\n  SQL: {sql}")]
    ConstraintViolation {
        /// The statement that failed.
        sql: String,
        /// The backend error or integrity check report.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Database error outside of a specific statement (connection, pool, protocol).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading schema files, prompting).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection string does not name a supported backend.
    #[error("Unsupported database URL: {0}")]
    UnknownBackend(String),
}

impl SyncError {
    /// Shorthand for [`SyncError::MalformedSchema`].
    pub fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedSchema {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Wraps a failure of `sql`.
    ///
    /// Errors reported by the database itself become
    /// [`SyncError::ConstraintViolation`]; anything else (IO, protocol,
    /// pool) stays a [`SyncError::Database`].
    pub fn statement(sql: &str, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::Database(_) => Self::ConstraintViolation {
                sql: sql.to_string(),
                source: Box::new(source),
            },
            other => Self::Database(other),
        }
    }

    /// A constraint violation detected by an integrity check rather than
    /// reported by a failing statement.
    pub fn violation(sql: &str, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::ConstraintViolation {
            sql: sql.to_string(),
            source: message.into(),
        }
    }

    /// Returns true if this error means the connection itself is unusable,
    /// in which case the whole run must stop.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        )
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_keeps_non_database_errors() {
        let err = SyncError::statement("SELECT 1", sqlx::Error::RowNotFound);
        assert!(matches!(err, SyncError::Database(sqlx::Error::RowNotFound)));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_pool_closed_is_connection_error() {
        assert!(SyncError::Database(sqlx::Error::PoolClosed).is_connection_error());
        assert!(!SyncError::malformed("User", "bad").is_connection_error());
    }

    #[test]
    fn test_violation_carries_sql() {
        let err = SyncError::violation("PRAGMA foreign_key_check(\"Post\")", "1 orphaned row");
        let text = err.to_string();
        assert!(text.contains("1 orphaned row"));
        assert!(text.contains("foreign_key_check"));
    }

    #[test]
    fn test_display_names_table_and_column() {
        let err = SyncError::UnsafeSchemaChange {
            table: "User".into(),
            column: "name".into(),
            from: "TEXT".into(),
            to: "INTEGER".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot safely convert column User.name from TEXT to INTEGER"
        );
    }
}
