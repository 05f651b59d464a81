//! Database drivers.
//!
//! A driver owns one connection for the duration of a reconciliation pass.
//! It reads the live catalog into a [`SchemaSnapshot`], executes statements,
//! and runs rebuild batches atomically. The [diff engine](crate::diff) only
//! talks to drivers through this trait, so another backend plugs in by
//! implementing it.

mod postgres;
mod sqlite;

pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use crate::dialect::SyncDialect;
use crate::error::{Result, SyncError};
use crate::gate::SafetyGate;
use crate::schema::Table;
use crate::snapshot::{SchemaSnapshot, TableSnapshot};
use crate::sync::{self, TableOutcome};

/// Capabilities a backend provides to the reconciler.
#[allow(async_fn_in_trait)]
pub trait Driver {
    /// The SQL dialect of this backend.
    type Dialect: SyncDialect;

    /// Returns the dialect.
    fn dialect(&self) -> &Self::Dialect;

    /// Maps an abstract type to this backend's native type.
    fn map_data_type(&self, abstract_type: &str) -> Result<String> {
        self.dialect().map_data_type(abstract_type)
    }

    /// Reads every user table. An empty database yields an empty snapshot.
    async fn existing_schema(&mut self) -> Result<SchemaSnapshot>;

    /// Reads a single table, or `None` if it does not exist.
    async fn existing_table(&mut self, name: &str) -> Result<Option<TableSnapshot>>;

    /// Executes one statement.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Counts the rows of a table.
    async fn row_count(&mut self, table: &str) -> Result<u64>;

    /// Returns a statement that creates `temp_name` with the current
    /// definition of `table`.
    async fn previous_definition(&mut self, table: &str, temp_name: &str) -> Result<String>;

    /// Executes a rebuild of `table` as a single transaction with
    /// referential-integrity checks suspended. Any failure rolls the whole
    /// batch back.
    async fn execute_rebuild(&mut self, table: &str, statements: &[String]) -> Result<()>;

    /// Brings one table in line with its declaration.
    async fn create_or_update_table(
        &mut self,
        table: &Table,
        gate: &mut SafetyGate,
    ) -> Result<TableOutcome>
    where
        Self: Sized,
    {
        let existing = self.existing_table(&table.name).await?;
        sync::reconcile_table(self, table, existing.as_ref(), gate, false).await
    }
}

/// Backend selected by a connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// SQLite, from `sqlite:` URLs or bare file paths.
    Sqlite,
    /// PostgreSQL, from `postgres://` or `postgresql://` URLs.
    Postgres,
}

impl Backend {
    /// Selects the backend for a connection string.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("sqlite:") || is_bare_path(url) {
            Ok(Self::Sqlite)
        } else {
            Err(SyncError::UnknownBackend(url.to_string()))
        }
    }
}

fn is_bare_path(url: &str) -> bool {
    !url.is_empty() && !url.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            Backend::from_url("sqlite::memory:").unwrap(),
            Backend::Sqlite
        );
        assert_eq!(
            Backend::from_url("sqlite://data/app.db").unwrap(),
            Backend::Sqlite
        );
        assert_eq!(Backend::from_url("./app.db").unwrap(), Backend::Sqlite);
        assert_eq!(
            Backend::from_url("postgres://localhost/app").unwrap(),
            Backend::Postgres
        );
        assert_eq!(
            Backend::from_url("postgresql://localhost/app").unwrap(),
            Backend::Postgres
        );
    }

    #[test]
    fn test_unknown_backend() {
        assert!(matches!(
            Backend::from_url("mysql://localhost/app"),
            Err(SyncError::UnknownBackend(_))
        ));
        assert!(matches!(
            Backend::from_url(""),
            Err(SyncError::UnknownBackend(_))
        ));
    }
}
