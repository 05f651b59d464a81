//! Declarative schema reconciliation for SQLite and PostgreSQL.
//!
//! `oxide-sync` reads a declarative schema description and brings a live
//! database in line with it. There is no migration history: each run compares
//! the declaration against the database catalog and applies the difference.
//!
//! - Missing tables, columns, indexes and constraints are created.
//! - Column types change only along a fixed table of safe conversions; any
//!   other change is refused for that table.
//! - Changes the backend cannot make in place (a new primary key or foreign
//!   key on SQLite) rebuild the table in one transaction, behind a row-count
//!   ceiling and an operator confirmation.
//!
//! # Architecture
//!
//! - **Parser** - text or JSON schema to a normalized [`SchemaModel`](schema::SchemaModel)
//! - **Driver** - catalog introspection and statement execution per backend
//! - **Dialect** - type mapping and SQL rendering per backend
//! - **Diff** - plans the operations for one table
//! - **Gate** - row ceiling and confirmation before destructive operations
//! - **Rebuild** - copy aside, drop, recreate, copy back
//! - **Sync** - the reconciliation pass over every table
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_sync::prelude::*;
//!
//! let model = parser::parse(
//!     "model User {\n  id Int @id\n  email String @unique\n}",
//! )?;
//! let driver = SqliteDriver::connect("sqlite:app.db").await?;
//! let mut reconciler = Reconciler::new(driver, SafetyGate::new(StdinPrompt));
//! let report = reconciler.run(&model).await?;
//! for sql in report.statements() {
//!     println!("{sql};");
//! }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Reconcile the database with a schema file
//! oxide-sync --schema schema.prisma push
//!
//! # Show what would run
//! oxide-sync --schema schema.prisma push --dry-run
//!
//! # Drop and recreate every table without prompting
//! oxide-sync --schema schema.prisma push --force-reset --yes
//!
//! # Write the JSON documents
//! oxide-sync --schema schema.prisma dump --out-dir prisma
//! ```

pub mod dialect;
pub mod diff;
pub mod driver;
pub mod error;
pub mod gate;
pub mod operations;
pub mod parser;
pub mod rebuild;
pub mod schema;
pub mod snapshot;
pub mod sync;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{PostgresDialect, SqliteDialect, SyncDialect, can_convert};
    pub use crate::diff::{RebuildReason, TablePlan, plan_table};
    pub use crate::driver::{Backend, Driver, PostgresDriver, SqliteDriver};
    pub use crate::error::{Result, SyncError};
    pub use crate::gate::{Answer, Prompt, REBUILD_ROW_LIMIT, SafetyGate, StdinPrompt};
    pub use crate::operations::{ColumnDef, ForeignKeyDef, SyncOperation};
    pub use crate::parser;
    pub use crate::schema::{
        Enum, Field, Index, ReferentialAction, Relation, SchemaModel, Table, UniqueConstraint,
    };
    pub use crate::snapshot::{
        ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, SchemaSnapshot, TableSnapshot,
    };
    pub use crate::sync::{Reconciler, SyncOptions, SyncReport, TableOutcome};
}
