//! Database dialect implementations.
//!
//! Each dialect maps abstract field types to native column types and renders
//! [`SyncOperation`]s as SQL for its backend. Statements a backend cannot
//! express are rendered as `--` comments; executors skip them.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::Result;
use crate::operations::{ColumnDef, ForeignKeyDef, SyncOperation};
use crate::schema::Field;

/// Native type changes that never lose data, as `(from, to)` pairs.
///
/// The table is directional: a reversed pair is only safe if listed.
pub const SAFE_CONVERSIONS: &[(&str, &str)] = &[
    ("TEXT", "VARCHAR"),
    ("VARCHAR", "TEXT"),
    ("INTEGER", "BIGINT"),
    ("SMALLINT", "INTEGER"),
    ("NUMERIC", "DECIMAL"),
    ("DATETIME", "TIMESTAMP"),
    ("TIMESTAMP", "TIMESTAMPTZ"),
];

/// Returns true if a column can change from `from` to `to` in place.
///
/// Both names are compared case-insensitively.
#[must_use]
pub fn can_convert(from: &str, to: &str) -> bool {
    let from = from.trim().to_uppercase();
    let to = to.trim().to_uppercase();
    SAFE_CONVERSIONS
        .iter()
        .any(|(safe_from, safe_to)| *safe_from == from && *safe_to == to)
}

/// Trait for backend-specific type mapping and SQL generation.
pub trait SyncDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Maps an abstract scalar type (`Int`, `String`, ...) to a native type.
    ///
    /// Strict dialects fail with `UnsupportedType` on unknown input; lenient
    /// ones fall back to their text type.
    fn map_data_type(&self, abstract_type: &str) -> Result<String>;

    /// The backend's catch-all text type.
    fn text_type(&self) -> &'static str {
        "TEXT"
    }

    /// Native type for a column field. Enums and scalar lists are stored as text.
    fn column_type(&self, field: &Field) -> Result<String> {
        if field.is_enum || field.is_array {
            Ok(self.text_type().to_string())
        } else {
            self.map_data_type(&field.field_type)
        }
    }

    /// Normalizes a catalog type name so it compares equal to mapped types.
    fn canonical_type(&self, native_type: &str) -> String {
        native_type.trim().to_uppercase()
    }

    /// Generates SQL for a sync operation.
    fn generate_sql(&self, operation: &SyncOperation) -> Vec<String>;

    /// Returns whether this dialect can change a column's type in place.
    fn supports_alter_column(&self) -> bool;

    /// Returns whether this dialect can add key constraints to an existing table.
    fn supports_add_constraint(&self) -> bool;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes and joins a column list.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnDef) -> String {
        format!("{} {}", self.quote_identifier(&column.name), column.sql_type)
    }

    /// Generates a `CONSTRAINT .. FOREIGN KEY ..` clause.
    fn foreign_key_clause(&self, foreign_key: &ForeignKeyDef) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&foreign_key.name),
            self.column_list(&foreign_key.columns),
            self.quote_identifier(&foreign_key.references_table),
            self.column_list(&foreign_key.references_columns),
        );
        if let Some(action) = foreign_key.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.to_sql());
        }
        if let Some(action) = foreign_key.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.to_sql());
        }
        sql
    }

    /// Generates SQL for creating a table.
    fn create_table_sql(
        &self,
        name: &str,
        columns: &[ColumnDef],
        primary_key: &[String],
        foreign_keys: &[ForeignKeyDef],
        if_not_exists: bool,
    ) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql.push_str(" (\n  ");

        let mut parts: Vec<String> = columns.iter().map(|c| self.column_definition(c)).collect();
        if !primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", self.column_list(primary_key)));
        }
        parts.extend(foreign_keys.iter().map(|fk| self.foreign_key_clause(fk)));

        sql.push_str(&parts.join(",\n  "));
        sql.push_str("\n)");
        sql
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP TABLE ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql
    }

    /// Generates SQL for adding a column.
    fn add_column_sql(&self, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        )
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(
        &self,
        name: &str,
        table: &str,
        columns: &[String],
        unique: bool,
    ) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote_identifier(name),
            self.quote_identifier(table),
            self.column_list(columns)
        )
    }

    /// Generates SQL for dropping an index.
    fn drop_index_sql(&self, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP INDEX ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql
    }
}
