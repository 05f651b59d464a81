//! PostgreSQL dialect.

use crate::error::Result;
use crate::operations::SyncOperation;

use super::SyncDialect;

/// PostgreSQL sync dialect. Unknown abstract types fall back to `TEXT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SyncDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn map_data_type(&self, abstract_type: &str) -> Result<String> {
        let native = match abstract_type.trim().to_lowercase().as_str() {
            "int" | "integer" => "INTEGER",
            "bigint" => "BIGINT",
            "string" | "text" => "TEXT",
            "boolean" | "bool" => "BOOLEAN",
            "datetime" => "TIMESTAMP",
            "float" | "real" => "REAL",
            "decimal" | "numeric" => "NUMERIC",
            "json" => "JSONB",
            "bytes" => "BYTEA",
            _ => self.text_type(),
        };
        Ok(native.to_string())
    }

    /// Maps `information_schema.columns.data_type` spellings onto the names
    /// [`map_data_type`](SyncDialect::map_data_type) produces.
    fn canonical_type(&self, native_type: &str) -> String {
        let lowered = native_type.trim().to_lowercase();
        let canonical = match lowered.as_str() {
            "integer" | "int" | "int4" => "INTEGER",
            "bigint" | "int8" => "BIGINT",
            "smallint" | "int2" => "SMALLINT",
            "text" => "TEXT",
            "character varying" | "varchar" => "VARCHAR",
            "character" | "char" | "bpchar" => "CHAR",
            "boolean" | "bool" => "BOOLEAN",
            "timestamp without time zone" | "timestamp" => "TIMESTAMP",
            "timestamp with time zone" | "timestamptz" => "TIMESTAMPTZ",
            "real" | "float4" => "REAL",
            "double precision" | "float8" => "DOUBLE PRECISION",
            "numeric" => "NUMERIC",
            "decimal" => "DECIMAL",
            "jsonb" => "JSONB",
            "json" => "JSON",
            "bytea" => "BYTEA",
            "date" => "DATE",
            _ => return lowered.to_uppercase(),
        };
        canonical.to_string()
    }

    fn generate_sql(&self, operation: &SyncOperation) -> Vec<String> {
        match operation {
            SyncOperation::CreateTable {
                name,
                columns,
                primary_key,
                foreign_keys,
                if_not_exists,
            } => vec![self.create_table_sql(
                name,
                columns,
                primary_key,
                foreign_keys,
                *if_not_exists,
            )],

            SyncOperation::DropTable { name, if_exists } => {
                vec![format!("{} CASCADE", self.drop_table_sql(name, *if_exists))]
            }

            SyncOperation::AddColumn { table, column } => {
                vec![self.add_column_sql(table, column)]
            }

            SyncOperation::AlterColumnType {
                table, column, to, ..
            } => {
                let column = self.quote_identifier(column);
                vec![format!(
                    "ALTER TABLE {} ALTER COLUMN {column} TYPE {to} USING {column}::{to}",
                    self.quote_identifier(table)
                )]
            }

            SyncOperation::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => vec![self.create_index_sql(name, table, columns, *unique)],

            SyncOperation::DropIndex { name, if_exists } => {
                vec![self.drop_index_sql(name, *if_exists)]
            }

            SyncOperation::SetPrimaryKey {
                table,
                columns,
                replaces,
            } => {
                let table = self.quote_identifier(table);
                let mut sql = Vec::new();
                if let Some(existing) = replaces {
                    sql.push(format!(
                        "ALTER TABLE {table} DROP CONSTRAINT {}",
                        self.quote_identifier(existing)
                    ));
                }
                if !columns.is_empty() {
                    sql.push(format!(
                        "ALTER TABLE {table} ADD PRIMARY KEY ({})",
                        self.column_list(columns)
                    ));
                }
                sql
            }

            SyncOperation::AddForeignKey { table, foreign_key } => vec![format!(
                "ALTER TABLE {} ADD {}",
                self.quote_identifier(table),
                self.foreign_key_clause(foreign_key)
            )],
        }
    }

    fn supports_alter_column(&self) -> bool {
        true
    }

    fn supports_add_constraint(&self) -> bool {
        true
    }
}
