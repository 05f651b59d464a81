//! SQLite dialect.
//!
//! SQLite cannot change a column's type or add key constraints to an existing
//! table. Those operations render as comments here and are carried out by the
//! [rebuild executor](crate::rebuild) instead.

use crate::error::{Result, SyncError};
use crate::operations::SyncOperation;

use super::SyncDialect;

/// SQLite sync dialect. Unknown abstract types are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SyncDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn map_data_type(&self, abstract_type: &str) -> Result<String> {
        let native = match abstract_type.trim().to_lowercase().as_str() {
            "string" | "text" => "TEXT",
            "int" | "integer" | "bigint" => "INTEGER",
            "boolean" | "bool" => "INTEGER",
            "datetime" => "DATETIME",
            "float" | "real" => "REAL",
            "decimal" | "numeric" => "NUMERIC",
            "json" => "TEXT",
            "bytes" | "blob" => "BLOB",
            _ => {
                return Err(SyncError::UnsupportedType {
                    backend: self.name(),
                    type_name: abstract_type.to_string(),
                });
            }
        };
        Ok(native.to_string())
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
                vec![self.drop_table_sql(name, *if_exists)]
            }

            SyncOperation::AddColumn { table, column } => {
                vec![self.add_column_sql(table, column)]
            }

            SyncOperation::AlterColumnType { table, column, .. } => vec![format!(
                "-- ALTER COLUMN not supported in SQLite. \
                 Table recreation required for: {}.{}",
                table, column
            )],

            SyncOperation::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => vec![self.create_index_sql(name, table, columns, *unique)],

            SyncOperation::DropIndex { name, if_exists } => {
                vec![self.drop_index_sql(name, *if_exists)]
            }

            SyncOperation::SetPrimaryKey { table, .. } => vec![format!(
                "-- Primary key of {} cannot be changed in SQLite. \
                 Table recreation required.",
                table
            )],

            SyncOperation::AddForeignKey { foreign_key, .. } => vec![format!(
                "-- Foreign key {} cannot be added after table creation in SQLite. \
                 Table recreation required.",
                foreign_key.name
            )],
        }
    }

    fn supports_alter_column(&self) -> bool {
        false
    }

    fn supports_add_constraint(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{ColumnDef, ForeignKeyDef};
    use crate::schema::{Field, ReferentialAction};

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_create_table_with_keys() {
        let op = SyncOperation::CreateTable {
            name: "Post".to_string(),
            columns: vec![
                ColumnDef::new("id", "INTEGER"),
                ColumnDef::new("authorId", "INTEGER"),
            ],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![ForeignKeyDef {
                name: "fk_Post_author".to_string(),
                columns: vec!["authorId".to_string()],
                references_table: "User".to_string(),
                references_columns: vec!["id".to_string()],
                on_delete: Some(ReferentialAction::Cascade),
                on_update: None,
            }],
            if_not_exists: true,
        };

        let sql = dialect().generate_sql(&op);
        assert_eq!(sql.len(), 1);
        assert_eq!(
            sql[0],
            "CREATE TABLE IF NOT EXISTS \"Post\" (\n  \
             \"id\" INTEGER,\n  \
             \"authorId\" INTEGER,\n  \
             PRIMARY KEY (\"id\"),\n  \
             CONSTRAINT \"fk_Post_author\" FOREIGN KEY (\"authorId\") \
             REFERENCES \"User\" (\"id\") ON DELETE CASCADE\n)"
        );
    }

    #[test]
    fn test_add_column() {
        let op = SyncOperation::add_column("User", ColumnDef::new("age", "INTEGER"));
        let sql = dialect().generate_sql(&op);
        assert_eq!(sql, vec!["ALTER TABLE \"User\" ADD COLUMN \"age\" INTEGER"]);
    }

    #[test]
    fn test_create_unique_index() {
        let op =
            SyncOperation::create_index("idx_User_email", "User", vec!["email".to_string()], true);
        let sql = dialect().generate_sql(&op);
        assert_eq!(
            sql[0],
            "CREATE UNIQUE INDEX \"idx_User_email\" ON \"User\" (\"email\")"
        );
    }

    #[test]
    fn test_drop_table_and_index() {
        let d = dialect();
        assert_eq!(
            d.generate_sql(&SyncOperation::drop_table("User"))[0],
            "DROP TABLE IF EXISTS \"User\""
        );
        assert_eq!(
            d.generate_sql(&SyncOperation::drop_index("idx_User_email"))[0],
            "DROP INDEX IF EXISTS \"idx_User_email\""
        );
    }

    #[test]
    fn test_unsupported_operations_render_as_comments() {
        let op = SyncOperation::AlterColumnType {
            table: "User".to_string(),
            column: "age".to_string(),
            from: "INTEGER".to_string(),
            to: "BIGINT".to_string(),
        };
        let sql = dialect().generate_sql(&op);
        assert!(sql[0].starts_with("--"));

        let op = SyncOperation::SetPrimaryKey {
            table: "User".to_string(),
            columns: vec!["id".to_string()],
            replaces: None,
        };
        assert!(dialect().generate_sql(&op)[0].starts_with("--"));
    }

    #[test]
    fn test_type_mapping() {
        let d = dialect();
        assert_eq!(d.map_data_type("String").unwrap(), "TEXT");
        assert_eq!(d.map_data_type("Int").unwrap(), "INTEGER");
        assert_eq!(d.map_data_type("BigInt").unwrap(), "INTEGER");
        assert_eq!(d.map_data_type("Boolean").unwrap(), "INTEGER");
        assert_eq!(d.map_data_type("DateTime").unwrap(), "DATETIME");
        assert_eq!(d.map_data_type("Float").unwrap(), "REAL");
        assert_eq!(d.map_data_type("Decimal").unwrap(), "NUMERIC");
        assert_eq!(d.map_data_type("Bytes").unwrap(), "BLOB");
        assert_eq!(d.map_data_type("datetime").unwrap(), "DATETIME");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = dialect().map_data_type("Geometry").unwrap_err();
        assert!(matches!(
            err,
            SyncError::UnsupportedType { backend: "sqlite", ref type_name } if type_name == "Geometry"
        ));
    }

    #[test]
    fn test_enums_and_lists_are_text() {
        let d = dialect();
        let mut role = Field::new("role", "Role");
        role.is_enum = true;
        assert_eq!(d.column_type(&role).unwrap(), "TEXT");

        let mut tags = Field::new("tags", "String");
        tags.is_array = true;
        assert_eq!(d.column_type(&tags).unwrap(), "TEXT");
    }
}
