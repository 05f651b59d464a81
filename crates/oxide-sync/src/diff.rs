//! Diff and DDL synthesis.
//!
//! Compares one declared [`Table`] against its live [`TableSnapshot`] and
//! plans the operations that bring the database in line. Planning is pure:
//! nothing is executed here, so a fatal divergence (an unsafe type change)
//! is reported before any statement for the table is issued.
//!
//! A table is in one of three states:
//!
//! - **Absent**: planned as a `CREATE TABLE` followed by its indexes.
//! - **Matching**: planned as an empty [`TablePlan::Alter`].
//! - **Divergent**: columns, indexes, primary key and foreign keys are
//!   compared in four passes. Divergences the dialect can fix in place
//!   become operations; the rest become [`RebuildReason`]s, and any rebuild
//!   reason turns the whole plan into a [`TablePlan::Rebuild`].

use std::fmt;

use crate::dialect::{SyncDialect, can_convert};
use crate::error::{Result, SyncError};
use crate::operations::{ColumnDef, ForeignKeyDef, SyncOperation};
use crate::schema::Table;
use crate::snapshot::TableSnapshot;

/// Why a table has to be rebuilt rather than altered in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// A column's type changes safely, but not in place.
    ColumnType {
        /// Column name.
        column: String,
        /// Current native type.
        from: String,
        /// Desired native type.
        to: String,
    },
    /// The primary key columns differ.
    PrimaryKey {
        /// Current key columns.
        from: Vec<String>,
        /// Declared key columns.
        to: Vec<String>,
    },
    /// A declared foreign key is missing.
    ForeignKey {
        /// Constraint name.
        name: String,
    },
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnType { column, from, to } => {
                write!(f, "column {column} changes from {from} to {to}")
            }
            Self::PrimaryKey { from, to } => write!(
                f,
                "primary key changes from ({}) to ({})",
                from.join(", "),
                to.join(", ")
            ),
            Self::ForeignKey { name } => write!(f, "foreign key {name} is missing"),
        }
    }
}

/// The planned change for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TablePlan {
    /// The table does not exist: create it, then its indexes.
    Create(Vec<SyncOperation>),
    /// The table exists; apply these operations in order. Empty when the
    /// table already matches.
    Alter(Vec<SyncOperation>),
    /// The table must be recreated with its current declaration.
    Rebuild {
        /// What forced the rebuild.
        reasons: Vec<RebuildReason>,
        /// The new table definition.
        create: SyncOperation,
        /// Indexes to create on the new table.
        indexes: Vec<SyncOperation>,
        /// Columns present both before and after, whose rows are copied back.
        copy_columns: Vec<String>,
    },
}

impl TablePlan {
    /// Returns true if nothing needs to change.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Alter(ops) if ops.is_empty())
    }
}

/// Maps every column field of `table` to a native column definition.
pub fn desired_columns<D: SyncDialect + ?Sized>(
    dialect: &D,
    table: &Table,
) -> Result<Vec<ColumnDef>> {
    table
        .columns()
        .map(|field| Ok(ColumnDef::new(&field.name, dialect.column_type(field)?)))
        .collect()
}

/// Plans the change that brings `existing` in line with `desired`.
///
/// Fails with [`SyncError::UnsafeSchemaChange`] when a column's type would
/// change outside the safe-conversion table, and with
/// [`SyncError::UnsupportedType`] when a strict dialect cannot map a field.
pub fn plan_table<D: SyncDialect + ?Sized>(
    dialect: &D,
    desired: &Table,
    existing: Option<&TableSnapshot>,
) -> Result<TablePlan> {
    let columns = desired_columns(dialect, desired)?;

    let Some(existing) = existing else {
        let mut operations = vec![SyncOperation::create_table(desired, columns)];
        operations.extend(SyncOperation::create_indexes(desired));
        return Ok(TablePlan::Create(operations));
    };

    let mut operations = Vec::new();
    let mut reasons = Vec::new();

    diff_columns(dialect, desired, existing, &columns, &mut operations, &mut reasons)?;
    diff_indexes(desired, existing, &mut operations);
    diff_primary_key(dialect, desired, existing, &mut operations, &mut reasons);
    diff_foreign_keys(dialect, desired, existing, &mut operations, &mut reasons);

    if reasons.is_empty() {
        return Ok(TablePlan::Alter(operations));
    }

    let copy_columns = columns
        .iter()
        .filter(|c| existing.column(&c.name).is_some())
        .map(|c| c.name.clone())
        .collect();
    Ok(TablePlan::Rebuild {
        reasons,
        create: SyncOperation::create_table(desired, columns),
        indexes: SyncOperation::create_indexes(desired),
        copy_columns,
    })
}

fn diff_columns<D: SyncDialect + ?Sized>(
    dialect: &D,
    desired: &Table,
    existing: &TableSnapshot,
    columns: &[ColumnDef],
    operations: &mut Vec<SyncOperation>,
    reasons: &mut Vec<RebuildReason>,
) -> Result<()> {
    for column in columns {
        let Some(current) = existing.column(&column.name) else {
            operations.push(SyncOperation::add_column(&desired.name, column.clone()));
            continue;
        };

        let current_type = dialect.canonical_type(&current.native_type);
        if current_type.eq_ignore_ascii_case(&column.sql_type) {
            continue;
        }

        if !can_convert(&current_type, &column.sql_type) {
            return Err(SyncError::UnsafeSchemaChange {
                table: desired.name.clone(),
                column: column.name.clone(),
                from: current_type,
                to: column.sql_type.clone(),
            });
        }

        if dialect.supports_alter_column() {
            operations.push(SyncOperation::AlterColumnType {
                table: desired.name.clone(),
                column: column.name.clone(),
                from: current_type,
                to: column.sql_type.clone(),
            });
        } else {
            reasons.push(RebuildReason::ColumnType {
                column: column.name.clone(),
                from: current_type,
                to: column.sql_type.clone(),
            });
        }
    }
    Ok(())
}

fn diff_indexes(desired: &Table, existing: &TableSnapshot, operations: &mut Vec<SyncOperation>) {
    for index in &desired.indexes {
        let name = desired.index_name(index);
        let unique = desired.index_is_unique(index);

        if let Some(current) = existing.index(&name) {
            if current.columns == index.fields && current.unique == unique {
                continue;
            }
            operations.push(SyncOperation::drop_index(&name));
        }
        operations.push(SyncOperation::create_index(
            name,
            &desired.name,
            index.fields.clone(),
            unique,
        ));
    }
}

fn diff_primary_key<D: SyncDialect + ?Sized>(
    dialect: &D,
    desired: &Table,
    existing: &TableSnapshot,
    operations: &mut Vec<SyncOperation>,
    reasons: &mut Vec<RebuildReason>,
) {
    if existing.primary_key == desired.id_fields {
        return;
    }

    if dialect.supports_add_constraint() {
        operations.push(SyncOperation::SetPrimaryKey {
            table: desired.name.clone(),
            columns: desired.id_fields.clone(),
            replaces: existing.primary_key_name.clone(),
        });
    } else {
        reasons.push(RebuildReason::PrimaryKey {
            from: existing.primary_key.clone(),
            to: desired.id_fields.clone(),
        });
    }
}

fn diff_foreign_keys<D: SyncDialect + ?Sized>(
    dialect: &D,
    desired: &Table,
    existing: &TableSnapshot,
    operations: &mut Vec<SyncOperation>,
    reasons: &mut Vec<RebuildReason>,
) {
    for relation in desired.foreign_keys() {
        if existing.has_foreign_key(relation) {
            continue;
        }

        let foreign_key = ForeignKeyDef::from_relation(desired, relation);
        if dialect.supports_add_constraint() {
            operations.push(SyncOperation::AddForeignKey {
                table: desired.name.clone(),
                foreign_key,
            });
        } else {
            reasons.push(RebuildReason::ForeignKey {
                name: foreign_key.name,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::schema::{Field, Index, Relation, UniqueConstraint};
    use crate::snapshot::{ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot};

    fn user_table() -> Table {
        let mut table = Table::new("User");
        table.fields.push(Field::new("id", "Int"));
        table.fields.push(Field::new("name", "String"));
        table.fields.push(Field::new("email", "String"));
        table.id_fields = vec!["id".into()];
        table.unique_constraints.push(UniqueConstraint {
            fields: vec!["email".into()],
        });
        table.indexes.push(Index {
            fields: vec!["email".into()],
        });
        table
    }

    fn column(name: &str, native_type: &str, primary_key: bool) -> ColumnSnapshot {
        ColumnSnapshot {
            name: name.into(),
            native_type: native_type.into(),
            not_null: false,
            default: None,
            primary_key,
        }
    }

    fn user_snapshot() -> TableSnapshot {
        TableSnapshot {
            name: "User".into(),
            columns: vec![
                column("id", "INTEGER", true),
                column("name", "TEXT", false),
                column("email", "TEXT", false),
            ],
            indexes: vec![IndexSnapshot {
                name: "idx_User_email".into(),
                columns: vec!["email".into()],
                unique: true,
            }],
            foreign_keys: vec![],
            primary_key: vec!["id".into()],
            primary_key_name: None,
        }
    }

    fn post_table() -> Table {
        let mut table = Table::new("Post");
        table.fields.push(Field::new("id", "Int"));
        table.fields.push(Field::new("authorId", "Int"));
        let mut author = Field::new("author", "User");
        author.is_relation = true;
        author.relation = Some(Relation {
            field: "author".into(),
            referenced_table: "User".into(),
            fields: vec!["authorId".into()],
            references: vec!["id".into()],
            on_delete: None,
            on_update: None,
        });
        table.fields.push(author);
        table.id_fields = vec!["id".into()];
        table
    }

    fn post_snapshot() -> TableSnapshot {
        TableSnapshot {
            name: "Post".into(),
            columns: vec![
                column("id", "INTEGER", true),
                column("authorId", "INTEGER", false),
            ],
            primary_key: vec!["id".into()],
            ..TableSnapshot::default()
        }
    }

    #[test]
    fn test_absent_table_is_created_with_indexes() {
        let plan = plan_table(&SqliteDialect::new(), &user_table(), None).unwrap();
        let TablePlan::Create(ops) = plan else {
            panic!("Expected Create, got {plan:?}");
        };
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], SyncOperation::CreateTable { name, .. } if name == "User"));
        assert_eq!(
            ops[1],
            SyncOperation::create_index("idx_User_email", "User", vec!["email".into()], true)
        );
    }

    #[test]
    fn test_matching_table_is_unchanged() {
        let plan =
            plan_table(&SqliteDialect::new(), &user_table(), Some(&user_snapshot())).unwrap();
        assert!(plan.is_unchanged(), "{plan:?}");
    }

    #[test]
    fn test_new_optional_column_is_added() {
        let mut table = user_table();
        let mut age = Field::new("age", "Int");
        age.is_optional = true;
        table.fields.push(age);

        let plan = plan_table(&SqliteDialect::new(), &table, Some(&user_snapshot())).unwrap();
        assert_eq!(
            plan,
            TablePlan::Alter(vec![SyncOperation::add_column(
                "User",
                ColumnDef::new("age", "INTEGER")
            )])
        );
    }

    #[test]
    fn test_unsafe_type_change_fails() {
        let mut table = user_table();
        table.fields[1] = Field::new("name", "Int");

        let err = plan_table(&SqliteDialect::new(), &table, Some(&user_snapshot())).unwrap_err();
        assert!(matches!(
            err,
            SyncError::UnsafeSchemaChange { ref column, ref from, ref to, .. }
                if column == "name" && from == "TEXT" && to == "INTEGER"
        ));
    }

    #[test]
    fn test_safe_type_change_in_place_on_postgres() {
        let mut table = user_table();
        table.fields[0] = Field::new("id", "BigInt");

        let plan =
            plan_table(&PostgresDialect::new(), &table, Some(&user_snapshot())).unwrap();
        assert_eq!(
            plan,
            TablePlan::Alter(vec![SyncOperation::AlterColumnType {
                table: "User".into(),
                column: "id".into(),
                from: "INTEGER".into(),
                to: "BIGINT".into(),
            }])
        );
    }

    #[test]
    fn test_changed_index_is_recreated() {
        let mut snapshot = user_snapshot();
        snapshot.indexes[0].unique = false;

        let plan = plan_table(&SqliteDialect::new(), &user_table(), Some(&snapshot)).unwrap();
        assert_eq!(
            plan,
            TablePlan::Alter(vec![
                SyncOperation::drop_index("idx_User_email"),
                SyncOperation::create_index("idx_User_email", "User", vec!["email".into()], true),
            ])
        );
    }

    #[test]
    fn test_missing_primary_key_rebuilds_on_sqlite() {
        let mut snapshot = user_snapshot();
        snapshot.primary_key.clear();
        snapshot.columns[0].primary_key = false;

        let plan = plan_table(&SqliteDialect::new(), &user_table(), Some(&snapshot)).unwrap();
        let TablePlan::Rebuild {
            reasons,
            indexes,
            copy_columns,
            ..
        } = plan
        else {
            panic!("Expected Rebuild, got {plan:?}");
        };
        assert_eq!(
            reasons,
            vec![RebuildReason::PrimaryKey {
                from: vec![],
                to: vec!["id".into()],
            }]
        );
        assert_eq!(indexes.len(), 1);
        assert_eq!(copy_columns, vec!["id", "name", "email"]);
    }

    #[test]
    fn test_missing_primary_key_is_added_on_postgres() {
        let mut snapshot = user_snapshot();
        snapshot.primary_key.clear();

        let plan =
            plan_table(&PostgresDialect::new(), &user_table(), Some(&snapshot)).unwrap();
        assert_eq!(
            plan,
            TablePlan::Alter(vec![SyncOperation::SetPrimaryKey {
                table: "User".into(),
                columns: vec!["id".into()],
                replaces: None,
            }])
        );
    }

    #[test]
    fn test_missing_foreign_key_rebuilds_on_sqlite() {
        let plan =
            plan_table(&SqliteDialect::new(), &post_table(), Some(&post_snapshot())).unwrap();
        assert!(matches!(
            plan,
            TablePlan::Rebuild { ref reasons, .. }
                if reasons == &vec![RebuildReason::ForeignKey { name: "fk_Post_author".into() }]
        ));
    }

    #[test]
    fn test_existing_foreign_key_matches_exactly() {
        let mut snapshot = post_snapshot();
        snapshot.foreign_keys.push(ForeignKeySnapshot {
            name: None,
            columns: vec!["authorId".into()],
            references_table: "User".into(),
            references_columns: vec!["id".into()],
        });
        let plan = plan_table(&SqliteDialect::new(), &post_table(), Some(&snapshot)).unwrap();
        assert!(plan.is_unchanged(), "{plan:?}");
    }

    #[test]
    fn test_rebuild_folds_column_changes() {
        let mut table = post_table();
        table.fields.push(Field::new("title", "String"));

        let plan = plan_table(&SqliteDialect::new(), &table, Some(&post_snapshot())).unwrap();
        let TablePlan::Rebuild {
            create,
            copy_columns,
            ..
        } = plan
        else {
            panic!("Expected Rebuild, got {plan:?}");
        };
        let SyncOperation::CreateTable { columns, .. } = create else {
            panic!("Expected CreateTable");
        };
        assert!(columns.iter().any(|c| c.name == "title"));
        assert_eq!(copy_columns, vec!["id", "authorId"]);
    }

    #[test]
    fn test_unsupported_type_on_strict_dialect() {
        let mut table = user_table();
        table.fields.push(Field::new("shape", "Geometry"));
        let err = plan_table(&SqliteDialect::new(), &table, None).unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedType { .. }));

        assert!(plan_table(&PostgresDialect::new(), &table, None).is_ok());
    }
}
