//! Structural operations.
//!
//! The [diff engine](crate::diff) emits these; a
//! [dialect](crate::dialect::SyncDialect) renders them to SQL.

use crate::schema::{ReferentialAction, Relation, Table};

/// A column definition with its native type already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Native type.
    pub sql_type: String,
}

impl ColumnDef {
    /// Creates a new column definition.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// A foreign key definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    /// Constraint name.
    pub name: String,
    /// Local columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub references_table: String,
    /// Referenced columns.
    pub references_columns: Vec<String>,
    /// ON DELETE action; `None` renders no clause.
    pub on_delete: Option<ReferentialAction>,
    /// ON UPDATE action; `None` renders no clause.
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKeyDef {
    /// Builds the foreign key owned by `relation` on `table`.
    #[must_use]
    pub fn from_relation(table: &Table, relation: &Relation) -> Self {
        Self {
            name: table.foreign_key_name(relation),
            columns: relation.fields.clone(),
            references_table: relation.referenced_table.clone(),
            references_columns: relation.references.clone(),
            on_delete: relation.on_delete,
            on_update: relation.on_update,
        }
    }
}

/// A single structural change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOperation {
    /// Create a table with its primary key and foreign keys inline.
    CreateTable {
        /// Table name.
        name: String,
        /// Column definitions.
        columns: Vec<ColumnDef>,
        /// Primary key column(s).
        primary_key: Vec<String>,
        /// Foreign key definitions.
        foreign_keys: Vec<ForeignKeyDef>,
        /// Whether to use IF NOT EXISTS.
        if_not_exists: bool,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        name: String,
        /// Whether to use IF EXISTS.
        if_exists: bool,
    },

    /// Add a column to a table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnDef,
    },

    /// Change a column's type in place. Only emitted for safe conversions.
    AlterColumnType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Current native type.
        from: String,
        /// New native type.
        to: String,
    },

    /// Create an index.
    CreateIndex {
        /// Index name.
        name: String,
        /// Table name.
        table: String,
        /// Columns to index.
        columns: Vec<String>,
        /// Whether this is a unique index.
        unique: bool,
    },

    /// Drop an index.
    DropIndex {
        /// Index name.
        name: String,
        /// Whether to use IF EXISTS.
        if_exists: bool,
    },

    /// Replace a table's primary key in place.
    SetPrimaryKey {
        /// Table name.
        table: String,
        /// New key columns; empty drops the key.
        columns: Vec<String>,
        /// Existing key constraint to drop first, if any.
        replaces: Option<String>,
    },

    /// Add a foreign key constraint in place.
    AddForeignKey {
        /// Table name.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKeyDef,
    },
}

impl SyncOperation {
    /// Builds the CreateTable operation for `table` with types already mapped.
    #[must_use]
    pub fn create_table(table: &Table, columns: Vec<ColumnDef>) -> Self {
        Self::CreateTable {
            name: table.name.clone(),
            columns,
            primary_key: table.id_fields.clone(),
            foreign_keys: table
                .foreign_keys()
                .map(|r| ForeignKeyDef::from_relation(table, r))
                .collect(),
            if_not_exists: true,
        }
    }

    /// Creates a DropTable operation.
    #[must_use]
    pub fn drop_table(name: impl Into<String>) -> Self {
        Self::DropTable {
            name: name.into(),
            if_exists: true,
        }
    }

    /// Creates an AddColumn operation.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: ColumnDef) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a CreateIndex operation.
    #[must_use]
    pub fn create_index(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
        unique: bool,
    ) -> Self {
        Self::CreateIndex {
            name: name.into(),
            table: table.into(),
            columns,
            unique,
        }
    }

    /// Creates a DropIndex operation.
    #[must_use]
    pub fn drop_index(name: impl Into<String>) -> Self {
        Self::DropIndex {
            name: name.into(),
            if_exists: true,
        }
    }

    /// CreateIndex operations for every index declared on `table`.
    ///
    /// Uniqueness is derived from the table's current unique constraints.
    #[must_use]
    pub fn create_indexes(table: &Table) -> Vec<Self> {
        table
            .indexes
            .iter()
            .map(|index| {
                Self::create_index(
                    table.index_name(index),
                    &table.name,
                    index.fields.clone(),
                    table.index_is_unique(index),
                )
            })
            .collect()
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { name, .. } => format!("create table {name}"),
            Self::DropTable { name, .. } => format!("drop table {name}"),
            Self::AddColumn { table, column } => format!("add column {table}.{}", column.name),
            Self::AlterColumnType {
                table,
                column,
                from,
                to,
            } => format!("alter column {table}.{column} {from} -> {to}"),
            Self::CreateIndex { name, .. } => format!("create index {name}"),
            Self::DropIndex { name, .. } => format!("drop index {name}"),
            Self::SetPrimaryKey { table, columns, .. } => {
                format!("set primary key {table}({})", columns.join(", "))
            }
            Self::AddForeignKey { foreign_key, .. } => {
                format!("add foreign key {}", foreign_key.name)
            }
        }
    }
}
