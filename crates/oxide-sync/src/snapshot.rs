//! Introspected schema types.
//!
//! Drivers read the live catalog into these types so the diff engine can
//! compare them against a [`Table`](crate::schema::Table). A snapshot only
//! lives for one reconciliation pass.

use std::collections::BTreeMap;

use crate::schema::Relation;

/// A column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSnapshot {
    /// Column name.
    pub name: String,
    /// Native type, upper-cased and canonicalized by the driver.
    pub native_type: String,
    /// Whether the column is declared NOT NULL.
    pub not_null: bool,
    /// Default expression, if any.
    pub default: Option<String>,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

/// An index as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSnapshot {
    /// Index name.
    pub name: String,
    /// Indexed columns, in index order.
    pub columns: Vec<String>,
    /// Whether this is a UNIQUE index.
    pub unique: bool,
}

/// A foreign key as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySnapshot {
    /// Constraint name, when the backend exposes one.
    pub name: Option<String>,
    /// Local columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub references_table: String,
    /// Referenced columns.
    pub references_columns: Vec<String>,
}

impl ForeignKeySnapshot {
    /// Exact multi-column match against a declared relation.
    #[must_use]
    pub fn matches(&self, relation: &Relation) -> bool {
        self.references_table == relation.referenced_table
            && self.columns == relation.fields
            && self.references_columns == relation.references
    }
}

/// A single table's live structure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSnapshot {
    /// Table name.
    pub name: String,
    /// Columns in catalog order.
    pub columns: Vec<ColumnSnapshot>,
    /// Indexes on this table.
    pub indexes: Vec<IndexSnapshot>,
    /// Foreign keys on this table.
    pub foreign_keys: Vec<ForeignKeySnapshot>,
    /// Primary key columns, in key order.
    pub primary_key: Vec<String>,
    /// Primary key constraint name, when the backend exposes one.
    pub primary_key_name: Option<String>,
}

impl TableSnapshot {
    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSnapshot> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSnapshot> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Returns true if a foreign key exactly matching `relation` exists.
    #[must_use]
    pub fn has_foreign_key(&self, relation: &Relation) -> bool {
        self.foreign_keys.iter().any(|fk| fk.matches(relation))
    }
}

/// The live structure of every table in the database.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaSnapshot {
    /// Tables keyed by name, sorted for deterministic iteration.
    pub tables: BTreeMap<String, TableSnapshot>,
}

impl SchemaSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table snapshot.
    pub fn add_table(&mut self, table: TableSnapshot) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Gets a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    /// Returns true if there are no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author_relation() -> Relation {
        Relation {
            field: "author".into(),
            referenced_table: "User".into(),
            fields: vec!["authorId".into()],
            references: vec!["id".into()],
            on_delete: None,
            on_update: None,
        }
    }

    #[test]
    fn test_foreign_key_exact_match() {
        let fk = ForeignKeySnapshot {
            name: None,
            columns: vec!["authorId".into()],
            references_table: "User".into(),
            references_columns: vec!["id".into()],
        };
        assert!(fk.matches(&author_relation()));
    }

    #[test]
    fn test_foreign_key_partial_match_is_rejected() {
        let fk = ForeignKeySnapshot {
            name: None,
            columns: vec!["authorId".into(), "tenantId".into()],
            references_table: "User".into(),
            references_columns: vec!["id".into(), "tenantId".into()],
        };
        assert!(!fk.matches(&author_relation()));

        let table = TableSnapshot {
            name: "Post".into(),
            foreign_keys: vec![fk],
            ..TableSnapshot::default()
        };
        assert!(!table.has_foreign_key(&author_relation()));
    }
}
