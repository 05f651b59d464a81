//! Schema model types.
//!
//! These types describe the desired state of the database as produced by the
//! [parser](crate::parser). They are immutable once parsed and consumed
//! read-only by the [diff engine](crate::diff).
//!
//! The JSON form of these types (camelCase keys) is also the format of the
//! table-definitions and enum-definitions documents.

use serde::{Deserialize, Deserializer, Serialize};

/// Referential action for `ON DELETE` / `ON UPDATE` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// Propagate the delete/update to referencing rows.
    Cascade,
    /// Refuse the delete/update immediately.
    Restrict,
    /// Refuse the delete/update at the end of the statement.
    NoAction,
    /// Set the referencing columns to NULL.
    SetNull,
    /// Set the referencing columns to their default.
    SetDefault,
}

impl ReferentialAction {
    /// Parses the schema-language spelling of an action.
    ///
    /// Unknown spellings are unmapped and return `None`, which renders as no
    /// clause at all.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "Cascade" => Some(Self::Cascade),
            "Restrict" => Some(Self::Restrict),
            "NoAction" => Some(Self::NoAction),
            "SetNull" => Some(Self::SetNull),
            "SetDefault" => Some(Self::SetDefault),
            _ => None,
        }
    }

    /// Returns the SQL keyword(s) for this action.
    #[must_use]
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

fn lenient_action<'de, D>(deserializer: D) -> Result<Option<ReferentialAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(ReferentialAction::parse))
}

/// A relation from one table to another.
///
/// Only relations with local columns (`fields`) own a foreign key; the
/// opposite side of a relation has empty column lists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Name of the relation field that owns this relation.
    #[serde(default)]
    pub field: String,
    /// Referenced table name.
    #[serde(default)]
    pub referenced_table: String,
    /// Local columns.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Referenced columns, positionally paired with `fields`.
    #[serde(default)]
    pub references: Vec<String>,
    /// Action on delete.
    #[serde(default, deserialize_with = "lenient_action")]
    pub on_delete: Option<ReferentialAction>,
    /// Action on update.
    #[serde(default, deserialize_with = "lenient_action")]
    pub on_update: Option<ReferentialAction>,
}

impl Relation {
    /// Returns true if this side of the relation owns a foreign key.
    #[must_use]
    pub fn owns_foreign_key(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// A field of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Field (column) name.
    pub name: String,
    /// Abstract type name with `[]` and `?` markers stripped.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Declared as a list (`Type[]`).
    #[serde(default)]
    pub is_array: bool,
    /// Declared optional (`Type?`).
    #[serde(default)]
    pub is_optional: bool,
    /// Declared `@unique`.
    #[serde(default)]
    pub is_unique: bool,
    /// The type names an enum.
    #[serde(default)]
    pub is_enum: bool,
    /// The type names another model. Relation fields are not columns.
    #[serde(default)]
    pub is_relation: bool,
    /// Declared `@db.ObjectId`.
    #[serde(default)]
    pub is_object_id: bool,
    /// Declared `@id`.
    #[serde(default)]
    pub is_id: bool,
    /// Relation details, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Relation>,
}

impl Field {
    /// Creates a plain scalar field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            is_array: false,
            is_optional: false,
            is_unique: false,
            is_enum: false,
            is_relation: false,
            is_object_id: false,
            is_id: false,
            relation: None,
        }
    }

    /// Returns true if this field becomes a column.
    #[must_use]
    pub fn is_column(&self) -> bool {
        !self.is_relation
    }
}

/// A unique constraint over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Fields, in declaration order.
    pub fields: Vec<String>,
}

/// An index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Fields, in declaration order.
    pub fields: Vec<String>,
}

/// A model (table) declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<Field>,
    /// Unique constraints.
    #[serde(default)]
    pub unique_constraints: Vec<UniqueConstraint>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// Primary key fields.
    #[serde(default)]
    pub id_fields: Vec<String>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            unique_constraints: Vec::new(),
            indexes: Vec::new(),
            id_fields: Vec::new(),
        }
    }

    /// Gets a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that become columns.
    pub fn columns(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_column())
    }

    /// Relations that own a foreign key.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &Relation> {
        self.fields
            .iter()
            .filter(|f| f.is_relation)
            .filter_map(|f| f.relation.as_ref())
            .filter(|r| r.owns_foreign_key())
    }

    /// An index is unique iff it covers every field of some unique constraint.
    #[must_use]
    pub fn index_is_unique(&self, index: &Index) -> bool {
        self.unique_constraints
            .iter()
            .any(|uc| uc.fields.iter().all(|f| index.fields.contains(f)))
    }

    /// Canonical index name: `idx_<table>_<field>_<field>...`.
    #[must_use]
    pub fn index_name(&self, index: &Index) -> String {
        format!("idx_{}_{}", self.name, index.fields.join("_"))
    }

    /// Canonical foreign key name: `fk_<table>_<field>`.
    #[must_use]
    pub fn foreign_key_name(&self, relation: &Relation) -> String {
        format!("fk_{}_{}", self.name, relation.field)
    }

    /// Names of the tables this table's foreign keys point at.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys().map(|r| r.referenced_table.as_str())
    }
}

/// An enum declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enum {
    /// Enum name.
    pub name: String,
    /// Values in declaration order.
    pub values: Vec<String>,
}

/// The parsed, normalized desired schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaModel {
    /// Tables in declaration order.
    pub tables: Vec<Table>,
    /// Enums in declaration order.
    pub enums: Vec<Enum>,
    /// Table names in declaration order.
    pub table_names: Vec<String>,
}

impl SchemaModel {
    /// Gets a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Gets an enum by name.
    #[must_use]
    pub fn get_enum(&self, name: &str) -> Option<&Enum> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Tables ordered so that referenced tables come before the tables that
    /// reference them. Ties keep declaration order; a cycle is broken by
    /// taking the first remaining table in declaration order.
    #[must_use]
    pub fn ordered_tables(&self) -> Vec<&Table> {
        let mut remaining: Vec<&Table> = self.tables.iter().collect();
        let mut ordered: Vec<&Table> = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|table| {
                table.referenced_tables().all(|referenced| {
                    referenced == table.name
                        || !remaining.iter().any(|other| other.name == referenced)
                })
            });
            ordered.push(remaining.remove(ready.unwrap_or(0)));
        }

        ordered
    }
}
