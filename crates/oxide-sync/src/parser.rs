//! Schema description parser.
//!
//! Turns either a declarative text source or the pair of JSON documents
//! (table definitions, enum definitions) into a normalized [`SchemaModel`].
//!
//! Both entry points funnel through [`normalize`], which:
//!
//! - strips `[]` and `?` markers from field types and records them as flags,
//! - classifies relation fields (type names another model, not an enum),
//! - validates relations, unique constraints, indexes and id fields,
//! - folds `@unique` fields into single-field unique constraints,
//! - folds unique constraints into indexes with the same fields.
//!
//! Normalization is idempotent: normalizing an already normalized model
//! yields the same model.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SyncError};
use crate::schema::{
    Enum, Field, Index, ReferentialAction, Relation, SchemaModel, Table, UniqueConstraint,
};

static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)@id(\s|\(|$)").expect("valid @id regex"));
static UNIQUE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)@unique(\s|\(|$)").expect("valid @unique regex"));
static RELATION_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@relation\((.*)\)").expect("valid @relation regex"));
static RELATION_FIELDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fields:\s*\[([^\]]*)\]").expect("valid fields regex"));
static RELATION_REFERENCES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"references:\s*\[([^\]]*)\]").expect("valid references regex"));
static ON_DELETE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"onDelete:\s*(\w+)").expect("valid onDelete regex"));
static ON_UPDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"onUpdate:\s*(\w+)").expect("valid onUpdate regex"));
static BLOCK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@@id\(\s*\[([^\]]+)\]").expect("valid @@id regex"));
static BLOCK_UNIQUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@@unique\(\s*\[([^\]]+)\]").expect("valid @@unique regex"));
static BLOCK_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@@index\(\s*\[([^\]]+)\]").expect("valid @@index regex"));

/// Parses a declarative text schema.
///
/// ```text
/// model User {
///   id    Int    @id
///   email String @unique
///   posts Post[]
/// }
/// ```
pub fn parse(source: &str) -> Result<SchemaModel> {
    let (tables, enums) = TextParser::default().run(source)?;
    normalize(tables, enums)
}

/// Parses the table-definitions and enum-definitions JSON documents.
pub fn parse_json(tables_json: &str, enums_json: &str) -> Result<SchemaModel> {
    let tables: Vec<Table> = serde_json::from_str(tables_json)
        .map_err(|e| SyncError::malformed("table definitions", e.to_string()))?;
    let enums: Vec<Enum> = serde_json::from_str(enums_json)
        .map_err(|e| SyncError::malformed("enum definitions", e.to_string()))?;
    normalize(tables, enums)
}

/// Reads and parses a text schema file.
pub fn parse_file(path: &Path) -> Result<SchemaModel> {
    parse(&std::fs::read_to_string(path)?)
}

/// Reads and parses the two JSON documents.
pub fn parse_json_files(tables: &Path, enums: &Path) -> Result<SchemaModel> {
    parse_json(
        &std::fs::read_to_string(tables)?,
        &std::fs::read_to_string(enums)?,
    )
}

/// Serializes a model back into the two JSON documents.
pub fn to_json(model: &SchemaModel) -> Result<(String, String)> {
    Ok((
        serde_json::to_string_pretty(&model.tables)?,
        serde_json::to_string_pretty(&model.enums)?,
    ))
}

enum Block {
    Model { table: Table, line: usize },
    Enum { value: Enum, line: usize },
    Other { name: String, line: usize },
}

#[derive(Default)]
struct TextParser {
    tables: Vec<Table>,
    enums: Vec<Enum>,
    block: Option<Block>,
}

impl TextParser {
    fn run(mut self, source: &str) -> Result<(Vec<Table>, Vec<Enum>)> {
        for (idx, raw) in source.lines().enumerate() {
            let line_no = idx + 1;
            let text = strip_comment(raw).trim();
            if text.is_empty() {
                continue;
            }

            match self.block.take() {
                None => self.open_block(text, line_no)?,
                Some(block) if text == "}" => self.close_block(block),
                Some(Block::Model { mut table, line }) => {
                    model_line(&mut table, line_no, text)?;
                    self.block = Some(Block::Model { table, line });
                }
                Some(Block::Enum { mut value, line }) => {
                    if !text.starts_with('@') {
                        if let Some(name) = text.split_whitespace().next() {
                            value.values.push(name.to_string());
                        }
                    }
                    self.block = Some(Block::Enum { value, line });
                }
                Some(other @ Block::Other { .. }) => self.block = Some(other),
            }
        }

        if let Some(block) = self.block {
            let (kind, name, line) = match block {
                Block::Model { table, line } => ("model", table.name, line),
                Block::Enum { value, line } => ("enum", value.name, line),
                Block::Other { name, line } => ("block", name, line),
            };
            return Err(SyncError::malformed(
                format!("line {line}"),
                format!("unterminated {kind} '{name}'"),
            ));
        }

        Ok((self.tables, self.enums))
    }

    fn open_block(&mut self, line: &str, line_no: usize) -> Result<()> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().unwrap_or_default();
        let name = tokens
            .next()
            .map(|n| n.trim_end_matches('{').to_string())
            .unwrap_or_default();

        if !line.ends_with('{') || name.is_empty() {
            return Err(SyncError::malformed(
                format!("line {line_no}"),
                format!("expected a block declaration, found '{line}'"),
            ));
        }

        self.block = Some(match keyword {
            "model" => Block::Model {
                table: Table::new(name),
                line: line_no,
            },
            "enum" => Block::Enum {
                value: Enum {
                    name,
                    values: Vec::new(),
                },
                line: line_no,
            },
            _ => Block::Other {
                name,
                line: line_no,
            },
        });
        Ok(())
    }

    fn close_block(&mut self, block: Block) {
        match block {
            Block::Model { table, .. } => self.tables.push(table),
            Block::Enum { value, .. } => self.enums.push(value),
            Block::Other { .. } => {}
        }
    }
}

/// Removes a trailing `//` comment, ignoring `//` inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut prev = '\0';
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' if prev != '\\' => in_string = !in_string,
            '/' if !in_string && prev == '/' => return &line[..idx - 1],
            _ => {}
        }
        prev = ch;
    }
    line
}

fn field_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|item| item.split('(').next().unwrap_or_default().trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn model_line(table: &mut Table, line_no: usize, line: &str) -> Result<()> {
    if line.starts_with("@@") {
        if let Some(caps) = BLOCK_ID.captures(line) {
            table.id_fields = field_list(&caps[1]);
        } else if let Some(caps) = BLOCK_UNIQUE.captures(line) {
            table.unique_constraints.push(UniqueConstraint {
                fields: field_list(&caps[1]),
            });
        } else if let Some(caps) = BLOCK_INDEX.captures(line) {
            table.indexes.push(Index {
                fields: field_list(&caps[1]),
            });
        }
        return Ok(());
    }

    let mut tokens = line.split_whitespace();
    let (Some(name), Some(field_type)) = (tokens.next(), tokens.next()) else {
        return Err(SyncError::malformed(
            format!("{} line {line_no}", table.name),
            format!("expected '<name> <type>', found '{line}'"),
        ));
    };

    let attributes = line[name.len()..].trim_start()[field_type.len()..].trim();
    let mut field = Field::new(name, field_type);
    field.is_id = ID_ATTR.is_match(attributes);
    field.is_unique = UNIQUE_ATTR.is_match(attributes);
    field.is_object_id = attributes.contains("@db.ObjectId");

    if let Some(caps) = RELATION_ATTR.captures(attributes) {
        let args = &caps[1];
        field.relation = Some(Relation {
            fields: RELATION_FIELDS
                .captures(args)
                .map(|c| field_list(&c[1]))
                .unwrap_or_default(),
            references: RELATION_REFERENCES
                .captures(args)
                .map(|c| field_list(&c[1]))
                .unwrap_or_default(),
            on_delete: ON_DELETE
                .captures(args)
                .and_then(|c| ReferentialAction::parse(&c[1])),
            on_update: ON_UPDATE
                .captures(args)
                .and_then(|c| ReferentialAction::parse(&c[1])),
            ..Relation::default()
        });
    }

    if field.is_id && !table.id_fields.contains(&field.name) {
        table.id_fields.push(field.name.clone());
    }
    table.fields.push(field);
    Ok(())
}

/// Splits `[]` and `?` markers off a declared type.
///
/// Returns `(base, is_array, is_optional)`.
fn strip_markers(declared: &str) -> (&str, bool, bool) {
    let mut base = declared;
    let mut is_array = false;
    let mut is_optional = false;
    loop {
        if let Some(rest) = base.strip_suffix('?') {
            is_optional = true;
            base = rest;
        } else if let Some(rest) = base.strip_suffix("[]") {
            is_array = true;
            base = rest;
        } else {
            return (base, is_array, is_optional);
        }
    }
}

/// Normalizes and validates raw tables and enums into a [`SchemaModel`].
pub fn normalize(mut tables: Vec<Table>, enums: Vec<Enum>) -> Result<SchemaModel> {
    let table_names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
    let mut seen = HashSet::new();
    for name in &table_names {
        if !seen.insert(name.as_str()) {
            return Err(SyncError::malformed(name, "model declared more than once"));
        }
    }
    let enum_names: HashSet<&str> = enums.iter().map(|e| e.name.as_str()).collect();

    for table in &mut tables {
        classify_fields(table, &table_names, &enum_names)?;
    }

    for table in &tables {
        validate_table(table, &tables)?;
    }

    for table in &mut tables {
        fold_unique_fields(table);
        fold_unique_constraints(table);
    }

    Ok(SchemaModel {
        tables,
        enums,
        table_names,
    })
}

fn classify_fields(
    table: &mut Table,
    table_names: &[String],
    enum_names: &HashSet<&str>,
) -> Result<()> {
    for field in &mut table.fields {
        let (base, is_array, is_optional) = strip_markers(&field.field_type);
        let base = base.to_string();
        field.is_array |= is_array;
        field.is_optional |= is_optional;
        field.is_enum |= enum_names.contains(base.as_str());
        field.is_relation = !field.is_enum && table_names.contains(&base);

        if field.is_relation {
            let mut relation = field.relation.take().unwrap_or_default();
            relation.field = field.name.clone();
            relation.referenced_table = base.clone();
            if relation.fields.len() != relation.references.len() {
                return Err(SyncError::malformed(
                    format!("{}.{}", table.name, field.name),
                    format!(
                        "relation has {} local field(s) but {} referenced column(s)",
                        relation.fields.len(),
                        relation.references.len()
                    ),
                ));
            }
            field.relation = Some(relation);
        } else if field
            .relation
            .as_ref()
            .is_some_and(Relation::owns_foreign_key)
        {
            return Err(SyncError::malformed(
                format!("{}.{}", table.name, field.name),
                format!("relation declared on '{base}', which is not a model"),
            ));
        } else {
            field.relation = None;
        }

        if field.is_id && !table.id_fields.contains(&field.name) {
            table.id_fields.push(field.name.clone());
        }
        field.field_type = base;
    }
    Ok(())
}

fn validate_table(table: &Table, tables: &[Table]) -> Result<()> {
    let require = |names: &[String], what: &str| -> Result<()> {
        match names.iter().find(|n| table.field(n).is_none()) {
            Some(missing) => Err(SyncError::malformed(
                &table.name,
                format!("{what} references unknown field '{missing}'"),
            )),
            None => Ok(()),
        }
    };

    // Keys and indexes may only name fields that become columns.
    let require_columns = |names: &[String], what: &str| -> Result<()> {
        require(names, what)?;
        match names.iter().find(|n| table.field(n).is_some_and(|f| !f.is_column())) {
            Some(relation) => Err(SyncError::malformed(
                &table.name,
                format!("{what} names relation field '{relation}', which has no column"),
            )),
            None => Ok(()),
        }
    };

    require_columns(&table.id_fields, "id")?;
    for uc in &table.unique_constraints {
        require_columns(&uc.fields, "unique constraint")?;
    }
    for index in &table.indexes {
        require_columns(&index.fields, "index")?;
    }
    if let Some(field) = table.fields.iter().find(|f| f.is_unique && f.is_relation) {
        return Err(SyncError::malformed(
            format!("{}.{}", table.name, field.name),
            "@unique on a relation field, which has no column",
        ));
    }

    for relation in table.foreign_keys() {
        require(&relation.fields, "relation")?;
        if let Some(column) = relation
            .fields
            .iter()
            .find(|f| table.field(f).is_some_and(|f| !f.is_column()))
        {
            return Err(SyncError::malformed(
                &table.name,
                format!("relation column '{column}' is itself a relation field"),
            ));
        }
        let target = tables
            .iter()
            .find(|t| t.name == relation.referenced_table)
            .ok_or_else(|| {
                SyncError::malformed(
                    &table.name,
                    format!("unknown model '{}'", relation.referenced_table),
                )
            })?;
        if let Some(missing) = relation.references.iter().find(|r| target.field(r).is_none()) {
            return Err(SyncError::malformed(
                format!("{}.{}", table.name, relation.field),
                format!("references unknown field '{}.{missing}'", target.name),
            ));
        }
    }
    Ok(())
}

fn fold_unique_fields(table: &mut Table) {
    let unique: Vec<String> = table
        .fields
        .iter()
        .filter(|f| f.is_unique)
        .map(|f| f.name.clone())
        .collect();
    for name in unique {
        let covered = table
            .unique_constraints
            .iter()
            .any(|uc| uc.fields.len() == 1 && uc.fields[0] == name);
        if !covered {
            table.unique_constraints.push(UniqueConstraint { fields: vec![name] });
        }
    }
}

fn fold_unique_constraints(table: &mut Table) {
    let missing: Vec<Index> = table
        .unique_constraints
        .iter()
        .filter(|uc| !table.indexes.iter().any(|idx| idx.fields == uc.fields))
        .map(|uc| Index {
            fields: uc.fields.clone(),
        })
        .collect();
    table.indexes.extend(missing);
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOG: &str = r#"
datasource db {
  provider = "sqlite"
  url      = env("DATABASE_URL")
}

enum Role {
  USER
  ADMIN
}

model User {
  id        Int      @id
  name      String
  email     String   @unique
  role      Role     @default(USER)
  website   String?  @default("http://example.com") // trailing comment
  posts     Post[]
  createdAt DateTime @default(now())
}

model Post {
  id       Int     @id
  title    String
  content  String?
  tags     String[]
  author   User    @relation(fields: [authorId], references: [id], onDelete: Cascade)
  authorId Int
  @@index([authorId])
  @@unique([title, authorId])
}
"#;

    #[test]
    fn test_parse_models_and_enums() {
        let model = parse(BLOG).unwrap();
        assert_eq!(model.table_names, vec!["User", "Post"]);
        assert_eq!(model.enums.len(), 1);
        assert_eq!(model.enums[0].values, vec!["USER", "ADMIN"]);

        let user = model.table("User").unwrap();
        assert_eq!(user.id_fields, vec!["id"]);
        assert_eq!(user.fields.len(), 7);
        assert!(user.field("role").unwrap().is_enum);
        assert!(!user.field("role").unwrap().is_relation);
    }

    #[test]
    fn test_markers_are_stripped() {
        let model = parse(BLOG).unwrap();
        let user = model.table("User").unwrap();

        let website = user.field("website").unwrap();
        assert_eq!(website.field_type, "String");
        assert!(website.is_optional);

        let posts = user.field("posts").unwrap();
        assert_eq!(posts.field_type, "Post");
        assert!(posts.is_array);
        assert!(posts.is_relation);
        assert!(!posts.relation.as_ref().unwrap().owns_foreign_key());

        let tags = model.table("Post").unwrap().field("tags").unwrap();
        assert_eq!(tags.field_type, "String");
        assert!(tags.is_array);
        assert!(!tags.is_relation);
    }

    #[test]
    fn test_comment_inside_string_is_kept() {
        assert_eq!(
            strip_comment(r#"a String @default("http://x") // note"#),
            r#"a String @default("http://x") "#
        );
    }

    #[test]
    fn test_relation_details() {
        let model = parse(BLOG).unwrap();
        let post = model.table("Post").unwrap();
        let relations: Vec<&Relation> = post.foreign_keys().collect();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].field, "author");
        assert_eq!(relations[0].referenced_table, "User");
        assert_eq!(relations[0].fields, vec!["authorId"]);
        assert_eq!(relations[0].references, vec!["id"]);
        assert_eq!(relations[0].on_delete, Some(ReferentialAction::Cascade));
        assert_eq!(relations[0].on_update, None);
    }

    #[test]
    fn test_unique_field_folding() {
        let model = parse(BLOG).unwrap();
        let user = model.table("User").unwrap();

        let email = vec!["email".to_string()];
        assert_eq!(
            user.unique_constraints
                .iter()
                .filter(|uc| uc.fields == email)
                .count(),
            1
        );
        let indexes: Vec<&Index> = user.indexes.iter().filter(|i| i.fields == email).collect();
        assert_eq!(indexes.len(), 1);
        assert!(user.index_is_unique(indexes[0]));
    }

    #[test]
    fn test_unique_constraint_folds_into_index_once() {
        let model = parse(BLOG).unwrap();
        let post = model.table("Post").unwrap();
        assert_eq!(
            post.indexes,
            vec![
                Index {
                    fields: vec!["authorId".into()]
                },
                Index {
                    fields: vec!["title".into(), "authorId".into()]
                },
            ]
        );
    }

    #[test]
    fn test_explicit_unique_constraint_not_duplicated() {
        let source = r"
model Account {
  id    Int    @id
  email String @unique
  @@unique([email])
}
";
        let model = parse(source).unwrap();
        let account = model.table("Account").unwrap();
        assert_eq!(account.unique_constraints.len(), 1);
        assert_eq!(account.indexes.len(), 1);
    }

    #[test]
    fn test_composite_id() {
        let source = r"
model Membership {
  userId  Int
  groupId Int
  @@id([userId, groupId])
}
";
        let model = parse(source).unwrap();
        assert_eq!(
            model.table("Membership").unwrap().id_fields,
            vec!["userId", "groupId"]
        );
    }

    #[test]
    fn test_unterminated_model() {
        let err = parse("model User {\n  id Int @id\n").unwrap_err();
        match err {
            SyncError::MalformedSchema { message, .. } => {
                assert!(message.contains("unterminated model 'User'"));
            }
            other => panic!("expected MalformedSchema, got {other:?}"),
        }
    }

    #[test]
    fn test_relation_count_mismatch() {
        let source = r"
model User {
  id Int @id
}
model Post {
  id       Int  @id
  authorId Int
  author   User @relation(fields: [authorId], references: [id, id])
}
";
        assert!(matches!(
            parse(source),
            Err(SyncError::MalformedSchema { .. })
        ));
    }

    #[test]
    fn test_index_on_unknown_field() {
        let source = r"
model User {
  id Int @id
  @@index([nickname])
}
";
        let err = parse(source).unwrap_err();
        assert!(err.to_string().contains("nickname"));
    }

    const POST_HEAD: &str = r"
model User {
  id    Int    @id
  posts Post[]
}
model Post {
  id       Int  @id
  authorId Int
";

    fn post_with(lines: &str) -> Result<SchemaModel> {
        parse(&format!("{POST_HEAD}{lines}\n}}\n"))
    }

    #[test]
    fn test_keys_and_indexes_reject_relation_fields() {
        let author = "  author   User @relation(fields: [authorId], references: [id])\n";
        for block in ["@@index([author])", "@@unique([author])", "@@id([author])"] {
            let err = post_with(&format!("{author}  {block}")).unwrap_err();
            assert!(
                matches!(err, SyncError::MalformedSchema { ref message, .. }
                    if message.contains("relation field 'author'")),
                "{block}: {err}"
            );
        }

        let err = post_with(
            "  author   User @unique @relation(fields: [authorId], references: [id])",
        )
        .unwrap_err();
        assert!(
            matches!(err, SyncError::MalformedSchema { ref context, .. } if context == "Post.author"),
            "{err}"
        );

        let model = post_with(&format!("{author}  @@index([authorId])")).unwrap();
        assert_eq!(model.table("Post").unwrap().indexes.len(), 1);
    }

    #[test]
    fn test_relation_to_unknown_column() {
        let source = r"
model User {
  id Int @id
}
model Post {
  id       Int  @id
  authorId Int
  author   User @relation(fields: [authorId], references: [uuid])
}
";
        assert!(matches!(
            parse(source),
            Err(SyncError::MalformedSchema { .. })
        ));
    }

    #[test]
    fn test_parse_json_documents() {
        let tables = r#"[
            {
                "name": "User",
                "fields": [
                    {"name": "id", "type": "Int", "isId": true},
                    {"name": "email", "type": "String", "isUnique": true},
                    {"name": "role", "type": "Role?"},
                    {"name": "posts", "type": "Post[]"}
                ],
                "idFields": ["id"],
                "uniqueConstraints": [],
                "indexes": []
            },
            {
                "name": "Post",
                "fields": [
                    {"name": "id", "type": "Int"},
                    {"name": "authorId", "type": "Int"},
                    {"name": "author", "type": "User",
                     "relation": {"fields": ["authorId"], "references": ["id"], "onDelete": "Bogus"}}
                ],
                "idFields": ["id"]
            }
        ]"#;
        let enums = r#"[{"name": "Role", "values": ["USER", "ADMIN"]}]"#;

        let model = parse_json(tables, enums).unwrap();
        let user = model.table("User").unwrap();
        assert!(user.field("role").unwrap().is_enum);
        assert!(user.field("role").unwrap().is_optional);
        assert_eq!(user.indexes.len(), 1);

        let post = model.table("Post").unwrap();
        let relation = post.foreign_keys().next().unwrap();
        assert_eq!(relation.referenced_table, "User");
        assert_eq!(relation.on_delete, None);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let model = parse(BLOG).unwrap();
        let (tables, enums) = to_json(&model).unwrap();
        let reparsed = parse_json(&tables, &enums).unwrap();
        assert_eq!(model, reparsed);
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.prisma");
        std::fs::write(&path, BLOG).unwrap();
        assert_eq!(parse_file(&path).unwrap().tables.len(), 2);
    }
}
