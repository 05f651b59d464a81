//! SQLite driver.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Row};
use tracing::debug;

use crate::dialect::{SqliteDialect, SyncDialect};
use crate::error::{Result, SyncError};
use crate::snapshot::{
    ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, SchemaSnapshot, TableSnapshot,
};

use super::Driver;

static CREATE_TABLE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:"(?:[^"]|"")+"|`[^`]+`|\[[^\]]+\]|[^\s(]+)"#,
    )
    .expect("valid regex")
});

const STORED_DEFINITION_SQL: &str =
    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?";

/// Driver for a single SQLite connection.
#[derive(Debug)]
pub struct SqliteDriver {
    conn: SqliteConnection,
    dialect: SqliteDialect,
}

impl SqliteDriver {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(conn: SqliteConnection) -> Self {
        Self {
            conn,
            dialect: SqliteDialect::new(),
        }
    }

    /// Opens a connection. `sqlite:` URLs and bare paths are accepted; the
    /// database file is created if missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)?
        } else {
            SqliteConnectOptions::new().filename(url)
        };
        let conn = SqliteConnection::connect_with(&options.create_if_missing(true)).await?;
        Ok(Self::new(conn))
    }

    /// Returns the underlying connection.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    async fn table_names(&mut self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut self.conn)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(SyncError::from))
            .collect()
    }

    async fn read_table(&mut self, name: &str) -> Result<TableSnapshot> {
        let quoted = self.dialect.quote_identifier(name);

        let column_rows = sqlx::query(&format!("PRAGMA table_info({quoted})"))
            .fetch_all(&mut self.conn)
            .await?;
        let mut columns = Vec::with_capacity(column_rows.len());
        let mut key_positions: Vec<(i64, String)> = Vec::new();
        for row in &column_rows {
            let column_name: String = row.try_get("name")?;
            let native_type: String = row.try_get("type")?;
            let not_null: i64 = row.try_get("notnull")?;
            let default: Option<String> = row.try_get("dflt_value")?;
            let pk: i64 = row.try_get("pk")?;
            if pk > 0 {
                key_positions.push((pk, column_name.clone()));
            }
            columns.push(ColumnSnapshot {
                name: column_name,
                native_type: self.dialect.canonical_type(&native_type),
                not_null: not_null != 0,
                default,
                primary_key: pk > 0,
            });
        }
        key_positions.sort();
        let primary_key = key_positions.into_iter().map(|(_, c)| c).collect();

        let index_rows = sqlx::query(&format!("PRAGMA index_list({quoted})"))
            .fetch_all(&mut self.conn)
            .await?;
        let mut indexes = Vec::with_capacity(index_rows.len());
        for row in &index_rows {
            let index_name: String = row.try_get("name")?;
            let unique: i64 = row.try_get("unique")?;
            let info_rows = sqlx::query(&format!(
                "PRAGMA index_info({})",
                self.dialect.quote_identifier(&index_name)
            ))
            .fetch_all(&mut self.conn)
            .await?;
            let mut ranked: Vec<(i64, String)> = Vec::with_capacity(info_rows.len());
            for info in &info_rows {
                let rank: i64 = info.try_get("seqno")?;
                let column: Option<String> = info.try_get("name")?;
                if let Some(column) = column {
                    ranked.push((rank, column));
                }
            }
            ranked.sort();
            indexes.push(IndexSnapshot {
                name: index_name,
                columns: ranked.into_iter().map(|(_, c)| c).collect(),
                unique: unique != 0,
            });
        }

        let fk_rows = sqlx::query(&format!("PRAGMA foreign_key_list({quoted})"))
            .fetch_all(&mut self.conn)
            .await?;
        let mut grouped: BTreeMap<i64, Vec<(i64, String, String, Option<String>)>> =
            BTreeMap::new();
        for row in &fk_rows {
            let id: i64 = row.try_get("id")?;
            let seq: i64 = row.try_get("seq")?;
            let referenced: String = row.try_get("table")?;
            let from: String = row.try_get("from")?;
            let to: Option<String> = row.try_get("to")?;
            grouped
                .entry(id)
                .or_default()
                .push((seq, referenced, from, to));
        }
        let mut foreign_keys = Vec::with_capacity(grouped.len());
        for (_, mut parts) in grouped {
            parts.sort_by_key(|(seq, ..)| *seq);
            let references_table = parts
                .first()
                .map(|(_, table, ..)| table.clone())
                .unwrap_or_default();
            let columns = parts.iter().map(|(_, _, from, _)| from.clone()).collect();
            // A missing target column means the referenced table's primary key.
            let mut references_columns = Vec::with_capacity(parts.len());
            for (_, _, _, to) in &parts {
                match to {
                    Some(to) => references_columns.push(to.clone()),
                    None => {
                        references_columns = self.primary_key_of(&references_table).await?;
                        break;
                    }
                }
            }
            foreign_keys.push(ForeignKeySnapshot {
                name: None,
                columns,
                references_table,
                references_columns,
            });
        }

        debug!(
            table = %name,
            columns = columns.len(),
            indexes = indexes.len(),
            foreign_keys = foreign_keys.len(),
            "Introspected table"
        );

        Ok(TableSnapshot {
            name: name.to_string(),
            columns,
            indexes,
            foreign_keys,
            primary_key,
            primary_key_name: None,
        })
    }

    async fn primary_key_of(&mut self, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(&format!(
            "PRAGMA table_info({})",
            self.dialect.quote_identifier(table)
        ))
        .fetch_all(&mut self.conn)
        .await?;
        let mut keyed: Vec<(i64, String)> = Vec::new();
        for row in &rows {
            let pk: i64 = row.try_get("pk")?;
            if pk > 0 {
                keyed.push((pk, row.try_get("name")?));
            }
        }
        keyed.sort();
        Ok(keyed.into_iter().map(|(_, c)| c).collect())
    }

    async fn run_rebuild(&mut self, table: &str, statements: &[String]) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        for sql in statements {
            debug!(sql = %sql, "Executing SQL");
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| SyncError::statement(sql, e))?;
        }

        let check = format!(
            "PRAGMA foreign_key_check({})",
            self.dialect.quote_identifier(table)
        );
        let violations = sqlx::query(&check)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| SyncError::statement(&check, e))?;
        if !violations.is_empty() {
            tx.rollback().await?;
            return Err(SyncError::violation(
                &check,
                format!(
                    "{} row(s) of {table} reference missing parent rows",
                    violations.len()
                ),
            ));
        }

        tx.commit().await?;
        Ok(())
    }
}

impl Driver for SqliteDriver {
    type Dialect = SqliteDialect;

    fn dialect(&self) -> &SqliteDialect {
        &self.dialect
    }

    async fn existing_schema(&mut self) -> Result<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::new();
        for name in self.table_names().await? {
            let table = self.read_table(&name).await?;
            snapshot.add_table(table);
        }
        Ok(snapshot)
    }

    async fn existing_table(&mut self, name: &str) -> Result<Option<TableSnapshot>> {
        let exists = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(&mut self.conn)
            .await?
            .is_some();
        if exists {
            Ok(Some(self.read_table(name).await?))
        } else {
            Ok(None)
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");
        sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| SyncError::statement(sql, e))?;
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {}",
            self.dialect.quote_identifier(table)
        );
        let count: i64 = sqlx::query(&sql)
            .fetch_one(&mut self.conn)
            .await?
            .try_get("n")?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn previous_definition(&mut self, table: &str, temp_name: &str) -> Result<String> {
        let row = sqlx::query(STORED_DEFINITION_SQL)
            .bind(table)
            .fetch_optional(&mut self.conn)
            .await?
            .ok_or(SyncError::Database(sqlx::Error::RowNotFound))?;
        let sql: String = row.try_get("sql")?;

        if !CREATE_TABLE_HEAD.is_match(&sql) {
            return Err(SyncError::violation(
                STORED_DEFINITION_SQL,
                format!("stored definition of {table} is not a CREATE TABLE statement"),
            ));
        }
        let head = format!(
            "CREATE TABLE {}",
            self.dialect.quote_identifier(temp_name)
        );
        Ok(CREATE_TABLE_HEAD
            .replace(&sql, NoExpand(&head))
            .into_owned())
    }

    async fn execute_rebuild(&mut self, table: &str, statements: &[String]) -> Result<()> {
        // Has no effect inside a transaction, so toggle around it.
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut self.conn)
            .await?;
        let result = self.run_rebuild(table, statements).await;
        let restored = sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut self.conn)
            .await;
        result?;
        restored?;
        Ok(())
    }
}
