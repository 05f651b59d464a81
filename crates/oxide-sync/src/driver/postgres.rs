//! PostgreSQL driver.
//!
//! Introspection reads `information_schema` for columns and `pg_catalog` for
//! keys and indexes, restricted to the connection's current schema. Catalog
//! names are cast to `text` so they decode as plain strings.

use sqlx::postgres::PgConnection;
use sqlx::{Connection, Row};
use tracing::debug;

use crate::dialect::{PostgresDialect, SyncDialect};
use crate::error::{Result, SyncError};
use crate::snapshot::{
    ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, SchemaSnapshot, TableSnapshot,
};

use super::Driver;

const TABLES_SQL: &str = "\
    SELECT table_name::text AS name \
    FROM information_schema.tables \
    WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
    ORDER BY table_name";

const COLUMNS_SQL: &str = "\
    SELECT column_name::text AS name, data_type::text AS data_type, \
           is_nullable::text AS is_nullable, column_default::text AS column_default \
    FROM information_schema.columns \
    WHERE table_schema = current_schema() AND table_name = $1 \
    ORDER BY ordinal_position";

const PRIMARY_KEY_SQL: &str = "\
    SELECT c.conname::text AS name, a.attname::text AS column_name \
    FROM pg_constraint c \
    JOIN pg_class t ON t.oid = c.conrelid \
    JOIN pg_namespace n ON n.oid = t.relnamespace \
    CROSS JOIN LATERAL unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord) \
    JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum \
    WHERE c.contype = 'p' AND n.nspname = current_schema() AND t.relname = $1 \
    ORDER BY k.ord";

const FOREIGN_KEYS_SQL: &str = "\
    SELECT c.conname::text AS name, r.relname::text AS references_table, \
           ARRAY(SELECT a.attname::text \
                 FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord) \
                 JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum \
                 ORDER BY k.ord) AS columns, \
           ARRAY(SELECT a.attname::text \
                 FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord) \
                 JOIN pg_attribute a ON a.attrelid = c.confrelid AND a.attnum = k.attnum \
                 ORDER BY k.ord) AS references_columns \
    FROM pg_constraint c \
    JOIN pg_class t ON t.oid = c.conrelid \
    JOIN pg_namespace n ON n.oid = t.relnamespace \
    JOIN pg_class r ON r.oid = c.confrelid \
    WHERE c.contype = 'f' AND n.nspname = current_schema() AND t.relname = $1 \
    ORDER BY c.conname";

const INDEXES_SQL: &str = "\
    SELECT i.relname::text AS name, ix.indisunique AS is_unique, \
           ARRAY(SELECT a.attname::text \
                 FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
                 JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum \
                 ORDER BY k.ord) AS columns \
    FROM pg_index ix \
    JOIN pg_class i ON i.oid = ix.indexrelid \
    JOIN pg_class t ON t.oid = ix.indrelid \
    JOIN pg_namespace n ON n.oid = t.relnamespace \
    WHERE NOT ix.indisprimary AND n.nspname = current_schema() AND t.relname = $1 \
    ORDER BY i.relname";

/// Driver for a single PostgreSQL connection.
#[derive(Debug)]
pub struct PostgresDriver {
    conn: PgConnection,
    dialect: PostgresDialect,
}

impl PostgresDriver {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(conn: PgConnection) -> Self {
        Self {
            conn,
            dialect: PostgresDialect::new(),
        }
    }

    /// Opens a connection from a `postgres://` or `postgresql://` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self::new(conn))
    }

    /// Returns the underlying connection.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    async fn read_table(&mut self, name: &str) -> Result<TableSnapshot> {
        let key_rows = sqlx::query(PRIMARY_KEY_SQL)
            .bind(name)
            .fetch_all(&mut self.conn)
            .await?;
        let mut primary_key = Vec::with_capacity(key_rows.len());
        let mut primary_key_name = None;
        for row in &key_rows {
            primary_key_name = Some(row.try_get::<String, _>("name")?);
            primary_key.push(row.try_get::<String, _>("column_name")?);
        }

        let column_rows = sqlx::query(COLUMNS_SQL)
            .bind(name)
            .fetch_all(&mut self.conn)
            .await?;
        let mut columns = Vec::with_capacity(column_rows.len());
        for row in &column_rows {
            let column_name: String = row.try_get("name")?;
            let data_type: String = row.try_get("data_type")?;
            let is_nullable: String = row.try_get("is_nullable")?;
            columns.push(ColumnSnapshot {
                primary_key: primary_key.contains(&column_name),
                name: column_name,
                native_type: self.dialect.canonical_type(&data_type),
                not_null: is_nullable == "NO",
                default: row.try_get("column_default")?,
            });
        }

        let index_rows = sqlx::query(INDEXES_SQL)
            .bind(name)
            .fetch_all(&mut self.conn)
            .await?;
        let mut indexes = Vec::with_capacity(index_rows.len());
        for row in &index_rows {
            indexes.push(IndexSnapshot {
                name: row.try_get("name")?,
                columns: row.try_get("columns")?,
                unique: row.try_get("is_unique")?,
            });
        }

        let fk_rows = sqlx::query(FOREIGN_KEYS_SQL)
            .bind(name)
            .fetch_all(&mut self.conn)
            .await?;
        let mut foreign_keys = Vec::with_capacity(fk_rows.len());
        for row in &fk_rows {
            foreign_keys.push(ForeignKeySnapshot {
                name: Some(row.try_get("name")?),
                columns: row.try_get("columns")?,
                references_table: row.try_get("references_table")?,
                references_columns: row.try_get("references_columns")?,
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
            primary_key_name,
        })
    }
}

impl Driver for PostgresDriver {
    type Dialect = PostgresDialect;

    fn dialect(&self) -> &PostgresDialect {
        &self.dialect
    }

    async fn existing_schema(&mut self) -> Result<SchemaSnapshot> {
        let rows = sqlx::query(TABLES_SQL).fetch_all(&mut self.conn).await?;
        let names = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut snapshot = SchemaSnapshot::new();
        for name in names {
            let table = self.read_table(&name).await?;
            snapshot.add_table(table);
        }
        Ok(snapshot)
    }

    async fn existing_table(&mut self, name: &str) -> Result<Option<TableSnapshot>> {
        let exists = sqlx::query(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
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
        Ok(format!(
            "CREATE TABLE {} (LIKE {} INCLUDING ALL)",
            self.dialect.quote_identifier(temp_name),
            self.dialect.quote_identifier(table)
        ))
    }

    async fn execute_rebuild(&mut self, _table: &str, statements: &[String]) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut *tx)
            .await?;
        for sql in statements {
            debug!(sql = %sql, "Executing SQL");
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| SyncError::statement(sql, e))?;
        }
        tx.commit()
            .await
            .map_err(|e| SyncError::statement("COMMIT", e))?;
        Ok(())
    }
}
