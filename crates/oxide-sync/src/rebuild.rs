//! Table rebuild executor.
//!
//! Used when a table's primary key, foreign keys or a column type must change
//! and the backend cannot do it in place. The table is copied aside, dropped,
//! recreated from its declaration and refilled, all in one transaction with
//! referential-integrity checks suspended.

use tracing::info;

use crate::diff::RebuildReason;
use crate::dialect::SyncDialect;
use crate::driver::Driver;
use crate::error::Result;
use crate::gate::{Decision, SafetyGate};
use crate::operations::SyncOperation;
use crate::sync::TableOutcome;

/// Name of the table that holds the old rows during a rebuild.
#[must_use]
pub fn temp_table_name(table: &str) -> String {
    format!("_{table}_old")
}

/// The statements that rebuild `table`.
///
/// Reads the table's current definition from the driver but changes nothing,
/// so this also serves dry runs.
pub async fn rebuild_statements<D: Driver>(
    driver: &mut D,
    table: &str,
    create: &SyncOperation,
    indexes: &[SyncOperation],
    copy_columns: &[String],
) -> Result<Vec<String>> {
    let temp = temp_table_name(table);
    let previous = driver.previous_definition(table, &temp).await?;

    let dialect = driver.dialect();
    let quoted_table = dialect.quote_identifier(table);
    let quoted_temp = dialect.quote_identifier(&temp);

    let mut statements = vec![
        dialect.drop_table_sql(&temp, true),
        previous,
        format!("INSERT INTO {quoted_temp} SELECT * FROM {quoted_table}"),
        dialect.drop_table_sql(table, false),
    ];
    statements.extend(dialect.generate_sql(create));
    if !copy_columns.is_empty() {
        let columns = dialect.column_list(copy_columns);
        statements.push(format!(
            "INSERT INTO {quoted_table} ({columns}) SELECT {columns} FROM {quoted_temp}"
        ));
    }
    statements.push(dialect.drop_table_sql(&temp, false));
    for index in indexes {
        statements.extend(dialect.generate_sql(index));
    }
    Ok(statements)
}

/// Rebuilds `table` after the safety gate allows it.
///
/// Returns [`TableOutcome::Declined`] when the operator says no. Fails with
/// `TableTooLargeForRebuild` at the row ceiling and with
/// `ConstraintViolation` when the copy-back breaks a constraint; in both
/// cases the table is left as it was.
pub async fn rebuild_table<D: Driver>(
    driver: &mut D,
    gate: &mut SafetyGate,
    table: &str,
    reasons: &[RebuildReason],
    create: &SyncOperation,
    indexes: &[SyncOperation],
    copy_columns: &[String],
) -> Result<TableOutcome> {
    let reasons: Vec<String> = reasons.iter().map(ToString::to_string).collect();
    let rows = driver.row_count(table).await?;

    if gate.check(table, rows, "Rebuild")? == Decision::Declined {
        return Ok(TableOutcome::Declined { reasons });
    }

    let statements = rebuild_statements(driver, table, create, indexes, copy_columns).await?;
    driver.execute_rebuild(table, &statements).await?;

    info!(table = %table, rows, reasons = %reasons.join("; "), "Rebuilt table");
    Ok(TableOutcome::Rebuilt {
        reasons,
        statements,
    })
}
