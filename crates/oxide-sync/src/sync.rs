//! Reconciliation pass.
//!
//! A [`Reconciler`] owns one driver and walks the declared tables in
//! dependency order, bringing each one in line with its declaration. Failures
//! are isolated per table: they are recorded in the [`SyncReport`] and the
//! pass moves on. Only connection-level failures stop the pass.

use tracing::{debug, error, info, warn};

use crate::diff::{self, TablePlan};
use crate::dialect::SyncDialect;
use crate::driver::Driver;
use crate::error::{Result, SyncError};
use crate::gate::{Decision, SafetyGate};
use crate::operations::SyncOperation;
use crate::rebuild;
use crate::schema::{SchemaModel, Table};
use crate::snapshot::TableSnapshot;

/// Options for a reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Drop every declared table that exists before reconciling.
    pub force_reset: bool,
    /// Plan and report statements without executing them.
    pub dry_run: bool,
}

impl SyncOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables forced recreation of every table.
    #[must_use]
    pub fn force_reset(mut self, enabled: bool) -> Self {
        self.force_reset = enabled;
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }
}

/// What happened to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// The table did not exist and was created.
    Created {
        /// Statements issued.
        statements: Vec<String>,
    },
    /// The table was altered in place.
    Altered {
        /// Statements issued.
        statements: Vec<String>,
    },
    /// The table already matched.
    Unchanged,
    /// The table was rebuilt.
    Rebuilt {
        /// What forced the rebuild.
        reasons: Vec<String>,
        /// Statements issued.
        statements: Vec<String>,
    },
    /// The operator declined a destructive operation; the table is left as is.
    Declined {
        /// What the declined operation would have fixed.
        reasons: Vec<String>,
    },
    /// The table was dropped by a forced reset.
    Dropped {
        /// Statements issued.
        statements: Vec<String>,
    },
}

impl TableOutcome {
    /// Statements issued (or, in a dry run, planned) for this outcome.
    #[must_use]
    pub fn statements(&self) -> &[String] {
        match self {
            Self::Created { statements }
            | Self::Altered { statements }
            | Self::Rebuilt { statements, .. }
            | Self::Dropped { statements } => statements,
            Self::Unchanged | Self::Declined { .. } => &[],
        }
    }

    /// Short label for logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Altered { .. } => "altered",
            Self::Unchanged => "unchanged",
            Self::Rebuilt { .. } => "rebuilt",
            Self::Declined { .. } => "declined",
            Self::Dropped { .. } => "dropped",
        }
    }
}

/// A table whose reconciliation failed.
#[derive(Debug)]
pub struct TableFailure {
    /// Table name.
    pub table: String,
    /// What went wrong.
    pub error: SyncError,
}

/// The result of a reconciliation pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Per-table outcomes in the order they happened. A forced reset records
    /// a table twice: once dropped, once created.
    pub outcomes: Vec<(String, TableOutcome)>,
    /// Tables that failed.
    pub failures: Vec<TableFailure>,
    /// Whether statements were only planned.
    pub dry_run: bool,
}

impl SyncReport {
    /// The last outcome recorded for `table`.
    #[must_use]
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|(name, _)| name == table)
            .map(|(_, outcome)| outcome)
    }

    /// The failure recorded for `table`, if any.
    #[must_use]
    pub fn failure(&self, table: &str) -> Option<&SyncError> {
        self.failures
            .iter()
            .find(|f| f.table == table)
            .map(|f| &f.error)
    }

    /// Every statement issued, in order.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .flat_map(|(_, outcome)| outcome.statements())
            .map(String::as_str)
    }

    /// Returns true if any table failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn record(&mut self, table: &str, outcome: TableOutcome) {
        self.outcomes.push((table.to_string(), outcome));
    }

    fn fail(&mut self, table: &str, error: SyncError) {
        error!(table = %table, error = %error, "Table reconciliation failed");
        self.failures.push(TableFailure {
            table: table.to_string(),
            error,
        });
    }
}

/// Brings one table in line with its declaration, given its live state.
///
/// In a dry run, the plan is rendered but nothing is executed and the
/// safety gate is not consulted.
pub async fn reconcile_table<D: Driver>(
    driver: &mut D,
    table: &Table,
    existing: Option<&TableSnapshot>,
    gate: &mut SafetyGate,
    dry_run: bool,
) -> Result<TableOutcome> {
    let plan = diff::plan_table(driver.dialect(), table, existing)?;

    let outcome = match plan {
        TablePlan::Create(operations) => {
            let statements = apply(driver, &operations, dry_run).await?;
            TableOutcome::Created { statements }
        }
        TablePlan::Alter(operations) if operations.is_empty() => TableOutcome::Unchanged,
        TablePlan::Alter(operations) => {
            let statements = apply(driver, &operations, dry_run).await?;
            TableOutcome::Altered { statements }
        }
        TablePlan::Rebuild {
            reasons,
            create,
            indexes,
            copy_columns,
        } => {
            if dry_run {
                let statements = rebuild::rebuild_statements(
                    driver,
                    &table.name,
                    &create,
                    &indexes,
                    &copy_columns,
                )
                .await?;
                TableOutcome::Rebuilt {
                    reasons: reasons.iter().map(ToString::to_string).collect(),
                    statements,
                }
            } else {
                rebuild::rebuild_table(
                    driver,
                    gate,
                    &table.name,
                    &reasons,
                    &create,
                    &indexes,
                    &copy_columns,
                )
                .await?
            }
        }
    };

    match &outcome {
        TableOutcome::Declined { reasons } => {
            warn!(table = %table.name, reasons = %reasons.join("; "), "Table left divergent");
        }
        other => info!(table = %table.name, outcome = other.label(), "Table reconciled"),
    }
    Ok(outcome)
}

/// Renders and, unless `dry_run`, executes operations one by one.
async fn apply<D: Driver>(
    driver: &mut D,
    operations: &[SyncOperation],
    dry_run: bool,
) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    for operation in operations {
        debug!(operation = %operation.describe(), "Applying operation");
        let rendered = driver.dialect().generate_sql(operation);
        for sql in rendered {
            if sql.starts_with("--") {
                warn!(comment = %sql, "Skipping comment (unsupported operation)");
                continue;
            }
            if !dry_run {
                driver.execute(&sql).await?;
            }
            statements.push(sql);
        }
    }
    Ok(statements)
}

/// Runs reconciliation passes against one database.
pub struct Reconciler<D: Driver> {
    driver: D,
    gate: SafetyGate,
    options: SyncOptions,
}

impl<D: Driver> Reconciler<D> {
    /// Creates a reconciler with default options.
    pub fn new(driver: D, gate: SafetyGate) -> Self {
        Self {
            driver,
            gate,
            options: SyncOptions::default(),
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Consumes the reconciler and returns the driver.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Reconciles every table of `model`.
    ///
    /// Returns `Err` only for failures that make the connection unusable;
    /// everything else is recorded per table in the report.
    pub async fn run(&mut self, model: &SchemaModel) -> Result<SyncReport> {
        let dry_run = self.options.dry_run;
        let mut report = SyncReport {
            dry_run,
            ..SyncReport::default()
        };

        let tables = model.ordered_tables();
        let mut snapshot = self.driver.existing_schema().await?;
        info!(
            declared = tables.len(),
            existing = snapshot.tables.len(),
            backend = self.driver.dialect().name(),
            "Reconciling schema"
        );

        if self.options.force_reset {
            for table in tables.iter().rev() {
                if snapshot.table(&table.name).is_none() {
                    continue;
                }
                match self.drop_table(&table.name).await {
                    Ok(outcome) => {
                        if matches!(outcome, TableOutcome::Dropped { .. }) {
                            snapshot.tables.remove(&table.name);
                        }
                        report.record(&table.name, outcome);
                    }
                    Err(e) if e.is_connection_error() => return Err(e),
                    Err(e) => report.fail(&table.name, e),
                }
            }
        }

        for table in tables {
            let existing = snapshot.table(&table.name);
            match reconcile_table(&mut self.driver, table, existing, &mut self.gate, dry_run).await
            {
                Ok(outcome) => report.record(&table.name, outcome),
                Err(e) if e.is_connection_error() => return Err(e),
                Err(e) => report.fail(&table.name, e),
            }
        }

        info!(
            statements = report.statements().count(),
            failures = report.failures.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn drop_table(&mut self, table: &str) -> Result<TableOutcome> {
        let statements = self
            .driver
            .dialect()
            .generate_sql(&SyncOperation::drop_table(table));

        if self.options.dry_run {
            return Ok(TableOutcome::Dropped { statements });
        }

        let rows = self.driver.row_count(table).await?;
        if self.gate.check(table, rows, "Drop")? == Decision::Declined {
            return Ok(TableOutcome::Declined {
                reasons: vec!["forced reset".to_string()],
            });
        }

        for sql in &statements {
            self.driver.execute(sql).await?;
        }
        info!(table = %table, rows, "Dropped table");
        Ok(TableOutcome::Dropped { statements })
    }
}
