//! Destructive-operation safety gate.
//!
//! Every table rebuild and forced drop passes through a [`SafetyGate`]. The
//! gate refuses outright when the table holds [`REBUILD_ROW_LIMIT`] rows or
//! more, and otherwise asks the operator unless "yes to all" is latched.

use std::io::{self, BufRead, Write};

use tracing::warn;

use crate::error::{Result, SyncError};

/// Row count at which destructive operations are refused. Not configurable.
pub const REBUILD_ROW_LIMIT: u64 = 10_000;

/// An operator's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// Proceed with this operation.
    Yes,
    /// Skip this operation.
    No,
    /// Proceed with this and every later operation without asking.
    YesToAll,
}

/// Source of confirmation answers.
pub trait Prompt {
    /// Asks `question` and returns the answer.
    fn confirm(&mut self, question: &str) -> Answer;
}

impl<F> Prompt for F
where
    F: FnMut(&str) -> Answer,
{
    fn confirm(&mut self, question: &str) -> Answer {
        self(question)
    }
}

/// Prompts on stderr and reads the answer from stdin.
///
/// `y`/`yes` answers yes, `a`/`all` answers yes to all, anything else
/// (including end of input) answers no.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl StdinPrompt {
    /// Interprets a line typed by the operator.
    #[must_use]
    pub fn parse_answer(line: &str) -> Answer {
        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => Answer::Yes,
            "a" | "all" => Answer::YesToAll,
            _ => Answer::No,
        }
    }
}

impl Prompt for StdinPrompt {
    fn confirm(&mut self, question: &str) -> Answer {
        let mut stderr = io::stderr();
        // A prompt that cannot be shown or answered counts as a refusal.
        if write!(stderr, "{question} [y]es/[n]o/[a]ll: ")
            .and_then(|()| stderr.flush())
            .is_err()
        {
            return Answer::No;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => Answer::No,
            Ok(_) => Self::parse_answer(&line),
        }
    }
}

/// What the gate decided for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Go ahead.
    Proceed,
    /// The operator said no; leave the table as it is.
    Declined,
}

/// Guards rebuilds and forced drops.
pub struct SafetyGate {
    prompt: Box<dyn Prompt>,
    yes_to_all: bool,
}

impl SafetyGate {
    /// Creates a gate that asks `prompt` before each destructive operation.
    pub fn new(prompt: impl Prompt + 'static) -> Self {
        Self {
            prompt: Box::new(prompt),
            yes_to_all: false,
        }
    }

    /// Creates a gate with "yes to all" already latched.
    #[must_use]
    pub fn pre_authorized() -> Self {
        Self {
            prompt: Box::new(|_: &str| Answer::YesToAll),
            yes_to_all: true,
        }
    }

    /// Returns whether "yes to all" is latched.
    #[must_use]
    pub fn is_pre_authorized(&self) -> bool {
        self.yes_to_all
    }

    /// Decides whether `action` may run on `table`, which holds `rows` rows.
    ///
    /// Fails with [`SyncError::TableTooLargeForRebuild`] at or above
    /// [`REBUILD_ROW_LIMIT`], regardless of any prior authorization.
    pub fn check(&mut self, table: &str, rows: u64, action: &str) -> Result<Decision> {
        if rows >= REBUILD_ROW_LIMIT {
            return Err(SyncError::TableTooLargeForRebuild {
                table: table.to_string(),
                rows,
                limit: REBUILD_ROW_LIMIT,
            });
        }

        if self.yes_to_all {
            return Ok(Decision::Proceed);
        }

        let question = format!("{action} table {table} ({rows} rows)?");
        match self.prompt.confirm(&question) {
            Answer::Yes => Ok(Decision::Proceed),
            Answer::YesToAll => {
                self.yes_to_all = true;
                Ok(Decision::Proceed)
            }
            Answer::No => {
                warn!(table = %table, action = %action, "Declined by operator");
                Ok(Decision::Declined)
            }
        }
    }
}

impl std::fmt::Debug for SafetyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyGate")
            .field("yes_to_all", &self.yes_to_all)
            .finish_non_exhaustive()
    }
}
