//! Operator interaction
//!
//! Every point in the reconciliation pipeline that needs a human decision:
//! confirming a destructive drop, picking a sync key, resolving a NOT NULL
//! conflict, goes through this trait. Pulling it out of the inspector and
//! the reconciler (the original tool calls `input()`/`print()` straight
//! from `PostgresInspector`/`runner.py`) is what makes both testable without
//! a terminal attached: tests substitute `ScriptedInteractionPort` for a
//! queue of canned answers, the same double pattern the sibling tool
//! `database-replicator` uses for its own confirmation prompts.

use std::io;

use crate::error::{Result, SyncError};

/// Map a `dialoguer` I/O error onto the application error type. Ctrl-C or
/// end-of-input while a prompt is open means the operator cancelled the
/// run; anything else is an ordinary I/O failure.
fn map_prompt_error(err: io::Error) -> SyncError {
    match err.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::UnexpectedEof => SyncError::Cancelled,
        _ => SyncError::Interaction(err.to_string()),
    }
}

/// How an operator chose to resolve a NOT NULL constraint violation hit
/// while inserting rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotNullDecision {
    /// Drop the NOT NULL constraint on the column and retry the insert.
    DropConstraint,
    /// Replace NULLs in the column with this literal value and retry.
    SubstituteDefault(String),
}

/// A sync-key candidate offered to the operator, alongside whether it
/// happens to be the target table's existing declared primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncKeyCandidate {
    pub column: String,
    pub is_existing_primary_key: bool,
}

/// All points of operator interaction in the pipeline.
pub trait InteractionPort {
    /// Ask whether to discard (drop) the named objects from the target
    /// database. `y` confirms, anything else (including a bare Enter)
    /// declines, matching the original's `[y/N]` prompt default.
    fn confirm_destructive(&self, objects: &[String]) -> Result<bool>;

    /// Offer a set of unique-column candidates for a table's sync key,
    /// plus an optional fallback to the target's existing primary key.
    /// Returns `None` if the operator declines to pick one (no candidates
    /// or an explicit skip).
    fn choose_sync_key(
        &self,
        table_name: &str,
        candidates: &[SyncKeyCandidate],
        existing_primary_key: Option<&[String]>,
    ) -> Result<Option<Vec<String>>>;

    /// Ask how to resolve a NOT NULL violation hit inserting into
    /// `table_name.column_name`.
    fn resolve_not_null(&self, table_name: &str, column_name: &str) -> Result<NotNullDecision>;
}

/// Real operator interaction over stdin/stdout, via `dialoguer`.
pub struct StdinInteractionPort;

impl InteractionPort for StdinInteractionPort {
    fn confirm_destructive(&self, objects: &[String]) -> Result<bool> {
        let prompt = format!("Discard {} from the target database?", objects.join(", "));
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|dialoguer::Error::IO(err)| map_prompt_error(err))
    }

    fn choose_sync_key(
        &self,
        table_name: &str,
        candidates: &[SyncKeyCandidate],
        existing_primary_key: Option<&[String]>,
    ) -> Result<Option<Vec<String>>> {
        if candidates.is_empty() {
            return Ok(existing_primary_key.map(|pk| pk.to_vec()));
        }

        let mut items: Vec<String> = candidates
            .iter()
            .map(|c| {
                if c.is_existing_primary_key {
                    format!("{} (PRIMARY KEY)", c.column)
                } else {
                    c.column.clone()
                }
            })
            .collect();

        let fallback_offered = match existing_primary_key {
            Some(pk) if !pk.is_empty() && !candidates.iter().any(|c| c.is_existing_primary_key) => {
                items.push(format!("use current primary key: {}", pk.join(", ")));
                true
            }
            _ => false,
        };

        let prompt = format!("Table '{table_name}': choose a sync column");
        let selection = dialoguer::Select::new()
            .with_prompt(prompt)
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(|dialoguer::Error::IO(err)| map_prompt_error(err))?;

        Ok(match selection {
            None => None,
            Some(idx) if fallback_offered && idx == items.len() - 1 => {
                existing_primary_key.map(|pk| pk.to_vec())
            }
            Some(idx) => Some(vec![candidates[idx].column.clone()]),
        })
    }

    fn resolve_not_null(&self, table_name: &str, column_name: &str) -> Result<NotNullDecision> {
        let prompt = format!(
            "Column \"{column_name}\" on table \"{table_name}\" cannot be NULL. \
             Drop the NOT NULL constraint, or supply a default value?"
        );
        let options = ["Drop the NOT NULL constraint", "Supply a default value"];
        let choice = dialoguer::Select::new()
            .with_prompt(prompt)
            .items(&options)
            .default(0)
            .interact()
            .map_err(|dialoguer::Error::IO(err)| map_prompt_error(err))?;

        if choice == 0 {
            return Ok(NotNullDecision::DropConstraint);
        }

        let value: String = dialoguer::Input::new()
            .with_prompt(format!("Default value for {table_name}.{column_name}"))
            .interact_text()
            .map_err(|dialoguer::Error::IO(err)| map_prompt_error(err))?;
        Ok(NotNullDecision::SubstituteDefault(value))
    }
}

/// Test double driven by a pre-scripted sequence of answers, consumed in
/// call order. Panics (failing the test loudly) if more calls are made
/// than answers were scripted. A silent `None`/default here would hide a
/// pipeline step the test didn't anticipate.
#[cfg(test)]
pub struct ScriptedInteractionPort {
    confirmations: std::cell::RefCell<std::collections::VecDeque<bool>>,
    sync_keys: std::cell::RefCell<std::collections::VecDeque<Option<Vec<String>>>>,
    not_null: std::cell::RefCell<std::collections::VecDeque<NotNullDecision>>,
}

#[cfg(test)]
impl ScriptedInteractionPort {
    pub fn new() -> Self {
        Self {
            confirmations: std::cell::RefCell::new(Default::default()),
            sync_keys: std::cell::RefCell::new(Default::default()),
            not_null: std::cell::RefCell::new(Default::default()),
        }
    }

    pub fn with_confirmations(mut self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.confirmations = std::cell::RefCell::new(answers.into_iter().collect());
        self
    }

    pub fn with_sync_keys(mut self, answers: impl IntoIterator<Item = Option<Vec<String>>>) -> Self {
        self.sync_keys = std::cell::RefCell::new(answers.into_iter().collect());
        self
    }

    pub fn with_not_null_decisions(mut self, answers: impl IntoIterator<Item = NotNullDecision>) -> Self {
        self.not_null = std::cell::RefCell::new(answers.into_iter().collect());
        self
    }
}

#[cfg(test)]
impl Default for ScriptedInteractionPort {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl InteractionPort for ScriptedInteractionPort {
    fn confirm_destructive(&self, _objects: &[String]) -> Result<bool> {
        Ok(self
            .confirmations
            .borrow_mut()
            .pop_front()
            .expect("no scripted confirmation answer left"))
    }

    fn choose_sync_key(
        &self,
        _table_name: &str,
        _candidates: &[SyncKeyCandidate],
        _existing_primary_key: Option<&[String]>,
    ) -> Result<Option<Vec<String>>> {
        Ok(self
            .sync_keys
            .borrow_mut()
            .pop_front()
            .expect("no scripted sync key answer left"))
    }

    fn resolve_not_null(&self, _table_name: &str, _column_name: &str) -> Result<NotNullDecision> {
        Ok(self
            .not_null
            .borrow_mut()
            .pop_front()
            .expect("no scripted not-null decision left"))
    }
}
