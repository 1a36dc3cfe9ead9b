//! In-memory `Inspector` test double
//!
//! Lets the reconciler and data-sync pipelines be exercised end to end
//! without a running PostgreSQL server, the same way `tests/test_runner.py`
//! in the original tool swaps in `MagicMock()` inspectors for
//! `_compute_diff`/`_sync_data`. `MockInspector` instead keeps real,
//! mutable in-memory state so the same DDL/DML call sequence the real
//! inspector would run is exercised against a small fake database.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use super::{Inspector, Row};
use crate::error::{Result, SyncError};
use crate::interaction::{InteractionPort, NotNullDecision};
use crate::schema::{Column, Snapshot, Table};
use crate::value::RowValue;

#[derive(Debug, Clone, Default)]
struct TableState {
    table: Table,
    rows: Vec<Row>,
}

/// A fake single database: tables plus their rows, all in memory.
pub struct MockInspector {
    tables: RefCell<HashMap<String, TableState>>,
    not_null_decisions: RefCell<HashMap<(String, String), NotNullDecision>>,
}

impl MockInspector {
    pub fn new() -> Self {
        Self {
            tables: RefCell::new(HashMap::new()),
            not_null_decisions: RefCell::new(HashMap::new()),
        }
    }

    /// Seed a table definition with no rows.
    pub fn with_table(self, table: Table) -> Self {
        self.tables.borrow_mut().insert(
            table.name.clone(),
            TableState { table, rows: Vec::new() },
        );
        self
    }

    /// Seed a table's rows directly, bypassing `insert_rows`.
    pub fn with_rows(self, table_name: &str, rows: Vec<Row>) -> Self {
        if let Some(state) = self.tables.borrow_mut().get_mut(table_name) {
            state.rows = rows;
        }
        self
    }

    pub fn row_count(&self, table_name: &str) -> usize {
        self.tables
            .borrow()
            .get(table_name)
            .map(|s| s.rows.len())
            .unwrap_or(0)
    }

    pub fn rows(&self, table_name: &str) -> Vec<Row> {
        self.tables
            .borrow()
            .get(table_name)
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }
}

impl Default for MockInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector for MockInspector {
    async fn fetch_schema(&self) -> Result<Snapshot> {
        Ok(Snapshot::from_tables(
            self.tables.borrow().values().map(|s| s.table.clone()),
        ))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.borrow().keys().cloned().collect())
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        self.tables.borrow_mut().insert(
            table.name.clone(),
            TableState { table: table.clone(), rows: Vec::new() },
        );
        Ok(())
    }

    async fn add_column(&self, table_name: &str, column: &Column) -> Result<()> {
        let mut tables = self.tables.borrow_mut();
        let state = tables
            .get_mut(table_name)
            .ok_or_else(|| SyncError::Catalog(format!("no such table: {table_name}")))?;
        state.table.columns.push(column.clone());
        Ok(())
    }

    async fn drop_table(&self, table_name: &str) -> Result<()> {
        self.tables.borrow_mut().remove(table_name);
        Ok(())
    }

    async fn drop_column(&self, table_name: &str, column_name: &str) -> Result<()> {
        let mut tables = self.tables.borrow_mut();
        if let Some(state) = tables.get_mut(table_name) {
            state.table.columns.retain(|c| c.name != column_name);
            for row in &mut state.rows {
                row.remove(column_name);
            }
        }
        Ok(())
    }

    async fn drop_not_null_constraint(&self, table_name: &str, column_name: &str) -> Result<()> {
        let mut tables = self.tables.borrow_mut();
        if let Some(state) = tables.get_mut(table_name) {
            if let Some(col) = state.table.columns.iter_mut().find(|c| c.name == column_name) {
                col.is_nullable = true;
            }
        }
        Ok(())
    }

    async fn fetch_key_values(
        &self,
        table_name: &str,
        key_columns: &[String],
    ) -> Result<HashSet<Vec<RowValue>>> {
        if key_columns.is_empty() {
            return Ok(HashSet::new());
        }
        let tables = self.tables.borrow();
        let Some(state) = tables.get(table_name) else {
            return Ok(HashSet::new());
        };
        Ok(state
            .rows
            .iter()
            .map(|row| {
                key_columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(RowValue::Null))
                    .collect()
            })
            .collect())
    }

    async fn is_column_unique(&self, table_name: &str, column_name: &str) -> Result<bool> {
        let tables = self.tables.borrow();
        let Some(state) = tables.get(table_name) else {
            return Ok(false);
        };
        if state.rows.is_empty() {
            return Ok(false);
        }
        let mut seen = HashSet::new();
        for row in &state.rows {
            let value = row.get(column_name).cloned().unwrap_or(RowValue::Null);
            if value.is_null() || !seen.insert(value) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn fetch_rows(&self, table_name: &str, columns: &[String]) -> Result<Vec<Row>> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.borrow();
        let Some(state) = tables.get(table_name) else {
            return Ok(Vec::new());
        };
        Ok(state
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(RowValue::Null)))
                    .collect()
            })
            .collect())
    }

    async fn insert_rows<I: InteractionPort>(
        &self,
        table_name: &str,
        columns: &[String],
        rows: Vec<Row>,
        interaction: &I,
    ) -> Result<usize> {
        if columns.is_empty() || rows.is_empty() {
            return Ok(0);
        }

        let inserted = rows.len();
        for row in rows {
            let violated = {
                let tables = self.tables.borrow();
                let state = tables
                    .get(table_name)
                    .ok_or_else(|| SyncError::Catalog(format!("no such table: {table_name}")))?;
                state.table.columns.iter().find(|col| {
                    !col.is_nullable
                        && columns.contains(&col.name)
                        && row.get(&col.name).map(RowValue::is_null).unwrap_or(true)
                })
                .map(|col| col.name.clone())
            };

            if let Some(column) = violated {
                let decision = {
                    let mut memo = self.not_null_decisions.borrow_mut();
                    match memo.get(&(table_name.to_string(), column.clone())) {
                        Some(d) => d.clone(),
                        None => {
                            let decision = interaction.resolve_not_null(table_name, &column)?;
                            memo.insert((table_name.to_string(), column.clone()), decision.clone());
                            decision
                        }
                    }
                };
                match decision {
                    NotNullDecision::DropConstraint => {
                        self.drop_not_null_constraint(table_name, &column).await?;
                        let mut tables = self.tables.borrow_mut();
                        tables.get_mut(table_name).unwrap().rows.push(row);
                    }
                    NotNullDecision::SubstituteDefault(value) => {
                        let mut row = row;
                        row.insert(column, RowValue::Text(value));
                        let mut tables = self.tables.borrow_mut();
                        tables.get_mut(table_name).unwrap().rows.push(row);
                    }
                }
            } else {
                let mut tables = self.tables.borrow_mut();
                tables.get_mut(table_name).unwrap().rows.push(row);
            }
        }

        Ok(inserted)
    }

    async fn update_rows(
        &self,
        table_name: &str,
        sync_key: &[String],
        columns: &[String],
        rows: &[Row],
    ) -> Result<usize> {
        if columns.is_empty() || rows.is_empty() || sync_key.is_empty() {
            return Ok(0);
        }
        let update_cols: Vec<&String> = columns.iter().filter(|c| !sync_key.contains(c)).collect();
        if update_cols.is_empty() {
            return Ok(0);
        }

        let mut tables = self.tables.borrow_mut();
        let Some(state) = tables.get_mut(table_name) else {
            return Ok(0);
        };

        let mut updated = 0;
        for incoming in rows {
            let key: Vec<&RowValue> = sync_key.iter().map(|c| &incoming[c]).collect();
            if let Some(existing) = state.rows.iter_mut().find(|r| {
                sync_key.iter().zip(&key).all(|(c, v)| r.get(c) == Some(*v))
            }) {
                for c in &update_cols {
                    existing.insert((*c).clone(), incoming[*c].clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::ScriptedInteractionPort;

    fn users_table() -> Table {
        Table::new(
            "users",
            vec![
                Column::new("id", "integer", false, None),
                Column::new("email", "text", false, None),
            ],
            vec!["id".to_string()],
        )
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trips() {
        let inspector = MockInspector::new().with_table(users_table());
        let interaction = ScriptedInteractionPort::new();

        let row: Row = [
            ("id".to_string(), RowValue::Int(1)),
            ("email".to_string(), RowValue::Text("a@example.com".into())),
        ]
        .into_iter()
        .collect();

        let inserted = inspector
            .insert_rows(
                "users",
                &["id".to_string(), "email".to_string()],
                vec![row],
                &interaction,
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(inspector.row_count("users"), 1);
    }

    #[tokio::test]
    async fn not_null_violation_consults_interaction_once_per_column() {
        let inspector = MockInspector::new().with_table(users_table());
        let interaction = ScriptedInteractionPort::new()
            .with_not_null_decisions([NotNullDecision::SubstituteDefault("unknown@x.com".into())]);

        let row_a: Row = [("id".to_string(), RowValue::Int(1))].into_iter().collect();
        let row_b: Row = [("id".to_string(), RowValue::Int(2))].into_iter().collect();

        inspector
            .insert_rows(
                "users",
                &["id".to_string(), "email".to_string()],
                vec![row_a],
                &interaction,
            )
            .await
            .unwrap();
        inspector
            .insert_rows(
                "users",
                &["id".to_string(), "email".to_string()],
                vec![row_b],
                &interaction,
            )
            .await
            .unwrap();

        let rows = inspector.rows("users");
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|r| r.get("email") == Some(&RowValue::Text("unknown@x.com".into()))));
    }

    #[tokio::test]
    async fn not_null_violation_in_one_batch_prompts_only_for_the_first_row() {
        let inspector = MockInspector::new().with_table(users_table());
        let interaction = ScriptedInteractionPort::new()
            .with_not_null_decisions([NotNullDecision::SubstituteDefault("0".into())]);

        let row_a: Row = [("id".to_string(), RowValue::Int(1))].into_iter().collect();
        let row_b: Row = [("id".to_string(), RowValue::Int(2))].into_iter().collect();

        let inserted = inspector
            .insert_rows(
                "users",
                &["id".to_string(), "email".to_string()],
                vec![row_a, row_b],
                &interaction,
            )
            .await
            .unwrap();

        assert_eq!(inserted, 2);
        let rows = inspector.rows("users");
        assert!(rows
            .iter()
            .all(|r| r.get("email") == Some(&RowValue::Text("0".into()))));
    }

    #[tokio::test]
    async fn update_rows_matches_by_sync_key() {
        let inspector = MockInspector::new().with_table(users_table()).with_rows(
            "users",
            vec![[
                ("id".to_string(), RowValue::Int(1)),
                ("email".to_string(), RowValue::Text("old@example.com".into())),
            ]
            .into_iter()
            .collect()],
        );

        let incoming: Row = [
            ("id".to_string(), RowValue::Int(1)),
            ("email".to_string(), RowValue::Text("new@example.com".into())),
        ]
        .into_iter()
        .collect();

        let updated = inspector
            .update_rows(
                "users",
                &["id".to_string()],
                &["id".to_string(), "email".to_string()],
                &[incoming],
            )
            .await
            .unwrap();

        assert_eq!(updated, 1);
        assert_eq!(
            inspector.rows("users")[0].get("email"),
            Some(&RowValue::Text("new@example.com".into()))
        );
    }
}
