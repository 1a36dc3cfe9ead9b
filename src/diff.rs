//! Schema Diff Engine
//!
//! A pure function over two snapshots. The comparison is presence-only:
//! it answers "what tables/columns need to be created to bring target up
//! to date with reference", nothing more. Type changes, nullability
//! changes, and default-expression changes are intentionally not diffed,
//! matching the operator's use case (adding new fields, not altering
//! existing ones).

use std::collections::HashMap;

use crate::schema::{Column, Snapshot};

/// Structural delta between a reference snapshot and a target snapshot.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    /// Tables present in reference but not in target.
    pub new_tables: Vec<String>,
    /// Tables present in target but not in reference.
    pub missing_tables: Vec<String>,
    /// Per-table column names present in target but not reference, sorted.
    pub orphan_columns: HashMap<String, Vec<String>>,
    /// Per-table columns present in reference but not target, in reference
    /// column order.
    pub missing_columns: HashMap<String, Vec<Column>>,
}

/// Compare a reference snapshot against a target snapshot.
pub fn diff(reference: &Snapshot, target: &Snapshot) -> SchemaDiff {
    let mut result = SchemaDiff::default();

    for table in reference.tables() {
        let Some(target_table) = target.table(&table.name) else {
            result.new_tables.push(table.name.clone());
            continue;
        };

        let mut orphan: Vec<String> = target_table
            .columns
            .iter()
            .filter(|c| !table.has_column(&c.name))
            .map(|c| c.name.clone())
            .collect();
        if !orphan.is_empty() {
            orphan.sort();
            result.orphan_columns.insert(table.name.clone(), orphan);
        }

        let missing: Vec<Column> = table
            .columns
            .iter()
            .filter(|c| !target_table.has_column(&c.name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            result.missing_columns.insert(table.name.clone(), missing);
        }
    }

    for table in target.tables() {
        if !reference.contains(&table.name) {
            result.missing_tables.push(table.name.clone());
        }
    }

    result
}
