//! Data Sync and sync-key selection
//!
//! Grounded on `original_source/src/dbsync/runner.py`'s `_select_sync_column`
//! and `_sync_data`: for every table present on both sides, pick a column
//! (or fall back to the target's primary key) to match rows by, then
//! insert rows missing from the target and update rows already present.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::Result;
use crate::inspector::Inspector;
use crate::interaction::{InteractionPort, SyncKeyCandidate};
use crate::schema::Table;
use crate::value::RowValue;

/// Running totals across every table processed by a data sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub rows_inserted: usize,
    pub rows_updated: usize,
}

/// Choose the column (or target primary key) used to match reference rows
/// against target rows for `table_name`. Returns `None` if no common
/// columns exist, or the operator declines every option.
pub async fn select_sync_key<RI, TI, P>(
    table_name: &str,
    reference_table: &Table,
    target_table: &Table,
    reference: &RI,
    target: &TI,
    interaction: &P,
) -> Result<Option<Vec<String>>>
where
    RI: Inspector,
    TI: Inspector,
    P: InteractionPort,
{
    let reference_cols: HashSet<&str> =
        reference_table.columns.iter().map(|c| c.name.as_str()).collect();
    let target_cols: HashSet<&str> =
        target_table.columns.iter().map(|c| c.name.as_str()).collect();

    let mut common: Vec<&str> = reference_cols.intersection(&target_cols).copied().collect();
    common.sort_unstable();

    if common.is_empty() {
        warn!(table = table_name, "no common columns, cannot select a sync key");
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for col in &common {
        if reference.is_column_unique(table_name, col).await?
            && target.is_column_unique(table_name, col).await?
        {
            candidates.push(col.to_string());
        }
    }

    if candidates.is_empty() {
        if !target_table.primary_key.is_empty() {
            info!(
                table = table_name,
                pk = ?target_table.primary_key,
                "no unique common columns, falling back to target's primary key"
            );
            return Ok(Some(target_table.primary_key.clone()));
        }
        warn!(table = table_name, "no unique common columns and no primary key, skipping");
        return Ok(None);
    }

    let offered: Vec<SyncKeyCandidate> = candidates
        .iter()
        .map(|c| SyncKeyCandidate {
            column: c.clone(),
            is_existing_primary_key: target_table.primary_key == vec![c.clone()],
        })
        .collect();

    let pk = if target_table.primary_key.is_empty() {
        None
    } else {
        Some(target_table.primary_key.as_slice())
    };

    interaction.choose_sync_key(table_name, &offered, pk)
}

/// Run Data Sync for `table_name`, already known to exist in both `R` and
/// `P'`. Returns the counts of rows inserted and updated.
pub async fn sync_table<RI, TI, P>(
    table_name: &str,
    reference_table: &Table,
    target_table: &Table,
    reference: &RI,
    target: &TI,
    interaction: &P,
) -> Result<SyncSummary>
where
    RI: Inspector,
    TI: Inspector,
    P: InteractionPort,
{
    let target_col_names: HashSet<&str> =
        target_table.columns.iter().map(|c| c.name.as_str()).collect();
    let shared_columns: Vec<String> = reference_table
        .columns
        .iter()
        .filter(|c| target_col_names.contains(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect();

    if shared_columns.is_empty() {
        warn!(table = table_name, "no shared columns, skipping data sync");
        return Ok(SyncSummary::default());
    }

    let Some(sync_key) = select_sync_key(
        table_name,
        reference_table,
        target_table,
        reference,
        target,
        interaction,
    )
    .await?
    else {
        warn!(table = table_name, "no usable sync key, skipping data sync");
        return Ok(SyncSummary::default());
    };

    info!(table = table_name, sync_key = ?sync_key, "syncing table data");

    let target_sync_values = target.fetch_key_values(table_name, &sync_key).await?;

    let target_pk = &target_table.primary_key;
    let target_pk_values = if target_pk.is_empty() {
        HashSet::new()
    } else {
        target.fetch_key_values(table_name, target_pk).await?
    };

    let rows = reference.fetch_rows(table_name, &shared_columns).await?;

    let mut missing_rows = Vec::new();
    let mut existing_rows = Vec::new();

    for row in rows {
        let sync_value: Vec<RowValue> = sync_key
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(RowValue::Null))
            .collect();

        if target_sync_values.contains(&sync_value) {
            existing_rows.push(row);
            continue;
        }

        let pk_projects_into_shared =
            target_pk.iter().all(|c| shared_columns.contains(c));
        if !target_pk.is_empty() && pk_projects_into_shared {
            let pk_value: Vec<RowValue> = target_pk
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(RowValue::Null))
                .collect();
            if target_pk_values.contains(&pk_value) {
                warn!(
                    table = table_name,
                    sync_key_value = ?sync_value,
                    "row missing under sync key but its primary key already exists, skipping"
                );
                continue;
            }
        }

        missing_rows.push(row);
    }

    let mut summary = SyncSummary::default();

    if !missing_rows.is_empty() {
        info!(table = table_name, count = missing_rows.len(), "inserting new rows");
        summary.rows_inserted = target
            .insert_rows(table_name, &shared_columns, missing_rows, interaction)
            .await?;
    }

    if !existing_rows.is_empty() {
        info!(table = table_name, count = existing_rows.len(), "updating existing rows");
        summary.rows_updated = target
            .update_rows(table_name, &sync_key, &shared_columns, &existing_rows)
            .await?;
    }

    Ok(summary)
}
