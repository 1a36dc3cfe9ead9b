//! Reconciler
//!
//! The eight-step pipeline grounded on `original_source/src/dbsync/
//! runner.py`'s `run_sync`: fetch both schemas, diff them, apply additive
//! DDL unconditionally, gate destructive DDL on an operator prompt,
//! re-introspect the target, then hand off to Data Sync.

use tracing::{info, warn};

use crate::diff::{self, SchemaDiff};
use crate::error::Result;
use crate::inspector::Inspector;
use crate::interaction::InteractionPort;
use crate::schema::Snapshot;
use crate::sync::{self, SyncSummary};

/// Run the full reconciliation pipeline: schema diff, schema reconciliation,
/// then data sync. `reference` is the source of truth; `target` is brought
/// into line with it.
pub async fn run<RI, TI, P>(reference: &RI, target: &TI, interaction: &P) -> Result<SyncSummary>
where
    RI: Inspector,
    TI: Inspector,
    P: InteractionPort,
{
    info!("fetching reference and target schema snapshots");
    let reference_snapshot = reference.fetch_schema().await?;
    let target_snapshot = target.fetch_schema().await?;

    let schema_diff = diff::diff(&reference_snapshot, &target_snapshot);
    info!(
        new_tables = schema_diff.new_tables.len(),
        missing_tables = schema_diff.missing_tables.len(),
        "computed schema diff"
    );

    apply_additive_changes(&reference_snapshot, &schema_diff, target).await?;
    apply_destructive_changes(&schema_diff, target, interaction).await?;

    info!("re-introspecting target schema after applying changes");
    let reconciled_target = target.fetch_schema().await?;

    run_data_sync(&reference_snapshot, &reconciled_target, reference, target, interaction).await
}

/// Steps 3-4: create missing tables and add missing columns. Always
/// automatic, never gated by a prompt.
async fn apply_additive_changes<TI: Inspector>(
    reference: &Snapshot,
    schema_diff: &SchemaDiff,
    target: &TI,
) -> Result<()> {
    for table_name in &schema_diff.new_tables {
        let table = reference
            .table(table_name)
            .expect("diff only names tables present in the reference snapshot");
        info!(table = table_name, "creating table missing from target");
        target.create_table(table).await?;
    }

    for (table_name, columns) in &schema_diff.missing_columns {
        for column in columns {
            info!(table = table_name, column = %column.name, "adding column missing from target");
            target.add_column(table_name, column).await?;
        }
    }

    Ok(())
}

/// Steps 5-6: orphan columns and tables that exist only in the target.
/// Both are destructive and gated on operator confirmation.
async fn apply_destructive_changes<TI, P>(
    schema_diff: &SchemaDiff,
    target: &TI,
    interaction: &P,
) -> Result<()>
where
    TI: Inspector,
    P: InteractionPort,
{
    for (table_name, columns) in &schema_diff.orphan_columns {
        if interaction.confirm_destructive(columns)? {
            for column in columns {
                warn!(table = table_name, column = %column, "dropping orphan column by operator request");
                target.drop_column(table_name, column).await?;
            }
        } else {
            warn!(table = table_name, columns = ?columns, "keeping orphan columns by operator request");
        }
    }

    for table_name in &schema_diff.missing_tables {
        if interaction.confirm_destructive(std::slice::from_ref(table_name))? {
            warn!(table = table_name, "dropping target-only table by operator request");
            target.drop_table(table_name).await?;
        } else {
            warn!(table = table_name, "keeping target-only table by operator request");
        }
    }

    Ok(())
}

/// Step 8: run Data Sync over every table present in both the reference
/// and the freshly reconciled target snapshot.
async fn run_data_sync<RI, TI, P>(
    reference: &Snapshot,
    reconciled_target: &Snapshot,
    reference_inspector: &RI,
    target_inspector: &TI,
    interaction: &P,
) -> Result<SyncSummary>
where
    RI: Inspector,
    TI: Inspector,
    P: InteractionPort,
{
    let mut total = SyncSummary::default();

    for reference_table in reference.tables() {
        let Some(target_table) = reconciled_target.table(&reference_table.name) else {
            continue;
        };

        let summary = sync::sync_table(
            &reference_table.name,
            reference_table,
            target_table,
            reference_inspector,
            target_inspector,
            interaction,
        )
        .await?;

        total.rows_inserted += summary.rows_inserted;
        total.rows_updated += summary.rows_updated;
    }

    info!(
        rows_inserted = total.rows_inserted,
        rows_updated = total.rows_updated,
        "data sync complete"
    );
    Ok(total)
}
