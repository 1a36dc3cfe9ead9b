//! Database inspection and mutation
//!
//! `Inspector` is the seam between the reconciliation logic and a live
//! PostgreSQL server, grounded column-for-column on the original tool's
//! `PostgresInspector` class: schema introspection, DDL, and row-level DML,
//! including its NOT NULL conflict recovery protocol. Kept as a native
//! async trait (stable Rust has no need for `async-trait` here, nothing
//! in this crate stores an `Inspector` as `dyn Trait`) so both the real
//! `PostgresInspector` and the in-memory `MockInspector` used by pipeline
//! tests can share call sites.

#[cfg(test)]
pub mod mock;
pub mod postgres;

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::interaction::InteractionPort;
use crate::schema::{Column, Snapshot, Table};
use crate::value::RowValue;

pub use postgres::PostgresInspector;

/// A fetched row, keyed by column name, the Rust analogue of the
/// original's `Mapping[str, Any]`.
pub type Row = HashMap<String, RowValue>;

/// Schema introspection, DDL, and row-level DML against one database.
pub trait Inspector {
    /// Fetch the full `public` schema: every table, its columns, and its
    /// declared primary key.
    async fn fetch_schema(&self) -> Result<Snapshot>;

    /// List every table name in the `public` schema.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Create a table from its schema, including a `PRIMARY KEY` clause
    /// when one is declared.
    async fn create_table(&self, table: &Table) -> Result<()>;

    /// Add a single column to an existing table.
    async fn add_column(&self, table_name: &str, column: &Column) -> Result<()>;

    /// Drop a table, cascading to dependent objects.
    async fn drop_table(&self, table_name: &str) -> Result<()>;

    /// Drop a column, cascading to dependent objects.
    async fn drop_column(&self, table_name: &str, column_name: &str) -> Result<()>;

    /// Drop the NOT NULL constraint on a column.
    async fn drop_not_null_constraint(&self, table_name: &str, column_name: &str) -> Result<()>;

    /// Fetch the distinct value tuples currently stored in `key_columns`,
    /// in column order. Returns an empty set if `key_columns` is empty.
    async fn fetch_key_values(
        &self,
        table_name: &str,
        key_columns: &[String],
    ) -> Result<HashSet<Vec<RowValue>>>;

    /// Whether every value currently stored in `column_name` is distinct
    /// and the column holds at least one row.
    async fn is_column_unique(&self, table_name: &str, column_name: &str) -> Result<bool>;

    /// Fetch every row of `table_name`, projected to `columns`. Returns an
    /// empty vector if `columns` is empty.
    async fn fetch_rows(&self, table_name: &str, columns: &[String]) -> Result<Vec<Row>>;

    /// Insert `rows` into `table_name` over `columns`. On a NOT NULL
    /// violation, consults `interaction` for how to proceed (memoized per
    /// table/column for the lifetime of this inspector) and retries.
    /// Returns the number of rows inserted.
    async fn insert_rows<I: InteractionPort>(
        &self,
        table_name: &str,
        columns: &[String],
        rows: Vec<Row>,
        interaction: &I,
    ) -> Result<usize>;

    /// Update rows in `table_name` matched by `sync_key`, setting every
    /// column in `columns` that is not itself part of `sync_key`. Returns
    /// the number of rows updated.
    async fn update_rows(
        &self,
        table_name: &str,
        sync_key: &[String],
        columns: &[String],
        rows: &[Row],
    ) -> Result<usize>;
}
