//! Schema model
//!
//! Pure data: column, table, and snapshot records produced by introspecting
//! a live PostgreSQL `public` schema. No behavior beyond construction and
//! lookup. All comparison lives in `diff.rs`, all I/O lives in `inspector`.

use std::collections::HashMap;

/// A single column of a table, as introspected from `pg_attribute` et al.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// PostgreSQL type expression as produced by `format_type`, e.g.
    /// `integer`, `numeric(10,2)`, `timestamp without time zone`.
    pub column_type: String,
    pub is_nullable: bool,
    /// SQL expression string (`pg_get_expr` output), absent if no default.
    pub default: Option<String>,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        column_type: impl Into<String>,
        is_nullable: bool,
        default: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            is_nullable,
            default,
        }
    }
}

/// A table: name, columns in attribute-number order, and the declared
/// primary-key column names in ordinal-position order.
///
/// Invariants: every `primary_key` name appears in `columns`; column names
/// are unique within `columns`. Both are upheld by the Inspector at
/// construction time (introspection queries already enforce them) and are
/// not re-validated here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>, primary_key: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// A capture of the `public` schema at a point in time: every table present
/// at the moment of introspection, in introspection order (the Inspector's
/// catalog queries are `ORDER BY table_name`, so this is alphabetical by
/// name for a live `PostgresInspector`, but `Snapshot` itself just preserves
/// whatever order it was built with). Data Sync iterates tables in this
/// order, so lookup by name must not disturb it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    tables: Vec<Table>,
    index_by_name: HashMap<String, usize>,
}

impl Snapshot {
    pub fn from_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        let tables: Vec<Table> = tables.into_iter().collect();
        let index_by_name = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self {
            tables,
            index_by_name,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.index_by_name.get(name).map(|&i| &self.tables[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_by_name.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
