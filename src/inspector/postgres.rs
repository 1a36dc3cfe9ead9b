//! Live PostgreSQL `Inspector`
//!
//! Every query and statement here is a direct port of
//! `PostgresInspector` in the original tool: same catalog queries, same
//! `CREATE TABLE`/`ALTER TABLE` shapes, same SERIAL rewrite rule, same
//! NOT NULL recovery protocol. The connection pool is pinned to one
//! connection (mirroring `psycopg.connect(...)` opening a single
//! autocommit connection per call) since the pipeline never issues two
//! operations against the same database concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info, warn};

use super::{Inspector, Row};
use crate::error::{Result, SyncError};
use crate::interaction::{InteractionPort, NotNullDecision};
use crate::schema::{Column, Snapshot, Table};
use crate::value::RowValue;

const COLUMNS_QUERY: &str = "
SELECT c.relname AS table_name,
       a.attname AS column_name,
       format_type(a.atttypid, a.atttypmod) AS column_type,
       NOT a.attnotnull AS is_nullable,
       pg_get_expr(ad.adbin, ad.adrelid) AS default_expression
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_attrdef ad ON ad.adrelid = a.attrelid AND ad.adnum = a.attnum
WHERE n.nspname = 'public'
  AND c.relkind = 'r'
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY c.relname, a.attnum;
";

const PK_QUERY: &str = "
SELECT tc.table_name,
       kcu.column_name,
       kcu.ordinal_position
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
  AND tc.table_schema = kcu.table_schema
WHERE tc.table_schema = 'public'
  AND tc.constraint_type = 'PRIMARY KEY'
ORDER BY tc.table_name, kcu.ordinal_position;
";

const LIST_TABLES_QUERY: &str =
    "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = 'public';";

/// Per-(table, column) NOT NULL recovery decisions made so far, remembered
/// for the remainder of this inspector's lifetime so the operator is
/// never asked about the same column twice in one run.
type NotNullMemo = Mutex<HashMap<(String, String), NotNullDecision>>;

pub struct PostgresInspector {
    pool: Pool,
    not_null_decisions: NotNullMemo,
}

impl PostgresInspector {
    /// Build an inspector backed by a fresh, single-connection pool to
    /// `dsn`. One connection is sufficient and intentional: this crate
    /// never issues two operations against the same database at once.
    pub fn connect(dsn: &str) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(dsn.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: 1,
            ..PoolConfig::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(SyncError::PoolBuild)?;

        Ok(Self {
            pool,
            not_null_decisions: Mutex::new(HashMap::new()),
        })
    }

    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Render a column's `CREATE TABLE`/`ALTER TABLE` definition fragment,
    /// applying the SERIAL rewrite: an integer column whose default
    /// expression mentions `nextval` is emitted as bare `SERIAL`, dropping
    /// any NOT NULL/DEFAULT clause (SERIAL already implies both).
    fn column_definition(column: &Column) -> String {
        let is_serial = column
            .default
            .as_deref()
            .map(|d| d.to_ascii_lowercase().contains("nextval"))
            .unwrap_or(false)
            && column.column_type.to_ascii_lowercase().contains("integer");

        if is_serial {
            return format!("{} SERIAL", Self::quote_ident(&column.name));
        }

        let mut def = format!("{} {}", Self::quote_ident(&column.name), column.column_type);
        if !column.is_nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }

    async fn execute(&self, table_name: &str, statement: &str) -> Result<()> {
        debug!(sql = statement, "executing statement");
        let client = self.pool.get().await.map_err(SyncError::Pool)?;
        client
            .execute(statement, &[])
            .await
            .map_err(|source| SyncError::Ddl {
                table: table_name.to_string(),
                source,
            })?;
        Ok(())
    }

    /// `None` if `err` isn't a NOT NULL violation at all; `Some(None)` if it
    /// is one but the driver didn't report which column, which is itself a
    /// fatal condition (the protocol has nothing to memoize a decision
    /// against); `Some(Some(column))` otherwise.
    fn not_null_violation(err: &tokio_postgres::Error) -> Option<Option<String>> {
        let db_err = err.as_db_error()?;
        if db_err.code() != &tokio_postgres::error::SqlState::NOT_NULL_VIOLATION {
            return None;
        }
        Some(db_err.column().map(str::to_string))
    }
}

impl Inspector for PostgresInspector {
    async fn fetch_schema(&self) -> Result<Snapshot> {
        let client = self.pool.get().await.map_err(SyncError::Pool)?;

        // `COLUMNS_QUERY` is `ORDER BY c.relname, a.attnum`, so the first
        // time each table name appears fixes its position in `table_order`.
        // `Snapshot` iterates tables in the order it was built with, so
        // that order must survive the HashMap grouping below.
        let mut table_order: Vec<String> = Vec::new();
        let mut columns_by_table: HashMap<String, Vec<Column>> = HashMap::new();
        for row in client
            .query(COLUMNS_QUERY, &[])
            .await
            .map_err(|e| SyncError::Catalog(e.to_string()))?
        {
            let table_name: String = row.get("table_name");
            if !columns_by_table.contains_key(&table_name) {
                table_order.push(table_name.clone());
            }
            columns_by_table.entry(table_name).or_default().push(Column::new(
                row.get::<_, String>("column_name"),
                row.get::<_, String>("column_type"),
                row.get::<_, bool>("is_nullable"),
                row.get::<_, Option<String>>("default_expression"),
            ));
        }

        let mut primary_keys: HashMap<String, Vec<String>> = HashMap::new();
        for row in client
            .query(PK_QUERY, &[])
            .await
            .map_err(|e| SyncError::Catalog(e.to_string()))?
        {
            let table_name: String = row.get("table_name");
            primary_keys
                .entry(table_name)
                .or_default()
                .push(row.get("column_name"));
        }

        let tables = table_order.into_iter().map(|name| {
            let columns = columns_by_table.remove(&name).unwrap_or_default();
            let primary_key = primary_keys.remove(&name).unwrap_or_default();
            Table::new(name, columns, primary_key)
        });

        Ok(Snapshot::from_tables(tables))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.pool.get().await.map_err(SyncError::Pool)?;
        let rows = client
            .query(LIST_TABLES_QUERY, &[])
            .await
            .map_err(|e| SyncError::Catalog(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        let mut defs: Vec<String> = table.columns.iter().map(Self::column_definition).collect();
        if !table.primary_key.is_empty() {
            let pk_cols: Vec<String> = table.primary_key.iter().map(|c| Self::quote_ident(c)).collect();
            defs.push(format!("PRIMARY KEY ({})", pk_cols.join(", ")));
        }

        let statement = format!(
            "CREATE TABLE {} ({})",
            Self::quote_ident(&table.name),
            defs.join(", ")
        );
        info!(table = %table.name, "creating missing table");
        self.execute(&table.name, &statement).await
    }

    async fn add_column(&self, table_name: &str, column: &Column) -> Result<()> {
        let mut def = format!("{} {}", Self::quote_ident(&column.name), column.column_type);
        if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        let statement = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            Self::quote_ident(table_name),
            def
        );
        info!(table = table_name, column = %column.name, "adding missing column");
        self.execute(table_name, &statement).await
    }

    async fn drop_table(&self, table_name: &str) -> Result<()> {
        let statement = format!("DROP TABLE {} CASCADE", Self::quote_ident(table_name));
        warn!(table = table_name, "dropping table by operator request");
        self.execute(table_name, &statement).await
    }

    async fn drop_column(&self, table_name: &str, column_name: &str) -> Result<()> {
        let statement = format!(
            "ALTER TABLE {} DROP COLUMN {} CASCADE",
            Self::quote_ident(table_name),
            Self::quote_ident(column_name)
        );
        warn!(table = table_name, column = column_name, "dropping column by operator request");
        self.execute(table_name, &statement).await
    }

    async fn drop_not_null_constraint(&self, table_name: &str, column_name: &str) -> Result<()> {
        let statement = format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
            Self::quote_ident(table_name),
            Self::quote_ident(column_name)
        );
        self.execute(table_name, &statement).await
    }

    async fn fetch_key_values(
        &self,
        table_name: &str,
        key_columns: &[String],
    ) -> Result<HashSet<Vec<RowValue>>> {
        if key_columns.is_empty() {
            return Ok(HashSet::new());
        }

        let projection: Vec<String> = key_columns.iter().map(|c| Self::quote_ident(c)).collect();
        let statement = format!(
            "SELECT {} FROM {}",
            projection.join(", "),
            Self::quote_ident(table_name)
        );

        let client = self.pool.get().await.map_err(SyncError::Pool)?;
        let rows = client
            .query(&statement, &[])
            .await
            .map_err(|e| SyncError::Catalog(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| (0..key_columns.len()).map(|i| row.get(i)).collect())
            .collect())
    }

    async fn is_column_unique(&self, table_name: &str, column_name: &str) -> Result<bool> {
        let ident = Self::quote_ident(column_name);
        let statement = format!(
            "SELECT COUNT({ident}) = COUNT(DISTINCT {ident}) AND COUNT({ident}) > 0 FROM {}",
            Self::quote_ident(table_name)
        );
        let client = self.pool.get().await.map_err(SyncError::Pool)?;
        let row = client
            .query_opt(&statement, &[])
            .await
            .map_err(|e| SyncError::Catalog(e.to_string()))?;
        Ok(row.map(|r| r.get::<_, bool>(0)).unwrap_or(false))
    }

    async fn fetch_rows(&self, table_name: &str, columns: &[String]) -> Result<Vec<Row>> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let projection: Vec<String> = columns.iter().map(|c| Self::quote_ident(c)).collect();
        let statement = format!(
            "SELECT {} FROM {}",
            projection.join(", "),
            Self::quote_ident(table_name)
        );

        let client = self.pool.get().await.map_err(SyncError::Pool)?;
        let rows = client
            .query(&statement, &[])
            .await
            .map_err(|e| SyncError::Catalog(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), row.get::<_, RowValue>(i)))
                    .collect::<Row>()
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
            debug!(table = table_name, "nothing to insert");
            return Ok(0);
        }

        let projection: Vec<String> = columns.iter().map(|c| Self::quote_ident(c)).collect();
        let placeholders: Vec<String> =
            (1..=columns.len()).map(|i| format!("${i}")).collect();
        let statement = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::quote_ident(table_name),
            projection.join(", "),
            placeholders.join(", ")
        );

        let mut client = self.pool.get().await.map_err(SyncError::Pool)?;
        let transaction = client
            .transaction()
            .await
            .map_err(|source| SyncError::Dml { table: table_name.to_string(), source })?;
        let prepared = transaction
            .prepare(&statement)
            .await
            .map_err(|source| SyncError::Dml { table: table_name.to_string(), source })?;

        for row in &rows {
            let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = columns
                .iter()
                .map(|c| &row[c] as &(dyn tokio_postgres::types::ToSql + Sync))
                .collect();

            if let Err(err) = transaction.execute(&prepared, &params).await {
                let violation = Self::not_null_violation(&err);

                // Rollback is automatic when the transaction is dropped, so
                // every row this batch already executed is undone here; the
                // retry below is free to resubmit the whole original `rows`
                // rather than some unconsumed remainder.
                drop(transaction);
                drop(client);

                return match violation {
                    Some(Some(column)) => {
                        warn!(table = table_name, column = %column, "hit NOT NULL violation inserting row");
                        let decision = {
                            let mut memo = self.not_null_decisions.lock().unwrap();
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
                                Box::pin(self.insert_rows(table_name, columns, rows, interaction)).await
                            }
                            NotNullDecision::SubstituteDefault(value) => {
                                let updated = substitute_null(&column, rows, &value);
                                Box::pin(self.insert_rows(table_name, columns, updated, interaction)).await
                            }
                        }
                    }
                    Some(None) => Err(SyncError::UnresolvableNotNull(table_name.to_string())),
                    None => Err(SyncError::Dml { table: table_name.to_string(), source: err }),
                };
            }
        }

        transaction
            .commit()
            .await
            .map_err(|source| SyncError::Dml { table: table_name.to_string(), source })?;

        info!(table = table_name, count = rows.len(), "inserted rows");
        Ok(rows.len())
    }

    async fn update_rows(
        &self,
        table_name: &str,
        sync_key: &[String],
        columns: &[String],
        rows: &[Row],
    ) -> Result<usize> {
        if columns.is_empty() || rows.is_empty() || sync_key.is_empty() {
            debug!(table = table_name, "nothing to update");
            return Ok(0);
        }

        let update_cols: Vec<&String> = columns.iter().filter(|c| !sync_key.contains(c)).collect();
        if update_cols.is_empty() {
            warn!(table = table_name, "no columns to update besides the sync key");
            return Ok(0);
        }

        let mut placeholder = 0usize;
        let set_clause: Vec<String> = update_cols
            .iter()
            .map(|c| {
                placeholder += 1;
                format!("{} = ${}", Self::quote_ident(c), placeholder)
            })
            .collect();
        let where_clause: Vec<String> = sync_key
            .iter()
            .map(|c| {
                placeholder += 1;
                format!("{} = ${}", Self::quote_ident(c), placeholder)
            })
            .collect();

        let statement = format!(
            "UPDATE {} SET {} WHERE {}",
            Self::quote_ident(table_name),
            set_clause.join(", "),
            where_clause.join(" AND ")
        );

        let client = self.pool.get().await.map_err(SyncError::Pool)?;
        let prepared = client
            .prepare(&statement)
            .await
            .map_err(|source| SyncError::Dml { table: table_name.to_string(), source })?;

        for row in rows {
            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = Vec::new();
            for c in &update_cols {
                params.push(&row[*c]);
            }
            for c in sync_key {
                params.push(&row[c]);
            }
            client
                .execute(&prepared, &params)
                .await
                .map_err(|source| SyncError::Dml { table: table_name.to_string(), source })?;
        }

        info!(table = table_name, count = rows.len(), "updated rows");
        Ok(rows.len())
    }
}

fn substitute_null(column_name: &str, rows: Vec<Row>, value: &str) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            let needs_default = row
                .get(column_name)
                .map(RowValue::is_null)
                .unwrap_or(false);
            if needs_default {
                row.insert(column_name.to_string(), RowValue::Text(value.to_string()));
            }
            row
        })
        .collect()
}
