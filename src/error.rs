//! Error handling
//!
//! A single application-wide error type: one `thiserror`-derived enum
//! wrapping the driver errors this tool actually sees. There is no HTTP
//! response mapping here since this is a CLI, not a web service. Just the
//! "one enum, `#[from]` the driver errors" shape.

use thiserror::Error;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to build connection pool: {0}")]
    PoolBuild(#[from] deadpool_postgres::CreatePoolError),

    #[error("failed to obtain a connection: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("schema introspection failed: {0}")]
    Catalog(String),

    #[error("DDL statement failed on table {table}: {source}")]
    Ddl {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("DML statement failed on table {table}: {source}")]
    Dml {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("NOT NULL violation without a column name on table {0}")]
    UnresolvableNotNull(String),

    #[error("failed to read operator input: {0}")]
    Interaction(String),

    #[error("operator cancelled the run")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SyncError>;
