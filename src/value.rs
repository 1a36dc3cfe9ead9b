//! Dynamic row values
//!
//! Rows fetched from either database are untyped at the point we read
//! them: a generic `fetch_rows` has no compile-time knowledge of a
//! table's column types. `RowValue` is the runtime-typed cell that lets
//! the same insert/update code path carry any scalar PostgreSQL value,
//! the same way the original tool carried Python's dynamically typed
//! values straight out of `asyncpg`/`psycopg`.
//!
//! `RowValue` implements `postgres_types::ToSql`/`FromSql` by delegating to
//! whichever concrete Rust type the variant wraps, and is `Eq + Hash` so
//! whole rows (as `Vec<RowValue>` or tuples of columns) can live in a
//! `HashSet` for primary-key/sync-key comparisons.

use std::error::Error;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres_types::{FromSql, IsNull, ToSql, Type};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A single column value, typed just precisely enough to round-trip
/// through `tokio-postgres` without losing information needed for a
/// later `INSERT`/`UPDATE`.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    /// `numeric` columns, decoded via `rust_decimal` to avoid the
    /// precision loss a binary float would introduce.
    Numeric(Decimal),
    Text(String),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Eq for RowValue {}

impl std::hash::Hash for RowValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            RowValue::Null => {}
            RowValue::Bool(v) => v.hash(state),
            RowValue::SmallInt(v) => v.hash(state),
            RowValue::Int(v) => v.hash(state),
            RowValue::BigInt(v) => v.hash(state),
            // Floats hash by bit pattern: two RowValues built from the same
            // literal compare and hash consistently, which is all set
            // membership here requires.
            RowValue::Real(v) => v.to_bits().hash(state),
            RowValue::Double(v) => v.to_bits().hash(state),
            RowValue::Numeric(v) => v.hash(state),
            RowValue::Text(v) => v.hash(state),
            RowValue::Timestamp(v) => v.hash(state),
            RowValue::TimestampTz(v) => v.hash(state),
            RowValue::Date(v) => v.hash(state),
            RowValue::Uuid(v) => v.hash(state),
            RowValue::Json(v) => v.to_string().hash(state),
        }
    }
}

impl RowValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }
}

impl ToSql for RowValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            RowValue::Null => Ok(IsNull::Yes),
            RowValue::Bool(v) => v.to_sql(ty, out),
            RowValue::SmallInt(v) => v.to_sql(ty, out),
            RowValue::Int(v) => v.to_sql(ty, out),
            RowValue::BigInt(v) => v.to_sql(ty, out),
            RowValue::Real(v) => v.to_sql(ty, out),
            RowValue::Double(v) => v.to_sql(ty, out),
            RowValue::Numeric(v) => v.to_sql(ty, out),
            RowValue::Text(v) => v.to_sql(ty, out),
            RowValue::Timestamp(v) => v.to_sql(ty, out),
            RowValue::TimestampTz(v) => v.to_sql(ty, out),
            RowValue::Date(v) => v.to_sql(ty, out),
            RowValue::Uuid(v) => v.to_sql(ty, out),
            RowValue::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

impl<'a> FromSql<'a> for RowValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let value = match *ty {
            Type::BOOL => RowValue::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => RowValue::SmallInt(i16::from_sql(ty, raw)?),
            Type::INT4 => RowValue::Int(i32::from_sql(ty, raw)?),
            Type::INT8 => RowValue::BigInt(i64::from_sql(ty, raw)?),
            Type::FLOAT4 => RowValue::Real(f32::from_sql(ty, raw)?),
            Type::FLOAT8 => RowValue::Double(f64::from_sql(ty, raw)?),
            Type::NUMERIC => RowValue::Numeric(Decimal::from_sql(ty, raw)?),
            Type::TIMESTAMP => RowValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => RowValue::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::DATE => RowValue::Date(NaiveDate::from_sql(ty, raw)?),
            Type::UUID => RowValue::Uuid(Uuid::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => RowValue::Json(serde_json::Value::from_sql(ty, raw)?),
            _ => RowValue::Text(String::from_sql(ty, raw)?),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RowValue::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equal_values_hash_and_compare_equal() {
        let a = RowValue::Int(42);
        let b = RowValue::Int(42);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn null_is_not_equal_to_text_empty() {
        assert_ne!(RowValue::Null, RowValue::Text(String::new()));
    }

    #[test]
    fn rows_as_tuples_are_set_comparable() {
        let row_a = vec![RowValue::Int(1), RowValue::Text("alice".into())];
        let row_b = vec![RowValue::Int(1), RowValue::Text("alice".into())];
        let row_c = vec![RowValue::Int(2), RowValue::Text("bob".into())];

        let mut set: HashSet<Vec<RowValue>> = HashSet::new();
        set.insert(row_a);
        assert!(set.contains(&row_b));
        assert!(!set.contains(&row_c));
    }
}
