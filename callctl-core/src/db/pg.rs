//! Direct Postgres backend (sqlx)
//!
//! Rows travel as `jsonb`: reads use `to_jsonb(t)`, writes go through
//! `jsonb_populate_record` so the server coerces JSON values into column
//! types. Table names come from [`Table`] and columns from [`Column`], so the
//! only interpolated identifiers are validated ones.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use super::{value_text, Filter, Order, Query, StoreError, TableStore};
use crate::models::{Column, Row, Table, ValidationError};

/// Kept low for one-shot tooling
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Column description from information_schema
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
    pub column_default: Option<String>,
}

/// Constraint definition from pg_constraint
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct ConstraintInfo {
    pub name: String,
    /// `c` check, `f` foreign key, `p` primary key, `u` unique
    pub kind: String,
    pub definition: String,
}

/// sqlx-backed table store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Columns of a table in ordinal order.
    pub async fn columns(&self, table: Table) -> Result<Vec<ColumnInfo>, StoreError> {
        let columns = sqlx::query_as::<_, ColumnInfo>(
            r#"
            SELECT column_name::text, data_type::text, is_nullable::text, column_default::text
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }

    /// Constraints on a table, check constraints first.
    pub async fn constraints(&self, table: Table) -> Result<Vec<ConstraintInfo>, StoreError> {
        let constraints = sqlx::query_as::<_, ConstraintInfo>(
            r#"
            SELECT c.conname::text AS name,
                   c.contype::text AS kind,
                   pg_get_constraintdef(c.oid) AS definition
            FROM pg_constraint c
            JOIN pg_class r ON r.oid = c.conrelid
            JOIN pg_namespace n ON n.oid = r.relnamespace
            WHERE n.nspname = 'public' AND r.relname = $1
            ORDER BY (c.contype <> 'c'), c.conname
            "#,
        )
        .bind(table.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(constraints)
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

/// `WHERE` clause over `t.<col>::text = $n`, numbering from `first`.
fn where_clause(filter: &Filter, first: usize) -> String {
    if filter.is_empty() {
        return String::new();
    }
    let mut next = first;
    let mut parts = Vec::with_capacity(filter.conditions().len());
    for (column, value) in filter.conditions() {
        if value.is_null() {
            parts.push(format!("t.{} IS NULL", quote(column.as_str())));
        } else {
            parts.push(format!("t.{}::text = ${}", quote(column.as_str()), next));
            next += 1;
        }
    }
    format!(" WHERE {}", parts.join(" AND "))
}

/// Text binds for the non-null filter values, in order.
fn filter_binds(filter: &Filter) -> Vec<String> {
    filter
        .conditions()
        .iter()
        .map(|(_, v)| v)
        .filter(|v| !v.is_null())
        .map(value_text)
        .collect()
}

fn row_columns(row: &Row) -> Result<Vec<Column>, ValidationError> {
    if row.is_empty() {
        return Err(ValidationError::Empty { field: "row" });
    }
    row.keys().map(|k| Column::new(k)).collect()
}

fn into_row(value: Value) -> Result<Row, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Database {
            code: None,
            message: format!("expected a row object, got {}", other),
        }),
    }
}

pub(crate) fn select_sql(table: Table, query: &Query) -> String {
    let mut sql = format!(
        "SELECT to_jsonb(t) FROM {} t{}",
        quote(table.as_str()),
        where_clause(&query.filter, 1)
    );
    if let Some((column, order)) = &query.order_by {
        let dir = match order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY t.{} {}", quote(column.as_str()), dir));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

pub(crate) fn insert_sql(table: Table, columns: &[Column]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote(c.as_str())).collect();
    let cols = cols.join(", ");
    format!(
        "INSERT INTO {table} AS t ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1) RETURNING to_jsonb(t)",
        table = quote(table.as_str()),
        cols = cols,
    )
}

pub(crate) fn update_sql(table: Table, columns: &[Column], filter: &Filter) -> String {
    let sets: Vec<String> = columns
        .iter()
        .map(|c| format!("{col} = r.{col}", col = quote(c.as_str())))
        .collect();
    format!(
        "UPDATE {table} AS t SET {sets} FROM jsonb_populate_record(NULL::{table}, $1) AS r{filter} RETURNING to_jsonb(t)",
        table = quote(table.as_str()),
        sets = sets.join(", "),
        filter = where_clause(filter, 2),
    )
}

#[async_trait]
impl TableStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        let sql = select_sql(table, query);
        let mut q = sqlx::query_scalar::<_, Value>(&sql);
        for bind in filter_binds(&query.filter) {
            q = q.bind(bind);
        }
        q.fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(into_row)
            .collect()
    }

    async fn insert(&self, table: Table, row: &Row) -> Result<Row, StoreError> {
        let columns = row_columns(row)?;
        let sql = insert_sql(table, &columns);
        let value = sqlx::query_scalar::<_, Value>(&sql)
            .bind(Value::Object(row.clone()))
            .fetch_one(&self.pool)
            .await?;
        into_row(value)
    }

    async fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: &Row,
    ) -> Result<Vec<Row>, StoreError> {
        filter.require_non_empty()?;
        let columns = row_columns(patch)?;
        let sql = update_sql(table, &columns, filter);
        let mut q = sqlx::query_scalar::<_, Value>(&sql).bind(Value::Object(patch.clone()));
        for bind in filter_binds(filter) {
            q = q.bind(bind);
        }
        q.fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(into_row)
            .collect()
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<u64, StoreError> {
        filter.require_non_empty()?;
        let sql = format!(
            "DELETE FROM {} AS t{}",
            quote(table.as_str()),
            where_clause(filter, 1)
        );
        let mut q = sqlx::query(&sql);
        for bind in filter_binds(filter) {
            q = q.bind(bind);
        }
        Ok(q.execute(&self.pool).await?.rows_affected())
    }

    async fn count(&self, table: Table, filter: &Filter) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} t{}",
            quote(table.as_str()),
            where_clause(filter, 1)
        );
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for bind in filter_binds(filter) {
            q = q.bind(bind);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_sql_shape() {
        let query = Query::new()
            .filter(
                Filter::eq("status", "completed")
                    .unwrap()
                    .and("campaign_id", Value::Null)
                    .unwrap()
                    .and("organization_id", "o-1")
                    .unwrap(),
            )
            .order_by("created_at", Order::Desc)
            .unwrap()
            .limit(10);

        assert_eq!(
            select_sql(Table::Calls, &query),
            "SELECT to_jsonb(t) FROM \"calls\" t WHERE t.\"status\"::text = $1 AND t.\"campaign_id\" IS NULL AND t.\"organization_id\"::text = $2 ORDER BY t.\"created_at\" DESC LIMIT 10"
        );
    }

    #[test]
    fn insert_sql_lists_only_given_columns() {
        let columns = vec![Column::new("status").unwrap(), Column::new("organization_id").unwrap()];
        let sql = insert_sql(Table::Calls, &columns);
        assert!(sql.starts_with("INSERT INTO \"calls\" AS t (\"status\", \"organization_id\")"));
        assert!(sql.contains("jsonb_populate_record(NULL::\"calls\", $1)"));
    }

    #[test]
    fn update_sql_numbers_filters_after_patch() {
        let columns = vec![Column::new("status").unwrap()];
        let filter = Filter::eq("vapi_call_id", "v-1").unwrap();
        let sql = update_sql(Table::Calls, &columns, &filter);
        assert!(sql.contains("SET \"status\" = r.\"status\""));
        assert!(sql.contains("WHERE t.\"vapi_call_id\"::text = $2"));
    }

    #[test]
    fn empty_row_is_rejected() {
        assert!(row_columns(&Row::new()).is_err());
        let Value::Object(bad) = json!({"Bad Column": 1}) else { unreachable!() };
        assert!(row_columns(&bad).is_err());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn counts_calls() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let store = PgStore::connect(&url).await.expect("pool creation failed");
        let total = store.count(Table::Calls, &Filter::new()).await.expect("count failed");
        assert!(total >= 0);
    }
}
