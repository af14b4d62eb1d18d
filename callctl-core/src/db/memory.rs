//! In-process table store
//!
//! Emulates the pieces of Postgres behavior the tooling depends on: check
//! constraints on single columns, generated ids, filter semantics. Failure
//! injection lets tests exercise network errors and failed cleanups.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{value_text, Filter, Order, Query, StoreError, TableStore, CHECK_VIOLATION};
use crate::models::{Row, Table};

#[derive(Default)]
struct Inner {
    tables: HashMap<Table, Vec<Row>>,
    checks: HashMap<(Table, String), Vec<Value>>,
    failing_values: Vec<Value>,
    fail_deletes: bool,
}

/// Mutex-guarded in-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table.
    pub fn with_rows(self, table: Table, rows: impl IntoIterator<Item = Row>) -> Self {
        self.lock().tables.entry(table).or_default().extend(rows);
        self
    }

    /// Emulate `CHECK (column IN (...))`. NULL passes, as in Postgres.
    pub fn with_check<V: Into<Value>>(
        self,
        table: Table,
        column: &str,
        allowed: impl IntoIterator<Item = V>,
    ) -> Self {
        self.lock().checks.insert(
            (table, column.to_string()),
            allowed.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Inserts carrying this value in any column fail as a transport error.
    pub fn fail_inserts_with(self, value: impl Into<Value>) -> Self {
        self.lock().failing_values.push(value.into());
        self
    }

    /// Every delete fails as a transport error.
    pub fn fail_deletes(self) -> Self {
        self.lock().fail_deletes = true;
        self
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.lock().tables.get(&table).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn outage() -> StoreError {
    StoreError::Status {
        status: 503,
        body: "simulated outage".to_string(),
    }
}

impl Inner {
    fn check(&self, table: Table, row: &Row) -> Result<(), StoreError> {
        for ((checked_table, column), allowed) in &self.checks {
            if *checked_table != table {
                continue;
            }
            match row.get(column) {
                None | Some(Value::Null) => {}
                Some(value) if allowed.contains(value) => {}
                Some(_) => {
                    return Err(StoreError::Database {
                        code: Some(CHECK_VIOLATION.to_string()),
                        message: format!(
                            "new row for relation \"{}\" violates check constraint \"{}_{}_check\"",
                            table, table, column
                        ),
                    })
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        let inner = self.lock();
        let mut rows: Vec<Row> = inner
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| query.filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, order)) = &query.order_by {
            let key = |r: &Row| r.get(column.as_str()).map(value_text).unwrap_or_default();
            rows.sort_by_key(key);
            if *order == Order::Desc {
                rows.reverse();
            }
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: &Row) -> Result<Row, StoreError> {
        let mut inner = self.lock();
        if row.values().any(|v| inner.failing_values.contains(v)) {
            return Err(outage());
        }
        inner.check(table, row)?;

        let mut stored = row.clone();
        stored
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        inner.tables.entry(table).or_default().push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: &Row,
    ) -> Result<Vec<Row>, StoreError> {
        filter.require_non_empty()?;
        let mut inner = self.lock();

        let mut candidates = Vec::new();
        if let Some(rows) = inner.tables.get(&table) {
            for (i, row) in rows.iter().enumerate() {
                if filter.matches(row) {
                    let mut next = row.clone();
                    next.extend(patch.clone());
                    inner.check(table, &next)?;
                    candidates.push((i, next));
                }
            }
        }

        let rows = inner.tables.entry(table).or_default();
        let mut updated = Vec::with_capacity(candidates.len());
        for (i, next) in candidates {
            rows[i] = next.clone();
            updated.push(next);
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<u64, StoreError> {
        filter.require_non_empty()?;
        let mut inner = self.lock();
        if inner.fail_deletes {
            return Err(outage());
        }
        let Some(rows) = inner.tables.get_mut(&table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self, table: Table, filter: &Filter) -> Result<i64, StoreError> {
        let inner = self.lock();
        Ok(inner
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).count())
            .unwrap_or(0) as i64)
    }
}
