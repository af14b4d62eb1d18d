//! Database layer - table store trait, backends and the client factory
//!
//! # Design Principles
//!
//! - One trait (`TableStore`) for every script-style operation
//! - Tables come from a closed enum, columns are validated identifiers
//! - Update and delete refuse an empty filter
//! - Update never inserts
//! - SQLSTATE codes survive from either backend so callers can classify
//!   constraint violations

pub mod memory;
pub mod pg;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{ConfigError, KeyRole, Settings};
use crate::models::{Column, Row, Table, ValidationError};

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use rest::RestStore;

/// SQLSTATE for a CHECK constraint violation
pub const CHECK_VIOLATION: &str = "23514";
/// SQLSTATE for a value outside a Postgres enum type
pub const INVALID_TEXT_REPRESENTATION: &str = "22P02";

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected the statement
    #[error("database error{}: {message}", .code.as_deref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    Database {
        code: Option<String>,
        message: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected http status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("postgres error: {0}")]
    Sqlx(sqlx::Error),

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => Self::Database {
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_owned(),
            },
            other => Self::Sqlx(other),
        }
    }
}

impl StoreError {
    /// SQLSTATE code when the database produced one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Class 23: integrity constraint violation of any kind.
    pub fn is_constraint_violation(&self) -> bool {
        self.code().is_some_and(|c| c.starts_with("23"))
    }

    /// The value itself was refused: a CHECK constraint or an enum type.
    pub fn rejects_value(&self) -> bool {
        matches!(
            self.code(),
            Some(CHECK_VIOLATION) | Some(INVALID_TEXT_REPRESENTATION)
        )
    }

    /// Like [`rejects_value`](Self::rejects_value), but pinned to one value.
    ///
    /// `22P02` is raised for any column whose text doesn't parse (a bad uuid
    /// in some other field included), so it only counts when the message
    /// quotes `value`, as `invalid input value for enum call_status: "done"`
    /// does.
    pub fn rejects_candidate(&self, value: &Value) -> bool {
        match self {
            Self::Database {
                code: Some(code),
                message,
            } => match code.as_str() {
                CHECK_VIOLATION => true,
                INVALID_TEXT_REPRESENTATION => {
                    message.contains(&format!("\"{}\"", value_text(value)))
                }
                _ => false,
            },
            _ => false,
        }
    }
}

/// Conjunction of equality filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(Column, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a single column.
    pub fn eq(column: &str, value: impl Into<Value>) -> Result<Self, ValidationError> {
        Self::new().and(column, value)
    }

    pub fn and(mut self, column: &str, value: impl Into<Value>) -> Result<Self, ValidationError> {
        self.conditions.push((Column::new(column)?, value.into()));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(Column, Value)] {
        &self.conditions
    }

    /// Refuse unfiltered mutations.
    pub fn require_non_empty(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::Empty { field: "filter" });
        }
        Ok(())
    }

    /// Whether a row satisfies every condition (text comparison, as the
    /// backends compare `column::text`).
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|(column, expected)| {
            row.get(column.as_str())
                .is_some_and(|actual| value_text(actual) == value_text(expected))
        })
    }
}

/// Text form of a JSON scalar as Postgres would print it.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Sort direction for selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Select parameters
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Filter,
    pub order_by: Option<(Column, Order)>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Result<Self, ValidationError> {
        self.order_by = Some((Column::new(column)?, order));
        Ok(self)
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Table-level access to the hosted database.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Backend name for logs and error messages
    fn backend(&self) -> &'static str;

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Insert one row, returning it as stored (defaults filled in).
    async fn insert(&self, table: Table, row: &Row) -> Result<Row, StoreError>;

    /// Update matching rows, returning them. Never creates a row.
    async fn update(&self, table: Table, filter: &Filter, patch: &Row)
        -> Result<Vec<Row>, StoreError>;

    /// Delete matching rows, returning how many were removed.
    async fn delete(&self, table: Table, filter: &Filter) -> Result<u64, StoreError>;

    async fn count(&self, table: Table, filter: &Filter) -> Result<i64, StoreError>;
}

/// Which transport to reach the database through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// PostgREST over HTTPS with a service-role or anon key
    Rest,
    /// Direct Postgres connection (DATABASE_URL)
    Postgres,
}

/// Client factory error
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Build a table store from settings.
///
/// `role` only matters for the REST backend; a direct connection carries its
/// own credentials in the URL.
pub async fn connect(
    settings: &Settings,
    backend: Backend,
    role: KeyRole,
) -> Result<Arc<dyn TableStore>, ConnectError> {
    match backend {
        Backend::Rest => {
            let url = settings.require_supabase_url()?;
            let key = settings.require_key(role)?;
            tracing::debug!(url = %url, role = ?role, "Connecting via REST");
            Ok(Arc::new(RestStore::new(url, key.clone())?))
        }
        Backend::Postgres => {
            let url = settings.require_database_url()?;
            tracing::debug!("Connecting via Postgres");
            Ok(Arc::new(PgStore::connect(url.expose()).await?))
        }
    }
}
