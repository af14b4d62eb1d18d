//! Constraint prober
//!
//! Discovers which literal values an opaque CHECK constraint (or enum type)
//! accepts by inserting a trial row per candidate and deleting it again.
//!
//! ```text
//! candidates ─► attempt(value) ─┬─ Ok(receipt) ─► cleanup(receipt) ─► Accepted
//!                               ├─ 23514 / 22P02 naming the value ──► Rejected
//!                               └─ anything else ───────────────────► Failed
//! ```
//!
//! Cleanup is best effort: a failed delete is reported as a residual row and
//! probing moves on. Nothing is retried.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::{Filter, StoreError, TableStore};
use crate::models::{Column, Row, Table, ValidationError};

/// Why a trial row could not be removed
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("inserted row has no '{0}' value to delete by")]
    MissingKey(String),

    #[error("delete matched no rows")]
    NothingDeleted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One trial insert and its undo.
#[async_trait]
pub trait Trial: Send + Sync {
    /// Whatever `cleanup` needs to undo a successful attempt
    type Receipt: Send;

    async fn attempt(&self, value: &Value) -> Result<Self::Receipt, StoreError>;

    async fn cleanup(&self, receipt: Self::Receipt) -> Result<(), CleanupError>;
}

/// Result for a single candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    /// The constraint refused the value
    Rejected { message: String },
    /// The attempt failed for an unrelated reason; says nothing about the value
    Failed { message: String },
}

/// A trial row that may still be in the table
#[derive(Debug, Clone, Serialize)]
pub struct Residual {
    pub value: Value,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateResult {
    pub value: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Everything learned from one probe run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub results: Vec<CandidateResult>,
    pub residuals: Vec<Residual>,
}

impl ProbeReport {
    fn values_where(&self, pred: impl Fn(&Outcome) -> bool) -> Vec<&Value> {
        self.results
            .iter()
            .filter(|r| pred(&r.outcome))
            .map(|r| &r.value)
            .collect()
    }

    /// The accepted subset, in input order.
    pub fn accepted(&self) -> Vec<&Value> {
        self.values_where(|o| matches!(o, Outcome::Accepted))
    }

    pub fn rejected(&self) -> Vec<&Value> {
        self.values_where(|o| matches!(o, Outcome::Rejected { .. }))
    }

    pub fn failed(&self) -> Vec<&Value> {
        self.values_where(|o| matches!(o, Outcome::Failed { .. }))
    }

    /// Every candidate failed for a non-constraint reason, which usually
    /// means the template row itself is invalid (missing FK, NOT NULL column).
    pub fn template_suspect(&self) -> bool {
        !self.results.is_empty()
            && self
                .results
                .iter()
                .all(|r| matches!(r.outcome, Outcome::Failed { .. }))
    }

    pub fn is_clean(&self) -> bool {
        self.residuals.is_empty()
    }
}

/// Probe each distinct candidate once, sequentially, in input order.
pub async fn probe<T: Trial>(trial: &T, candidates: &[Value]) -> ProbeReport {
    let mut report = ProbeReport::default();
    let mut seen: Vec<&Value> = Vec::with_capacity(candidates.len());

    for value in candidates {
        if seen.contains(&value) {
            debug!(value = %value, "Skipping duplicate candidate");
            continue;
        }
        seen.push(value);

        let outcome = match trial.attempt(value).await {
            Ok(receipt) => {
                if let Err(e) = trial.cleanup(receipt).await {
                    warn!(value = %value, error = %e, "Trial row may remain");
                    report.residuals.push(Residual {
                        value: value.clone(),
                        message: e.to_string(),
                    });
                }
                Outcome::Accepted
            }
            Err(e) if e.rejects_candidate(value) => Outcome::Rejected {
                message: e.to_string(),
            },
            Err(e) => Outcome::Failed {
                message: e.to_string(),
            },
        };

        info!(value = %value, outcome = ?outcome, "Probed candidate");
        report.results.push(CandidateResult {
            value: value.clone(),
            outcome,
        });
    }

    report
}

/// Trial that inserts `template + {field: value}` into a table and deletes
/// the row by its key column.
pub struct TableTrial<'a> {
    store: &'a dyn TableStore,
    table: Table,
    field: Column,
    key: Column,
    template: Row,
}

impl<'a> TableTrial<'a> {
    pub fn new(
        store: &'a dyn TableStore,
        table: Table,
        field: &str,
        template: Row,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            store,
            table,
            field: Column::new(field)?,
            key: Column::new("id")?,
            template,
        })
    }

    /// Delete trial rows by a column other than `id`.
    pub fn key_column(mut self, key: &str) -> Result<Self, ValidationError> {
        self.key = Column::new(key)?;
        Ok(self)
    }

    fn row_for(&self, value: &Value) -> Row {
        let mut row = self.template.clone();
        row.insert(self.field.as_str().to_string(), value.clone());
        row
    }
}

#[async_trait]
impl<'a> Trial for TableTrial<'a> {
    type Receipt = Row;

    async fn attempt(&self, value: &Value) -> Result<Row, StoreError> {
        self.store.insert(self.table, &self.row_for(value)).await
    }

    async fn cleanup(&self, inserted: Row) -> Result<(), CleanupError> {
        let key = match inserted.get(self.key.as_str()) {
            Some(v) if !v.is_null() => v.clone(),
            _ => return Err(CleanupError::MissingKey(self.key.to_string())),
        };
        let filter = Filter::eq(self.key.as_str(), key).map_err(StoreError::from)?;
        match self.store.delete(self.table, &filter).await? {
            0 => Err(CleanupError::NothingDeleted),
            _ => Ok(()),
        }
    }
}

/// Candidate lists for the enum-like columns worth probing.
pub fn preset(table: Table, field: &str) -> Option<&'static [&'static str]> {
    let values: &'static [&'static str] = match (table, field) {
        (Table::Calls, "status") => &[
            "pending",
            "queued",
            "initiated",
            "ringing",
            "in-progress",
            "in_progress",
            "active",
            "completed",
            "ended",
            "failed",
            "busy",
            "no-answer",
            "no_answer",
            "voicemail",
            "canceled",
            "cancelled",
        ],
        (Table::Calls, "outcome") => &[
            "qualified",
            "not_qualified",
            "interested",
            "not_interested",
            "callback",
            "callback_requested",
            "appointment_set",
            "voicemail",
            "no_answer",
            "wrong_number",
            "do_not_call",
            "completed",
            "failed",
        ],
        (Table::Calls, "sentiment") => &["positive", "neutral", "negative", "mixed"],
        (Table::Leads, "status") => &[
            "new",
            "pending",
            "contacted",
            "in_progress",
            "qualified",
            "unqualified",
            "callback",
            "converted",
            "lost",
            "do_not_call",
        ],
        (Table::Users, "role") => &[
            "owner",
            "admin",
            "super_admin",
            "manager",
            "agent",
            "member",
            "user",
            "viewer",
        ],
        (Table::Campaigns, "status") => &[
            "draft",
            "scheduled",
            "active",
            "paused",
            "completed",
            "archived",
        ],
        (Table::CallAttempts, "status") => &[
            "pending",
            "in_progress",
            "completed",
            "failed",
            "no_answer",
            "busy",
            "voicemail",
        ],
        _ => return None,
    };
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde_json::json;

    fn template() -> Row {
        match json!({"organization_id": "org-1", "phone_number": "+15555550100"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn strings(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| json!(v)).collect()
    }

    #[tokio::test]
    async fn accepted_set_matches_constraint() {
        let store = MemoryStore::new().with_check(
            Table::Calls,
            "status",
            ["queued", "in-progress", "completed"],
        );
        let trial = TableTrial::new(&store, Table::Calls, "status", template()).unwrap();

        let report = probe(&trial, &strings(&["queued", "done", "completed", "in_progress"])).await;

        assert_eq!(report.accepted(), vec![&json!("queued"), &json!("completed")]);
        assert_eq!(report.rejected(), vec![&json!("done"), &json!("in_progress")]);
        assert!(report.failed().is_empty());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn leaves_no_trial_rows_behind() {
        let existing = match json!({"id": "keep-me", "status": "completed"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let store = MemoryStore::new()
            .with_rows(Table::Calls, vec![existing.clone()])
            .with_check(Table::Calls, "status", ["queued", "completed"]);
        let trial = TableTrial::new(&store, Table::Calls, "status", template()).unwrap();

        probe(&trial, &strings(&["queued", "completed", "bogus"])).await;

        assert_eq!(store.rows(Table::Calls), vec![existing]);
    }

    #[tokio::test]
    async fn network_failure_aborts_only_that_candidate() {
        let store = MemoryStore::new()
            .with_check(Table::Calls, "status", ["queued", "completed"])
            .fail_inserts_with("queued");
        let trial = TableTrial::new(&store, Table::Calls, "status", template()).unwrap();

        let report = probe(&trial, &strings(&["queued", "completed", "nope"])).await;

        assert_eq!(report.failed(), vec![&json!("queued")]);
        assert_eq!(report.accepted(), vec![&json!("completed")]);
        assert_eq!(report.rejected(), vec![&json!("nope")]);
        assert!(!report.template_suspect());
    }

    #[tokio::test]
    async fn failed_cleanup_is_reported_as_residual() {
        let store = MemoryStore::new()
            .with_check(Table::Calls, "status", ["queued"])
            .fail_deletes();
        let trial = TableTrial::new(&store, Table::Calls, "status", template()).unwrap();

        let report = probe(&trial, &strings(&["queued", "bad"])).await;

        assert_eq!(report.accepted(), vec![&json!("queued")]);
        assert_eq!(report.residuals.len(), 1);
        assert_eq!(report.residuals[0].value, json!("queued"));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn missing_key_column_is_a_residual() {
        let store = MemoryStore::new();
        let trial = TableTrial::new(&store, Table::Calls, "status", template())
            .unwrap()
            .key_column("call_uuid")
            .unwrap();

        let report = probe(&trial, &strings(&["queued"])).await;

        assert_eq!(report.accepted().len(), 1);
        assert!(report.residuals[0].message.contains("call_uuid"));
    }

    #[tokio::test]
    async fn duplicates_probed_once() {
        let store = MemoryStore::new();
        let trial = TableTrial::new(&store, Table::Calls, "status", template()).unwrap();

        let report = probe(&trial, &strings(&["a", "a", "b"])).await;
        assert_eq!(report.results.len(), 2);
    }

    #[tokio::test]
    async fn all_failures_flag_the_template() {
        let store = MemoryStore::new().fail_inserts_with("org-1");
        let trial = TableTrial::new(&store, Table::Calls, "status", template()).unwrap();

        let report = probe(&trial, &strings(&["a", "b"])).await;
        assert!(report.template_suspect());
        assert!(report.accepted().is_empty());
    }

    /// Fails every attempt with the given SQLSTATE and message.
    struct AlwaysFails {
        code: &'static str,
        message: fn(&Value) -> String,
    }

    #[async_trait]
    impl Trial for AlwaysFails {
        type Receipt = ();

        async fn attempt(&self, value: &Value) -> Result<(), StoreError> {
            Err(StoreError::Database {
                code: Some(self.code.to_string()),
                message: (self.message)(value),
            })
        }

        async fn cleanup(&self, _receipt: ()) -> Result<(), CleanupError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn invalid_text_in_template_is_not_a_rejection() {
        let trial = AlwaysFails {
            code: crate::db::INVALID_TEXT_REPRESENTATION,
            message: |_| r#"invalid input syntax for type uuid: "org-1""#.to_string(),
        };

        let report = probe(&trial, &strings(&["queued", "completed"])).await;

        assert!(report.rejected().is_empty());
        assert_eq!(report.failed(), vec![&json!("queued"), &json!("completed")]);
        assert!(report.template_suspect());
    }

    #[tokio::test]
    async fn invalid_enum_text_naming_the_value_is_a_rejection() {
        let trial = AlwaysFails {
            code: crate::db::INVALID_TEXT_REPRESENTATION,
            message: |v| format!("invalid input value for enum call_status: {}", v),
        };

        let report = probe(&trial, &strings(&["done"])).await;

        assert_eq!(report.rejected(), vec![&json!("done")]);
        assert!(!report.template_suspect());
    }

    #[test]
    fn presets_cover_status_columns() {
        assert!(preset(Table::Calls, "status").unwrap().contains(&"completed"));
        assert!(preset(Table::Users, "role").is_some());
        assert!(preset(Table::Organizations, "name").is_none());
    }

    #[test]
    fn outcome_serializes_flat() {
        let result = CandidateResult {
            value: json!("done"),
            outcome: Outcome::Rejected {
                message: "violates check".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"value": "done", "outcome": "rejected", "message": "violates check"})
        );
    }
}
