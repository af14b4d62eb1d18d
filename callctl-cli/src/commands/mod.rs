//! Command implementations for callctl CLI

pub mod calls;
pub mod config;
pub mod inspect;
pub mod patch;
pub mod probe;
pub mod serve;
pub mod vapi;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;

use callctl_core::db::PgStore;
use callctl_core::{connect, Backend, Column, KeyRole, Row, Settings, TableStore};

// Re-export main dispatcher functions for flat access from main.rs
pub use calls::run_calls;
pub use config::run_config;
pub use inspect::run_inspect;
pub use patch::run_patch;
pub use probe::run_probe;
pub use serve::run_serve;
pub use vapi::run_vapi;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Everything a command needs from the global flags and environment
pub struct CommandContext {
    pub settings: Settings,
    pub backend: Backend,
    pub role: KeyRole,
    pub format: OutputFormat,
    /// Env files that were loaded, for `config show`
    pub env_files: Vec<PathBuf>,
}

impl CommandContext {
    /// Table store for the selected backend and key role.
    pub async fn store(&self) -> Result<Arc<dyn TableStore>> {
        connect(&self.settings, self.backend, self.role)
            .await
            .context("Failed to connect to database")
    }

    /// Direct Postgres handle for catalog queries.
    pub async fn pg(&self) -> Result<PgStore> {
        let url = self
            .settings
            .require_database_url()
            .context("Schema introspection needs a direct Postgres connection")?;
        PgStore::connect(url.expose())
            .await
            .context("Failed to connect to Postgres")
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a `column=value` pair.
///
/// The value is read as a JSON literal when it is one (`42`, `true`, `null`,
/// `{"a":1}`), otherwise as a plain string. Quote it (`name='"42"'`) to force
/// a string.
pub fn parse_assignment(raw: &str) -> Result<(Column, Value)> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected column=value, got '{}'", raw))?;
    let column = Column::new(column.trim())?;
    Ok((column, parse_literal(value)))
}

fn parse_literal(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Fold `column=value` pairs into a row; later pairs win.
pub fn assignments_to_row(pairs: &[String]) -> Result<Row> {
    let mut row = Row::new();
    for pair in pairs {
        let (column, value) = parse_assignment(pair)?;
        row.insert(column.as_str().to_string(), value);
    }
    Ok(row)
}

/// Parse an inline JSON object, or `@path` to read one from a file.
pub fn parse_json_object(raw: &str) -> Result<Row> {
    let content = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path))?,
        None => raw.to_string(),
    };
    match serde_json::from_str(&content).context("Template is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("Template must be a JSON object, got {}", type_name(&other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render a JSON value without quoting strings.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn assignment_values_are_json_or_text() {
        let (col, v) = parse_assignment("attempts=3").unwrap();
        assert_eq!(col.as_str(), "attempts");
        assert_eq!(v, json!(3));

        assert_eq!(parse_assignment("status=in-progress").unwrap().1, json!("in-progress"));
        assert_eq!(parse_assignment("notes=null").unwrap().1, Value::Null);
        assert_eq!(parse_assignment(r#"phone="5550100""#).unwrap().1, json!("5550100"));
        assert_eq!(parse_assignment("url=https://x.io/a=b").unwrap().1, json!("https://x.io/a=b"));
    }

    #[test]
    fn assignment_rejects_bad_input() {
        assert!(parse_assignment("no-equals-sign").is_err());
        assert!(parse_assignment("Bad Column=1").is_err());
    }

    #[test]
    fn later_assignments_win() {
        let row = assignments_to_row(&["a=1".into(), "b=x".into(), "a=2".into()]).unwrap();
        assert_eq!(row.get("a"), Some(&json!(2)));
        assert_eq!(row.get("b"), Some(&json!("x")));
    }

    #[test]
    fn template_inline_and_from_file() {
        let inline = parse_json_object(r#"{"organization_id": "org-1"}"#).unwrap();
        assert_eq!(inline["organization_id"], json!("org-1"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"campaign_id": 7}}"#).unwrap();
        let from_file = parse_json_object(&format!("@{}", file.path().display())).unwrap();
        assert_eq!(from_file["campaign_id"], json!(7));
    }

    #[test]
    fn template_must_be_object() {
        let err = parse_json_object("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"));
        assert!(parse_json_object("{oops").is_err());
    }
}
