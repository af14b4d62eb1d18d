//! Probe command - discover the values a check constraint accepts
//!
//! Each candidate is inserted as `template + {field: value}` and the row is
//! deleted again by its key column. Only the constraint's own refusals
//! (check violation, invalid enum text) count as "rejected".

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;

use callctl_core::prober::{preset, Outcome};
use callctl_core::{probe, CallctlConfig, ProbeReport, Row, Table, TableStore, TableTrial};

use super::{assignments_to_row, display_value, parse_json_object, print_json, CommandContext};

#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// Table to insert trial rows into
    #[arg(long)]
    pub table: Table,

    /// Column guarded by the constraint
    #[arg(long)]
    pub field: String,

    /// Candidate values, comma-separated (default: built-in preset for table.field)
    #[arg(long, value_delimiter = ',')]
    pub values: Vec<String>,

    /// Parse each candidate as a JSON literal instead of a string
    #[arg(long)]
    pub json_values: bool,

    /// Base row as a JSON object, or @path to a JSON file
    #[arg(long)]
    pub template: Option<String>,

    /// Extra template column (column=value, repeatable)
    #[arg(long = "set", value_name = "COLUMN=VALUE")]
    pub set: Vec<String>,

    /// Column used to delete trial rows (default: [probe] key_column or "id")
    #[arg(long)]
    pub key_column: Option<String>,
}

pub async fn run_probe(ctx: &CommandContext, args: ProbeArgs) -> Result<()> {
    let candidates = candidates(&args)?;

    let mut template = match &args.template {
        Some(raw) => parse_json_object(raw)?,
        None => Default::default(),
    };
    template.extend(assignments_to_row(&args.set)?);

    let key_column = match args.key_column.clone() {
        Some(key) => key,
        None => CallctlConfig::load()?.probe.key_column,
    };

    let store = ctx.store().await?;
    let report = probe_table(store.as_ref(), &args, template, &key_column, &candidates).await?;

    if ctx.is_json() {
        print_json(&report)?;
    } else {
        print_report(args.table, &args.field, &report);
    }

    ensure_clean(args.table, &report)
}

async fn probe_table(
    store: &dyn TableStore,
    args: &ProbeArgs,
    template: Row,
    key_column: &str,
    candidates: &[Value],
) -> Result<ProbeReport> {
    let trial =
        TableTrial::new(store, args.table, &args.field, template)?.key_column(key_column)?;

    tracing::info!(
        table = %args.table,
        field = %args.field,
        candidates = candidates.len(),
        backend = store.backend(),
        "Probing constraint"
    );
    Ok(probe(&trial, candidates).await)
}

/// Trial rows left behind are an error so scripts notice.
fn ensure_clean(table: Table, report: &ProbeReport) -> Result<()> {
    if !report.is_clean() {
        bail!(
            "{} trial row(s) may remain in {}; see residuals above",
            report.residuals.len(),
            table
        );
    }
    Ok(())
}

fn candidates(args: &ProbeArgs) -> Result<Vec<Value>> {
    if args.values.is_empty() {
        let Some(values) = preset(args.table, &args.field) else {
            bail!(
                "No built-in candidates for {}.{}; pass --values",
                args.table,
                args.field
            );
        };
        return Ok(values.iter().map(|v| Value::String(v.to_string())).collect());
    }

    args.values
        .iter()
        .map(|raw| {
            if args.json_values {
                serde_json::from_str(raw).with_context(|| format!("'{}' is not a JSON literal", raw))
            } else {
                Ok(Value::String(raw.clone()))
            }
        })
        .collect()
}

fn print_report(table: Table, field: &str, report: &ProbeReport) {
    println!("{}.{}", table, field);
    for result in &report.results {
        let value = display_value(&result.value);
        match &result.outcome {
            Outcome::Accepted => println!("  ✓ {}", value),
            Outcome::Rejected { message } => println!("  ✗ {}  ({})", value, message),
            Outcome::Failed { message } => println!("  ? {}  failed: {}", value, message),
        }
    }

    let accepted: Vec<String> = report.accepted().into_iter().map(display_value).collect();
    println!();
    println!("Accepted: {}", if accepted.is_empty() { "(none)".to_string() } else { accepted.join(", ") });

    if report.template_suspect() {
        println!(
            "⚠ Every candidate failed for a non-constraint reason. Check the template \
             (required columns, foreign keys, permissions)."
        );
    }
    for residual in &report.residuals {
        println!("⚠ Residual row for {}: {}", display_value(&residual.value), residual.message);
    }
}
