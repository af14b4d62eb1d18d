//! Patch command - guarded updates to one table
//!
//! Replaces the one-off "fix this row" scripts. Without `--yes` it only
//! reports how many rows would change.

use anyhow::{bail, Result};
use clap::Parser;
use serde::Serialize;

use callctl_core::{Filter, Row, Table, TableStore};

use super::{assignments_to_row, parse_assignment, print_json, CommandContext};

#[derive(Parser, Debug)]
pub struct PatchArgs {
    /// Table to update
    pub table: Table,

    /// Row filter (column=value, repeatable, all must match)
    #[arg(long = "where", value_name = "COLUMN=VALUE", required = true)]
    pub filters: Vec<String>,

    /// Column to set (column=value, repeatable)
    #[arg(long = "set", value_name = "COLUMN=VALUE", required = true)]
    pub set: Vec<String>,

    /// Apply the update (default is a dry run)
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct PatchSummary<'a> {
    table: Table,
    dry_run: bool,
    matched: i64,
    patch: &'a Row,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<Vec<Row>>,
}

pub async fn run_patch(ctx: &CommandContext, args: PatchArgs) -> Result<()> {
    let filter = build_filter(&args.filters)?;
    let patch = assignments_to_row(&args.set)?;
    if patch.is_empty() {
        bail!("Nothing to set");
    }

    let store = ctx.store().await?;
    let summary = patch_table(store.as_ref(), args.table, &filter, &patch, args.yes).await?;

    if ctx.is_json() {
        return print_json(&summary);
    }
    match &summary.updated {
        Some(rows) => println!("Updated {} row(s) in {}", rows.len(), summary.table),
        None => {
            println!(
                "Dry run: {} row(s) in {} match; would set {}",
                summary.matched,
                summary.table,
                serde_json::to_string(summary.patch)?
            );
            println!("Re-run with --yes to apply");
        }
    }
    Ok(())
}

/// Count the matching rows and, only when `apply` is set, update them.
async fn patch_table<'a>(
    store: &dyn TableStore,
    table: Table,
    filter: &Filter,
    patch: &'a Row,
    apply: bool,
) -> Result<PatchSummary<'a>> {
    let matched = store.count(table, filter).await?;

    let updated = if apply {
        let rows = store.update(table, filter, patch).await?;
        tracing::info!(table = %table, rows = rows.len(), "Patched rows");
        Some(rows)
    } else {
        None
    };

    Ok(PatchSummary {
        table,
        dry_run: !apply,
        matched,
        patch,
        updated,
    })
}

fn build_filter(pairs: &[String]) -> Result<Filter> {
    let mut filter = Filter::new();
    for pair in pairs {
        let (column, value) = parse_assignment(pair)?;
        filter = filter.and(column.as_str(), value)?;
    }
    filter.require_non_empty()?;
    Ok(filter)
}
