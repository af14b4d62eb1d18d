//! Inspect command - row counts, columns and constraints

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;

use callctl_core::{Filter, Table};

use super::{print_json, CommandContext};

#[derive(Parser, Debug)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub command: InspectCommand,
}

#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// Row count for every known table
    Counts,
    /// Column names, types and defaults (requires DATABASE_URL)
    Columns {
        /// Table to describe
        table: Table,
    },
    /// Check, foreign-key, primary-key and unique constraints (requires DATABASE_URL)
    Constraints {
        /// Table to describe
        table: Table,
    },
}

#[derive(Debug, Serialize)]
struct TableCount {
    table: Table,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run_inspect(ctx: &CommandContext, args: InspectArgs) -> Result<()> {
    match args.command {
        InspectCommand::Counts => counts(ctx).await,
        InspectCommand::Columns { table } => columns(ctx, table).await,
        InspectCommand::Constraints { table } => constraints(ctx, table).await,
    }
}

async fn counts(ctx: &CommandContext) -> Result<()> {
    let store = ctx.store().await?;
    let mut counts = Vec::with_capacity(Table::ALL.len());

    // One missing or forbidden table shouldn't hide the others.
    for table in Table::ALL {
        let entry = match store.count(table, &Filter::new()).await {
            Ok(rows) => TableCount {
                table,
                rows: Some(rows),
                error: None,
            },
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "Count failed");
                TableCount {
                    table,
                    rows: None,
                    error: Some(e.to_string()),
                }
            }
        };
        counts.push(entry);
    }

    if ctx.is_json() {
        return print_json(&counts);
    }
    for entry in &counts {
        match (entry.rows, &entry.error) {
            (Some(rows), _) => println!("{:<16} {:>8}", entry.table, rows),
            (None, Some(error)) => println!("{:<16} {:>8}  {}", entry.table, "error", error),
            (None, None) => println!("{:<16} {:>8}", entry.table, "-"),
        }
    }
    Ok(())
}

async fn columns(ctx: &CommandContext, table: Table) -> Result<()> {
    let pg = ctx.pg().await?;
    let columns = pg.columns(table).await?;

    if ctx.is_json() {
        return print_json(&columns);
    }
    if columns.is_empty() {
        println!("No columns found for {} (does the table exist?)", table);
        return Ok(());
    }
    println!("{}", table);
    for col in &columns {
        println!(
            "  {:<28} {:<28} {:<8} {}",
            col.column_name,
            col.data_type,
            if col.is_nullable == "YES" { "null" } else { "not null" },
            col.column_default.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

async fn constraints(ctx: &CommandContext, table: Table) -> Result<()> {
    let pg = ctx.pg().await?;
    let constraints = pg.constraints(table).await?;

    if ctx.is_json() {
        return print_json(&constraints);
    }
    if constraints.is_empty() {
        println!("No constraints found for {}", table);
        return Ok(());
    }
    println!("{}", table);
    for c in &constraints {
        let kind = match c.kind.as_str() {
            "c" => "check",
            "f" => "foreign key",
            "p" => "primary key",
            "u" => "unique",
            "x" => "exclusion",
            other => other,
        };
        println!("  {} ({})", c.name, kind);
        println!("    {}", c.definition);
    }
    Ok(())
}
