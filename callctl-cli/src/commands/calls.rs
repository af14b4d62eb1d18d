//! Calls command - list and show call records

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use callctl_core::{Call, Filter, Order, Query, Row, Table, TableStore};

use super::{display_value, print_json, CommandContext};

#[derive(Parser, Debug)]
pub struct CallsArgs {
    #[command(subcommand)]
    pub command: CallsCommand,
}

#[derive(Subcommand, Debug)]
pub enum CallsCommand {
    /// Most recent calls first
    List {
        /// Organization ID
        #[arg(long)]
        org: Option<String>,
        /// Campaign ID
        #[arg(long)]
        campaign: Option<String>,
        /// Call status (e.g. completed, failed)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of calls
        #[arg(long, short = 'n', default_value = "20")]
        limit: u32,
    },
    /// One call with its transcript (by id or calling-platform call id)
    Show {
        /// Call ID or vapi_call_id
        id: String,
    },
}

pub async fn run_calls(ctx: &CommandContext, args: CallsArgs) -> Result<()> {
    let store = ctx.store().await?;
    match args.command {
        CallsCommand::List {
            org,
            campaign,
            status,
            limit,
        } => {
            let filter = list_filter(org, campaign, status)?;
            let query = Query::new()
                .filter(filter)
                .order_by("created_at", Order::Desc)?
                .limit(limit);
            let rows = store.select(Table::Calls, &query).await?;
            list(ctx, rows)
        }
        CallsCommand::Show { id } => {
            let Some(row) = find_call(store.as_ref(), &id).await? else {
                bail!("Call '{}' not found (checked id and vapi_call_id)", id);
            };
            show(ctx, row)
        }
    }
}

fn list_filter(
    org: Option<String>,
    campaign: Option<String>,
    status: Option<String>,
) -> Result<Filter> {
    let mut filter = Filter::new();
    for (column, value) in [
        ("organization_id", org),
        ("campaign_id", campaign),
        ("status", status),
    ] {
        if let Some(value) = value {
            filter = filter.and(column, value)?;
        }
    }
    Ok(filter)
}

/// Look a call up by primary key, then by platform call id.
async fn find_call(store: &dyn TableStore, id: &str) -> Result<Option<Row>> {
    for column in ["id", "vapi_call_id"] {
        let query = Query::new().filter(Filter::eq(column, id)?).limit(1);
        match store.select(Table::Calls, &query).await {
            Ok(mut rows) if !rows.is_empty() => return Ok(Some(rows.remove(0))),
            Ok(_) => {}
            // A non-uuid string against a uuid `id` column is a type error, not a miss.
            Err(e) if e.rejects_value() => {
                tracing::debug!(column, error = %e, "Lookup value not valid for column")
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

fn list(ctx: &CommandContext, rows: Vec<Row>) -> Result<()> {
    if ctx.is_json() {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No calls found");
        return Ok(());
    }
    for row in rows {
        let call = Call::from_row(row).context("Unexpected call row shape")?;
        println!("{}", call.summary_line());
    }
    Ok(())
}

fn show(ctx: &CommandContext, row: Row) -> Result<()> {
    if ctx.is_json() {
        return print_json(&row);
    }

    let call = Call::from_row(row.clone()).context("Unexpected call row shape")?;
    for (key, value) in &row {
        if key == "transcript" || value.is_null() {
            continue;
        }
        println!("{:<20} {}", key, display_value(value));
    }
    match call.transcript_text() {
        Some(t) => {
            println!();
            println!("Transcript:");
            println!("{}", t);
        }
        None => println!("{:<20} (none)", "transcript"),
    }
    Ok(())
}
