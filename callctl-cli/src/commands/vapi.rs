//! Vapi command - calling-platform lookups and webhook backfill

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use callctl_core::{apply_patch, Applied, CallPatch, CallTarget, VapiClient};

use super::{print_json, CommandContext};

#[derive(Parser, Debug)]
pub struct VapiArgs {
    #[command(subcommand)]
    pub command: VapiCommand,
}

#[derive(Subcommand, Debug)]
pub enum VapiCommand {
    /// List configured assistants
    Assistants,
    /// List provisioned phone numbers
    PhoneNumbers,
    /// List recent calls on the platform
    Calls {
        /// Maximum number of calls
        #[arg(long, short = 'n', default_value = "20")]
        limit: u32,
    },
    /// Fetch one platform call
    Call {
        /// Platform call ID
        id: String,

        /// Write the call's outcome onto the matching call record, as the
        /// end-of-call webhook would have (backfill for missed webhooks)
        #[arg(long)]
        apply: bool,
    },
}

pub async fn run_vapi(ctx: &CommandContext, args: VapiArgs) -> Result<()> {
    let client = VapiClient::from_settings(&ctx.settings)?;

    match args.command {
        VapiCommand::Assistants => {
            let assistants = client
                .list_assistants()
                .await
                .context("Failed to list assistants")?;
            if ctx.is_json() {
                return print_json(&assistants);
            }
            for a in &assistants {
                println!("{}  {}", a.id, a.name.as_deref().unwrap_or("(unnamed)"));
            }
        }
        VapiCommand::PhoneNumbers => {
            let numbers = client
                .list_phone_numbers()
                .await
                .context("Failed to list phone numbers")?;
            if ctx.is_json() {
                return print_json(&numbers);
            }
            for n in &numbers {
                println!(
                    "{}  {:<16} {:<10} assistant={}",
                    n.id,
                    n.number.as_deref().unwrap_or("-"),
                    n.provider.as_deref().unwrap_or("-"),
                    n.assistant_id.as_deref().unwrap_or("-"),
                );
            }
        }
        VapiCommand::Calls { limit } => {
            let calls = client.list_calls(limit).await.context("Failed to list calls")?;
            if ctx.is_json() {
                return print_json(&calls);
            }
            for c in &calls {
                println!(
                    "{}  {:<12} {:<28} {}",
                    c.id,
                    c.status.as_deref().unwrap_or("-"),
                    c.ended_reason.as_deref().unwrap_or("-"),
                    c.created_at.as_deref().unwrap_or("-"),
                );
            }
        }
        VapiCommand::Call { id, apply } => {
            let call = client
                .get_call(&id)
                .await
                .with_context(|| format!("Failed to fetch call {}", id))?;

            if !apply {
                return print_json(&call);
            }

            let patch = CallPatch::from_call(&call);
            if patch.is_empty() {
                println!("Nothing to apply for call {}", call.id);
                return Ok(());
            }
            let store = ctx.store().await?;
            let applied = apply_patch(store.as_ref(), CallTarget::for_call(&call), &patch).await?;

            if ctx.is_json() {
                return print_json(&applied);
            }
            match applied {
                Applied::Updated { target, rows } => {
                    println!("Updated {} call record(s) where {} = {}", rows, target.column, target.value)
                }
                Applied::UnknownCall { target } => {
                    println!("No call record where {} = {}", target.column, target.value)
                }
                Applied::Ignored { kind } | Applied::MissingCall { kind } => {
                    println!("Nothing applied ({})", kind)
                }
            }
        }
    }
    Ok(())
}
