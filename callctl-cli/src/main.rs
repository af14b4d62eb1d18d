//! callctl - operator tooling for the call-center CRM backend
//!
//! One binary replacing the pile of one-shot maintenance scripts:
//! - Constraint probing (`probe`) for check constraints that can't be read
//! - Schema and row-count inspection (`inspect`)
//! - Call record listing and guarded single-table patches (`calls`, `patch`)
//! - Calling-platform lookups and webhook backfill (`vapi`)
//! - The webhook receiver (`serve`)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use callctl_core::config::load_dotenv;
use callctl_core::{Backend, KeyRole, Settings};

mod commands;
mod tracing_setup;

use commands::{CommandContext, OutputFormat};

#[derive(Parser, Debug)]
#[command(
    name = "callctl",
    author,
    version,
    about = "Operator tooling for the call-center CRM database and calling platform",
    long_about = "Probe opaque check constraints, inspect and patch CRM tables, query the \
                  calling platform and run the webhook receiver. Credentials come from the \
                  environment, .env.local, .env or ~/.callctl/.env."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Database transport
    #[arg(long, value_enum, global = true, default_value = "rest")]
    backend: BackendArg,

    /// Use the anonymous key instead of the service-role key (REST only)
    #[arg(long, global = true)]
    anon: bool,

    /// Output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover which values a check constraint accepts by trial insert
    Probe(commands::probe::ProbeArgs),
    /// Row counts, columns and constraints
    Inspect(commands::inspect::InspectArgs),
    /// List and show call records
    Calls(commands::calls::CallsArgs),
    /// Update rows in one table (dry run unless --yes)
    Patch(commands::patch::PatchArgs),
    /// Query the calling platform (assistants, phone numbers, calls)
    Vapi(commands::vapi::VapiArgs),
    /// Run the webhook receiver HTTP server
    Serve(commands::serve::ServeArgs),
    /// Show resolved configuration (secrets redacted)
    Config(commands::config::ConfigArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum BackendArg {
    /// PostgREST over HTTPS (SUPABASE_URL + key)
    Rest,
    /// Direct Postgres connection (DATABASE_URL)
    Postgres,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Rest => Backend::Rest,
            BackendArg::Postgres => Backend::Postgres,
        }
    }
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    let env_files = load_dotenv();
    let ctx = CommandContext {
        settings: Settings::from_env(),
        backend: cli.backend.into(),
        role: if cli.anon {
            KeyRole::Anon
        } else {
            KeyRole::ServiceRole
        },
        format: cli.format,
        env_files,
    };

    match cli.command {
        Commands::Probe(args) => commands::run_probe(&ctx, args).await?,
        Commands::Inspect(args) => commands::run_inspect(&ctx, args).await?,
        Commands::Calls(args) => commands::run_calls(&ctx, args).await?,
        Commands::Patch(args) => commands::run_patch(&ctx, args).await?,
        Commands::Vapi(args) => commands::run_vapi(&ctx, args).await?,
        Commands::Serve(args) => commands::run_serve(&ctx, args).await?,
        Commands::Config(args) => commands::run_config(&ctx, args)?,
        Commands::Completions(args) => run_completions(args).context("Failed to write completions")?,
    }
    Ok(())
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}
