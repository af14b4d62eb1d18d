//! Config command - show what callctl resolved from the environment

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

use callctl_core::CallctlConfig;

use super::{print_json, CommandContext};

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show each setting's presence (secrets redacted) and the config file
    Show,
}

pub fn run_config(ctx: &CommandContext, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show(ctx),
    }
}

fn show(ctx: &CommandContext) -> Result<()> {
    let settings = ctx.settings.describe();
    let path = CallctlConfig::config_path();
    let file = CallctlConfig::load()?;

    if ctx.is_json() {
        let settings: serde_json::Map<String, serde_json::Value> = settings
            .into_iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        return print_json(&json!({
            "env_files": ctx.env_files,
            "settings": settings,
            "config_file": path,
            "config": file,
        }));
    }

    println!("Environment:");
    for (name, value) in &settings {
        println!("  {:<28} {}", name, value);
    }

    println!();
    if ctx.env_files.is_empty() {
        println!("Env files: (none loaded)");
    } else {
        println!("Env files:");
        for f in &ctx.env_files {
            println!("  {}", f.display());
        }
    }

    println!();
    match &path {
        Some(p) if p.exists() => println!("Config file: {}", p.display()),
        Some(p) => println!("Config file: {} (not found, using defaults)", p.display()),
        None => println!("Config file: (no home directory)"),
    }
    println!("  server.bind            {}", file.server.bind);
    println!("  server.debug_routes    {}", file.server.debug_routes);
    println!("  server.cors_permissive {}", file.server.cors_permissive);
    println!("  probe.key_column       {}", file.probe.key_column);
    Ok(())
}
