//! HTTP server command for the webhook receiver
//!
//! Flags override `[server]` in ~/.callctl/config.toml.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use callctl_core::CallctlConfig;
use callctl_server::{run_server, ServerConfig};

use super::CommandContext;

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: [server] bind or 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Mount /debug routes (call records readable without auth)
    #[arg(long)]
    pub debug_routes: bool,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,
}

/// Run the HTTP server
pub async fn run_serve(ctx: &CommandContext, args: ServeArgs) -> Result<()> {
    let file = CallctlConfig::load()?.server;
    let config = server_config(&args, &file)?;

    let store = ctx.store().await?;
    tracing::info!("Starting callctl server on {}", config.bind_addr);

    // Run server (blocks until shutdown)
    run_server(store, config).await.context("Server error")?;

    Ok(())
}

fn server_config(args: &ServeArgs, file: &callctl_core::config::ServerSection) -> Result<ServerConfig> {
    let bind_addr = match args.bind {
        Some(addr) => addr,
        None => file
            .bind
            .parse()
            .with_context(|| format!("Invalid [server] bind address '{}'", file.bind))?,
    };
    Ok(ServerConfig {
        bind_addr,
        cors_permissive: args.cors_permissive || file.cors_permissive,
        debug_routes: args.debug_routes || file.debug_routes,
    })
}
