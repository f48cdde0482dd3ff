//! Splurge permissioned relay
//!
//! Serves `POST /permissioned`: verifies that a client-built transaction only
//! invokes whitelisted marketplace instructions, adds the admin signature and
//! submits it.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use splurge_gateway::config::Config;
use splurge_gateway::observability::init_tracing;
use splurge_gateway::relay::{serve, PermissionedRelay};
use splurge_gateway::rpc_manager::SolanaLedgerClient;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Listen address, overrides `relay.bind_addr`
    #[arg(long)]
    bind: Option<String>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if std::path::Path::new(&args.config).exists() {
        Config::from_file_with_env(&args.config)?
    } else {
        let mut config = Config::default();
        dotenvy::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    };
    if let Some(bind) = &args.bind {
        config.relay.bind_addr = bind.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging format comes from the config file, so peek at it first
    let json_logs = Config::from_file(&args.config)
        .map(|c| c.monitoring.json_logs)
        .unwrap_or(false);
    init_tracing(args.verbose, json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Splurge relay");
    info!(path = %args.config, "Loading configuration");
    let config = load_config(&args)?;

    let ledger = SolanaLedgerClient::new(&config.ledger).context("failed to create ledger client")?;
    let authority = config.load_authority().context("failed to load admin keypair")?;
    let whitelist = config.whitelist()?;
    let addr = config.bind_addr()?;

    info!(
        authority = %authority.pubkey(),
        program = %whitelist.program_id(),
        allowed = ?whitelist.names().collect::<Vec<_>>(),
        rpc = %config.ledger.rpc_url,
        "Relay configured"
    );

    let relay = PermissionedRelay::new(
        Arc::new(ledger),
        whitelist,
        authority,
        config.relay.settings.clone(),
    );
    serve(relay, addr, config.monitoring.metrics_enabled).await
}
